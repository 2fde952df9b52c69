//! Task and response records

use magpie_core::{AgentId, RequestId, SessionId, Value};
use serde::{Deserialize, Serialize};

/// Scheduling class of a task. Higher drains first at check-in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Priority {
    /// Background work (bulk file fetches).
    Low,
    /// Normal flow requests.
    #[default]
    Medium,
    /// Interactive or operator-initiated work.
    High,
}

impl Priority {
    pub(crate) const COUNT: usize = 3;

    pub(crate) fn index(self) -> usize {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
        }
    }
}

/// One outbound unit of work addressed to an agent.
///
/// `seq` is assigned at enqueue time and orders tasks within a
/// priority class; requeued tasks keep their original seq so redelivery
/// preserves the initial order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Agent the task is addressed to.
    pub agent_id: AgentId,
    /// Session that issued the request and will receive the response.
    pub session_id: SessionId,
    /// Idempotency key, unique per agent mailbox.
    pub request_id: RequestId,
    /// Opaque request payload the agent interprets.
    pub payload: Value,
    /// Scheduling class.
    pub priority: Priority,
    /// Mailbox sequence number, assigned at enqueue.
    pub seq: u64,
}

/// An agent's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    /// Session the response belongs to.
    pub session_id: SessionId,
    /// The request this answers.
    pub request_id: RequestId,
    /// Payload on success, agent-side error text on failure.
    pub result: Result<Value, String>,
}
