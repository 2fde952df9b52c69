//! Identifier newtypes and read-age selection
//!
//! - [`Timestamp`]: microseconds since the Unix epoch
//! - [`AgeSelector`]: which attribute versions a read returns
//! - [`AgentId`] / [`RequestId`] / [`SessionId`]: typed handles used by
//!   the queue and flow layers

use crate::name::ObjectName;
use serde::{Deserialize, Serialize};

/// Microseconds since the Unix epoch.
///
/// Every attribute version carries one; callers may supply explicit
/// timestamps when replaying externally collected data.
pub type Timestamp = i64;

/// Current time as a [`Timestamp`].
pub fn now_micros() -> Timestamp {
    chrono::Utc::now().timestamp_micros()
}

/// Which versions of an attribute a read returns.
///
/// Attribute history is append-only; the selector picks a view of it:
/// - `Newest`: the most recent version only
/// - `AtOrBefore(t)`: the newest version written at or before `t`
/// - `AllTimes`: every version ever written, newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeSelector {
    /// Most recent version only.
    Newest,
    /// Newest version at or before the given timestamp.
    AtOrBefore(Timestamp),
    /// Every version, newest first.
    AllTimes,
}

impl AgeSelector {
    /// Whether a version written at `ts` is visible under this selector.
    ///
    /// `Newest` admits every version here; the store truncates to one
    /// after filtering.
    pub fn admits(&self, ts: Timestamp) -> bool {
        match self {
            AgeSelector::Newest | AgeSelector::AllTimes => true,
            AgeSelector::AtOrBefore(cutoff) => ts <= *cutoff,
        }
    }
}

/// Identifier of a remote endpoint agent.
///
/// Agents are addressed by an opaque string (e.g. `C.4f2a9c01`); the
/// agent id doubles as the root component of every name the agent's
/// data is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    /// Wrap an agent identifier.
    pub fn new(id: impl Into<String>) -> Self {
        AgentId(id.into())
    }

    /// The raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The store name rooted at this agent.
    pub fn root_name(&self) -> ObjectName {
        ObjectName::root()
            .child(self.0.clone())
            .expect("agent ids never contain path separators")
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        AgentId::new(s)
    }
}

/// Identifier of one outbound request within a session.
///
/// Request ids are the idempotency key for at-least-once response
/// delivery: a response for an id no longer pending is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// External handle for a flow instance.
///
/// A session id is the [`ObjectName`] the instance is persisted under;
/// callers treat it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(ObjectName);

impl SessionId {
    /// Wrap a store name as a session handle.
    pub fn new(name: ObjectName) -> Self {
        SessionId(name)
    }

    /// The underlying store name.
    pub fn name(&self) -> &ObjectName {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ObjectName> for SessionId {
    fn from(name: ObjectName) -> Self {
        SessionId(name)
    }
}
