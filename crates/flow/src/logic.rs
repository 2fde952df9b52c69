//! Flow logic trait and registry
//!
//! Flow kinds are data plus dispatch: the persisted instance carries a
//! kind name, and a registry maps that name to the logic that advances
//! it. Logic is CPU-bound and store-mediated; it never blocks on the
//! agent, it only describes the next requests to send.

use dashmap::DashMap;
use magpie_core::{AgentId, Result, SessionId, Value};
use magpie_object::Schema;
use magpie_queue::{Priority, TaskResponse};
use magpie_store::AttributeStore;
use std::sync::Arc;

/// What a step sees of its surroundings.
///
/// Steps may read and write collected data through the store; the
/// instance's own attributes are the runner's to manage.
pub struct StepContext<'a> {
    /// The substrate's store.
    pub store: &'a Arc<AttributeStore>,
    /// Kind schema for typed writes.
    pub schema: &'a Arc<Schema>,
    /// Agent this instance is collecting from.
    pub agent: &'a AgentId,
    /// The instance being advanced.
    pub session: &'a SessionId,
}

/// One request a step wants sent to the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// Opaque payload the agent interprets.
    pub payload: Value,
    /// Scheduling class.
    pub priority: Priority,
}

impl OutboundRequest {
    /// Request at the default priority.
    pub fn new(payload: Value) -> Self {
        OutboundRequest {
            payload,
            priority: Priority::default(),
        }
    }

    /// Request at an explicit priority.
    pub fn with_priority(payload: Value, priority: Priority) -> Self {
        OutboundRequest { payload, priority }
    }
}

/// The result of advancing an instance one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// State to checkpoint for the next step.
    pub state: Value,
    /// Requests to enqueue; their ids become the new pending set.
    pub requests: Vec<OutboundRequest>,
    /// Final result, meaningful when `finished`.
    pub result: Option<Value>,
    /// Whether the instance is done.
    pub finished: bool,
}

impl StepOutcome {
    /// Keep running: checkpoint `state` and wait on `requests`.
    pub fn waiting(state: Value, requests: Vec<OutboundRequest>) -> Self {
        StepOutcome {
            state,
            requests,
            result: None,
            finished: false,
        }
    }

    /// Terminate with `result`.
    pub fn finished(result: Value) -> Self {
        StepOutcome {
            state: Value::Null,
            requests: Vec::new(),
            result: Some(result),
            finished: true,
        }
    }
}

/// Step logic for one flow kind.
///
/// Implementations are stateless; everything an instance knows lives in
/// the checkpointed `state` value.
pub trait FlowLogic: Send + Sync {
    /// Produce the first step from the caller's arguments.
    fn initial(&self, ctx: &StepContext<'_>, args: &Value) -> Result<StepOutcome>;

    /// Advance after every pending request has been answered.
    ///
    /// `responses` is the full collected batch, in arrival order.
    fn on_responses(
        &self,
        ctx: &StepContext<'_>,
        state: &Value,
        responses: &[TaskResponse],
    ) -> Result<StepOutcome>;
}

/// Maps flow kind names to their logic.
#[derive(Default)]
pub struct FlowRegistry {
    kinds: DashMap<String, Arc<dyn FlowLogic>>,
}

impl FlowRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in kinds.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(crate::flows::LIST_DIRECTORY, Arc::new(crate::flows::ListDirectory));
        registry.register(crate::flows::FETCH_FILE, Arc::new(crate::flows::FetchFile));
        registry
    }

    /// Register `logic` under `kind`, replacing any previous entry.
    pub fn register(&self, kind: &str, logic: Arc<dyn FlowLogic>) {
        self.kinds.insert(kind.to_string(), logic);
    }

    /// Look up a kind's logic.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn FlowLogic>> {
        self.kinds.get(kind).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut names: Vec<String> = self.kinds.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
