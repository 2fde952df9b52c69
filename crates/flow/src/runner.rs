//! The flow runner
//!
//! Advancing an instance is always the same shape: lease the session
//! name, load the instance in one read, decide, checkpoint everything
//! in one atomic batch, release. The lease serializes workers; the
//! atomic checkpoint means a crash mid-step leaves the previous
//! checkpoint intact and the step simply happens again.

use crate::logic::{FlowRegistry, StepContext, StepOutcome};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::status::FlowStatus;
use magpie_core::{
    AgeSelector, AgentId, Error, ObjectName, RequestId, Result, SessionId, Value,
};
use magpie_object::{attrs, KindTag, ObjectHandle, Schema};
use magpie_queue::{Task, TaskQueue, TaskResponse};
use magpie_store::AttributeStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default session lease: 30 seconds. Steps are CPU-bound; a lease this
/// long only matters when a worker dies mid-step.
pub const DEFAULT_SESSION_LEASE_MICROS: i64 = 30 * 1_000_000;

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    let bytes = rmp_serde::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(Value::Bytes(bytes))
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T> {
    let bytes = value
        .as_bytes()
        .ok_or_else(|| Error::Serialization("expected Bytes attribute".into()))?;
    rmp_serde::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
}

/// In-memory image of one instance, loaded under the lease.
struct Instance {
    handle: ObjectHandle,
    kind: String,
    agent: AgentId,
    status: FlowStatus,
    state: Value,
    pending: Vec<RequestId>,
    collected: Vec<TaskResponse>,
}

impl Instance {
    fn load(
        store: &Arc<AttributeStore>,
        schema: &Arc<Schema>,
        session: &SessionId,
    ) -> Result<Self> {
        let handle = ObjectHandle::open(
            Arc::clone(store),
            Arc::clone(schema),
            session.name(),
            &KindTag::flow(),
            AgeSelector::Newest,
        )?;
        let kind = handle
            .get(attrs::FLOW_KIND)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::not_found(session))?
            .to_string();
        let agent = AgentId::new(
            handle
                .get(attrs::FLOW_AGENT)
                .and_then(Value::as_str)
                .ok_or_else(|| Error::not_found(session))?,
        );
        let status = handle
            .get(attrs::FLOW_STATUS)
            .and_then(Value::as_str)
            .map(FlowStatus::parse)
            .transpose()?
            .ok_or_else(|| Error::not_found(session))?;
        let state = handle
            .get(attrs::FLOW_STATE)
            .map(decode)
            .transpose()?
            .unwrap_or(Value::Null);
        let pending: Vec<u64> = handle
            .get(attrs::FLOW_PENDING)
            .map(decode)
            .transpose()?
            .unwrap_or_default();
        let collected: Vec<TaskResponse> = handle
            .get(attrs::FLOW_COLLECTED)
            .map(decode)
            .transpose()?
            .unwrap_or_default();
        Ok(Instance {
            handle,
            kind,
            agent,
            status,
            state,
            pending: pending.into_iter().map(RequestId).collect(),
            collected,
        })
    }
}

/// Advances flow instances and owns their lifecycle writes.
///
/// The runner holds no per-instance state; any number of runners over
/// the same store and queue are interchangeable workers.
pub struct FlowRunner {
    store: Arc<AttributeStore>,
    schema: Arc<Schema>,
    queue: Arc<TaskQueue>,
    registry: Arc<FlowRegistry>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    lease_micros: i64,
    // Request ids are unique per runner process; uniqueness per agent
    // mailbox is what acks and idempotency need.
    next_request: AtomicU64,
}

impl FlowRunner {
    /// Runner with default retry policy and lease.
    pub fn new(
        store: Arc<AttributeStore>,
        schema: Arc<Schema>,
        queue: Arc<TaskQueue>,
        registry: Arc<FlowRegistry>,
    ) -> Self {
        FlowRunner {
            store,
            schema,
            queue,
            registry,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(ThreadSleeper),
            lease_micros: DEFAULT_SESSION_LEASE_MICROS,
            next_request: AtomicU64::new(1),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the sleeper (tests).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replace the session lease interval.
    pub fn with_session_lease(mut self, lease_micros: i64) -> Self {
        self.lease_micros = lease_micros;
        self
    }

    fn allocate_session(&self, agent: &AgentId) -> Result<SessionId> {
        let tail = uuid::Uuid::new_v4().as_u128() as u32;
        let name = agent
            .root_name()
            .child("flows")?
            .child(format!("F:{tail:08x}"))?;
        Ok(SessionId::new(name))
    }

    fn next_request_id(&self) -> RequestId {
        RequestId(self.next_request.fetch_add(1, Ordering::Relaxed))
    }

    /// Start a new instance of `flow_kind` against `agent`.
    ///
    /// Runs the initial step, checkpoints the instance, then enqueues
    /// its requests. A flow whose initial step finishes immediately is
    /// checkpointed straight to FINISHED; a failing initial step is
    /// checkpointed as ERROR. Either way the returned session id is
    /// queryable.
    pub fn start_flow(
        &self,
        agent: &AgentId,
        flow_kind: &str,
        args: Value,
    ) -> Result<SessionId> {
        let logic = self
            .registry
            .get(flow_kind)
            .ok_or_else(|| Error::not_found(format!("flow kind {flow_kind:?}")))?;

        let session = self.allocate_session(agent)?;
        let mut handle = ObjectHandle::create(
            Arc::clone(&self.store),
            Arc::clone(&self.schema),
            session.name().clone(),
            KindTag::flow(),
        )?;

        let ctx = StepContext {
            store: &self.store,
            schema: &self.schema,
            agent,
            session: &session,
        };
        let outcome = match logic.initial(&ctx, &args) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%session, flow_kind, %err, "initial step failed");
                let mut writes = self.identity_writes(flow_kind, agent, &args)?;
                writes.push((attrs::FLOW_STATUS.to_string(), Value::from(FlowStatus::Error.as_str())));
                writes.push((attrs::FLOW_ERROR.to_string(), Value::from(err.to_string())));
                self.checkpoint(&mut handle, writes)?;
                return Ok(session);
            }
        };

        let mut writes = self.identity_writes(flow_kind, agent, &args)?;
        let tasks = self.outcome_writes(&session, agent, outcome, &mut writes)?;
        self.checkpoint(&mut handle, writes)?;
        for task in tasks {
            self.queue.enqueue(task);
        }
        info!(%session, flow_kind, %agent, "flow started");
        Ok(session)
    }

    fn identity_writes(
        &self,
        flow_kind: &str,
        agent: &AgentId,
        args: &Value,
    ) -> Result<Vec<(String, Value)>> {
        Ok(vec![
            (attrs::FLOW_KIND.to_string(), Value::from(flow_kind)),
            (attrs::FLOW_AGENT.to_string(), Value::from(agent.as_str())),
            (attrs::FLOW_ARGS.to_string(), encode(args)?),
        ])
    }

    /// Translate a step outcome into checkpoint writes plus the tasks
    /// to enqueue after the checkpoint lands.
    fn outcome_writes(
        &self,
        session: &SessionId,
        agent: &AgentId,
        outcome: StepOutcome,
        writes: &mut Vec<(String, Value)>,
    ) -> Result<Vec<Task>> {
        if outcome.finished {
            writes.push((
                attrs::FLOW_STATUS.to_string(),
                Value::from(FlowStatus::Finished.as_str()),
            ));
            writes.push((
                attrs::FLOW_RESULT.to_string(),
                encode(&outcome.result.unwrap_or(Value::Null))?,
            ));
            writes.push((attrs::FLOW_STATE.to_string(), encode(&outcome.state)?));
            writes.push((attrs::FLOW_PENDING.to_string(), encode::<Vec<u64>>(&Vec::new())?));
            writes.push((attrs::FLOW_COLLECTED.to_string(), encode::<Vec<TaskResponse>>(&Vec::new())?));
            return Ok(Vec::new());
        }

        let mut pending = Vec::with_capacity(outcome.requests.len());
        let mut tasks = Vec::with_capacity(outcome.requests.len());
        for request in outcome.requests {
            let id = self.next_request_id();
            pending.push(id.0);
            tasks.push(Task {
                agent_id: agent.clone(),
                session_id: session.clone(),
                request_id: id,
                payload: request.payload,
                priority: request.priority,
                seq: 0,
            });
        }
        writes.push((
            attrs::FLOW_STATUS.to_string(),
            Value::from(FlowStatus::Running.as_str()),
        ));
        writes.push((attrs::FLOW_STATE.to_string(), encode(&outcome.state)?));
        writes.push((attrs::FLOW_PENDING.to_string(), encode(&pending)?));
        writes.push((attrs::FLOW_COLLECTED.to_string(), encode::<Vec<TaskResponse>>(&Vec::new())?));
        Ok(tasks)
    }

    fn checkpoint(&self, handle: &mut ObjectHandle, writes: Vec<(String, Value)>) -> Result<()> {
        self.retry
            .run(self.sleeper.as_ref(), "flow checkpoint", || {
                handle.set_batch(writes.clone())
            })
    }

    fn ack_matched(&self, agent: &AgentId, matched: &[RequestId]) {
        for id in matched {
            self.queue.ack(agent, *id);
        }
    }

    fn lease_session(&self, name: &ObjectName) -> Result<magpie_store::SubjectLease> {
        let mut attempt = 0;
        loop {
            match self.store.try_lease(name, self.lease_micros) {
                Ok(lease) => return Ok(lease),
                Err(Error::LockContention(_)) if attempt + 1 < self.retry.attempts => {
                    debug!(%name, attempt, "session leased elsewhere, backing off");
                    self.sleeper.sleep(self.retry.backoff(attempt));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Deliver a batch of agent responses to their session.
    ///
    /// Responses for terminal sessions and for request ids not pending
    /// are dropped as no-ops. The step advances only once every pending
    /// request is answered; until then responses are buffered in the
    /// checkpoint, so out-of-order and duplicate delivery are harmless.
    pub fn deliver_responses(
        &self,
        session: &SessionId,
        responses: Vec<TaskResponse>,
    ) -> Result<()> {
        let _lease = self.lease_session(session.name())?;
        let mut instance = Instance::load(&self.store, &self.schema, session)?;

        if instance.status.is_terminal() {
            debug!(%session, status = %instance.status, "responses for terminal session dropped");
            return Ok(());
        }

        // Matched tasks are acked only after their checkpoint commits;
        // until then they stay in flight so lease expiry redelivers
        // them if the checkpoint never lands.
        let mut matched = Vec::new();
        for response in responses {
            if let Some(at) = instance.pending.iter().position(|id| *id == response.request_id) {
                instance.pending.remove(at);
                matched.push(response.request_id);
                instance.collected.push(response);
            } else {
                debug!(
                    %session,
                    request = %response.request_id,
                    "duplicate or unknown response dropped"
                );
            }
        }

        if !instance.pending.is_empty() {
            // Still waiting; checkpoint the buffer and stop.
            let pending: Vec<u64> = instance.pending.iter().map(|id| id.0).collect();
            let writes = vec![
                (attrs::FLOW_PENDING.to_string(), encode(&pending)?),
                (attrs::FLOW_COLLECTED.to_string(), encode(&instance.collected)?),
            ];
            let mut handle = instance.handle;
            self.checkpoint(&mut handle, writes)?;
            self.ack_matched(&instance.agent, &matched);
            return Ok(());
        }

        let logic = self
            .registry
            .get(&instance.kind)
            .ok_or_else(|| Error::Internal(format!("unregistered flow kind {:?}", instance.kind)))?;
        let ctx = StepContext {
            store: &self.store,
            schema: &self.schema,
            agent: &instance.agent,
            session,
        };

        let step = logic.on_responses(&ctx, &instance.state, &instance.collected);
        let mut handle = instance.handle;
        match step {
            Err(err) if !err.is_transient() => {
                // Step logic failed: terminal, recorded, never retried.
                warn!(%session, %err, "flow step failed");
                let writes = vec![
                    (
                        attrs::FLOW_STATUS.to_string(),
                        Value::from(FlowStatus::Error.as_str()),
                    ),
                    (attrs::FLOW_ERROR.to_string(), Value::from(err.to_string())),
                    (attrs::FLOW_PENDING.to_string(), encode::<Vec<u64>>(&Vec::new())?),
                    (attrs::FLOW_COLLECTED.to_string(), encode::<Vec<TaskResponse>>(&Vec::new())?),
                ];
                self.checkpoint(&mut handle, writes)?;
                self.ack_matched(&instance.agent, &matched);
                self.queue.cancel_session(session);
                Ok(())
            }
            Err(err) => {
                // Infra trouble inside the step: leave the instance
                // RUNNING with its checkpoint intact and surface it.
                Err(err)
            }
            Ok(outcome) => {
                let finished = outcome.finished;
                let mut writes = Vec::new();
                let tasks =
                    self.outcome_writes(session, &instance.agent, outcome, &mut writes)?;
                self.checkpoint(&mut handle, writes)?;
                self.ack_matched(&instance.agent, &matched);
                if finished {
                    self.queue.cancel_session(session);
                    info!(%session, "flow finished");
                }
                for task in tasks {
                    self.queue.enqueue(task);
                }
                Ok(())
            }
        }
    }

    /// Current status of a session. Single read, no lease.
    pub fn get_status(&self, session: &SessionId) -> Result<FlowStatus> {
        let versions = self
            .store
            .read(session.name(), attrs::FLOW_STATUS, AgeSelector::Newest)?;
        let Some((value, _)) = versions.into_iter().next() else {
            return Err(Error::not_found(session));
        };
        value
            .as_str()
            .map(FlowStatus::parse)
            .transpose()?
            .ok_or_else(|| Error::not_found(session))
    }

    /// Final result of a finished session, if any.
    pub fn get_result(&self, session: &SessionId) -> Result<Option<Value>> {
        let versions = self
            .store
            .read(session.name(), attrs::FLOW_RESULT, AgeSelector::Newest)?;
        versions
            .into_iter()
            .next()
            .map(|(value, _)| decode(&value))
            .transpose()
    }

    /// Recorded error text of a failed session, if any.
    pub fn get_error(&self, session: &SessionId) -> Result<Option<String>> {
        let versions = self
            .store
            .read(session.name(), attrs::FLOW_ERROR, AgeSelector::Newest)?;
        Ok(versions
            .into_iter()
            .next()
            .and_then(|(value, _)| value.as_str().map(String::from)))
    }

    /// Request ids the session is still waiting on.
    pub fn pending_requests(&self, session: &SessionId) -> Result<Vec<RequestId>> {
        let versions = self
            .store
            .read(session.name(), attrs::FLOW_PENDING, AgeSelector::Newest)?;
        let Some((value, _)) = versions.into_iter().next() else {
            return Err(Error::not_found(session));
        };
        let raw: Vec<u64> = decode(&value)?;
        Ok(raw.into_iter().map(RequestId).collect())
    }

    /// How many responses the session has buffered toward its next step.
    pub fn collected_len(&self, session: &SessionId) -> Result<usize> {
        let versions = self
            .store
            .read(session.name(), attrs::FLOW_COLLECTED, AgeSelector::Newest)?;
        let Some((value, _)) = versions.into_iter().next() else {
            return Ok(0);
        };
        let collected: Vec<TaskResponse> = decode(&value)?;
        Ok(collected.len())
    }

    /// The queue this runner enqueues into.
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }
}
