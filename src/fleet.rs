//! The assembled substrate

use magpie_archive::{ArchiveStreamer, Compression};
use magpie_core::{AgeSelector, AgentId, Error, ObjectName, RequestId, Result, SessionId, Value};
use magpie_flow::{FlowRegistry, FlowRunner, FlowStatus, RetryPolicy};
use magpie_object::{walk_streams, ObjectHandle, Schema, Stream, DEFAULT_CHUNK_SIZE};
use magpie_queue::{Task, TaskQueue, TaskResponse, DEFAULT_LEASE_MICROS};
use magpie_store::AttributeStore;
use std::sync::Arc;
use tracing::debug;

/// One handle over the whole substrate: store, schema, queue, flow
/// registry, and runner, wired together by [`FleetBuilder`].
///
/// `Fleet` does not implement `Clone`; share it behind an `Arc` if
/// multiple threads drive it. Every layer underneath is thread-safe.
pub struct Fleet {
    store: Arc<AttributeStore>,
    schema: Arc<Schema>,
    queue: Arc<TaskQueue>,
    registry: Arc<FlowRegistry>,
    runner: FlowRunner,
    chunk_size: u64,
}

impl Fleet {
    /// Start configuring a fleet.
    pub fn builder() -> FleetBuilder {
        FleetBuilder::default()
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<AttributeStore> {
        &self.store
    }

    /// The kind schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The task queue.
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// The flow registry.
    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }

    /// The flow runner.
    pub fn runner(&self) -> &FlowRunner {
        &self.runner
    }

    /// Start a flow against an agent. See [`FlowRunner::start_flow`].
    pub fn start_flow(
        &self,
        agent: &AgentId,
        flow_kind: &str,
        args: Value,
    ) -> Result<SessionId> {
        self.runner.start_flow(agent, flow_kind, args)
    }

    /// Lease up to `max_items` tasks to a checking-in agent.
    pub fn check_in(&self, agent: &AgentId, max_items: usize) -> Vec<Task> {
        self.queue.check_in(agent, max_items)
    }

    /// Acknowledge a delivered task.
    pub fn ack(&self, agent: &AgentId, request_id: RequestId) -> bool {
        self.queue.ack(agent, request_id)
    }

    /// Accept an agent response and drive its session forward.
    ///
    /// The response joins the session's inbox, then the whole inbox is
    /// drained and delivered to the runner. On any delivery failure the
    /// drained batch goes back into the inbox and the error surfaces;
    /// nothing is lost and the next response (or caller retry) delivers
    /// it. The matching tasks stay in flight until delivery commits, so
    /// lease expiry also redelivers them if no retry ever comes.
    pub fn post_response(&self, response: TaskResponse) -> Result<()> {
        let session = response.session_id.clone();
        self.queue.post_response(response);

        let batch = self.queue.drain_responses(&session);
        if batch.is_empty() {
            // A concurrent delivery already took the inbox.
            return Ok(());
        }
        match self.runner.deliver_responses(&session, batch.clone()) {
            Err(err) => {
                debug!(%session, %err, "delivery failed, responses returned to inbox");
                for response in batch {
                    self.queue.post_response(response);
                }
                Err(err)
            }
            Ok(()) => Ok(()),
        }
    }

    /// Current status of a session.
    pub fn get_status(&self, session: &SessionId) -> Result<FlowStatus> {
        self.runner.get_status(session)
    }

    /// Final result of a finished session.
    pub fn get_result(&self, session: &SessionId) -> Result<Option<Value>> {
        self.runner.get_result(session)
    }

    /// Open any object by name, discovering its kind.
    pub fn open_object(&self, name: &ObjectName, age: AgeSelector) -> Result<ObjectHandle> {
        ObjectHandle::open_any(
            Arc::clone(&self.store),
            Arc::clone(&self.schema),
            name,
            age,
        )
    }

    /// Open a stream by name.
    pub fn open_stream(&self, name: &ObjectName, age: AgeSelector) -> Result<Stream> {
        Stream::open(
            Arc::clone(&self.store),
            Arc::clone(&self.schema),
            name,
            age,
        )
    }

    /// Create a stream with the fleet's configured chunk size.
    pub fn create_stream(&self, name: ObjectName) -> Result<Stream> {
        Stream::create(
            Arc::clone(&self.store),
            Arc::clone(&self.schema),
            name,
            Some(self.chunk_size),
        )
    }

    /// Export every stream at or below `roots` as a streaming archive.
    ///
    /// The returned iterator yields archive bytes as the consumer
    /// pulls; dropping it cancels the export.
    pub fn export_archive(
        &self,
        roots: &[ObjectName],
        prefix: &str,
        compression: Compression,
    ) -> Result<ArchiveStreamer> {
        let streams = walk_streams(&self.store, &self.schema, roots, AgeSelector::Newest)?;
        debug!(roots = roots.len(), streams = streams.len(), "starting archive export");
        ArchiveStreamer::new(streams, prefix, compression)
    }
}

/// Configures and assembles a [`Fleet`].
pub struct FleetBuilder {
    schema: Schema,
    registry: FlowRegistry,
    chunk_size: u64,
    task_lease_micros: i64,
    session_lease_micros: i64,
    retry: RetryPolicy,
}

impl Default for FleetBuilder {
    fn default() -> Self {
        FleetBuilder {
            schema: Schema::with_builtins(),
            registry: FlowRegistry::with_builtins(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            task_lease_micros: DEFAULT_LEASE_MICROS,
            session_lease_micros: magpie_flow::DEFAULT_SESSION_LEASE_MICROS,
            retry: RetryPolicy::default(),
        }
    }
}

impl FleetBuilder {
    /// Replace the kind schema (builtins plus domain kinds).
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Replace the flow registry.
    pub fn registry(mut self, registry: FlowRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Chunk size for streams created through the fleet.
    pub fn chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Task lease interval for agent check-ins, in microseconds.
    pub fn task_lease_micros(mut self, micros: i64) -> Self {
        self.task_lease_micros = micros;
        self
    }

    /// Session lease interval for flow steps, in microseconds.
    pub fn session_lease_micros(mut self, micros: i64) -> Self {
        self.session_lease_micros = micros;
        self
    }

    /// Retry policy for checkpoints and lease contention.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Assemble the fleet.
    pub fn build(self) -> Fleet {
        let store = Arc::new(AttributeStore::new());
        let schema = Arc::new(self.schema);
        let queue = Arc::new(TaskQueue::with_lease(self.task_lease_micros));
        let registry = Arc::new(self.registry);
        let runner = FlowRunner::new(
            Arc::clone(&store),
            Arc::clone(&schema),
            Arc::clone(&queue),
            Arc::clone(&registry),
        )
        .with_retry(self.retry)
        .with_session_lease(self.session_lease_micros);
        Fleet {
            store,
            schema,
            queue,
            registry,
            runner,
            chunk_size: self.chunk_size,
        }
    }
}
