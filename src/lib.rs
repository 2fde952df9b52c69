//! Magpie: a fleet collection substrate.
//!
//! Magpie stores data collected from a fleet of endpoint agents in a
//! versioned, attribute-addressed object store, schedules work for
//! agents that are offline most of the time, advances long-running
//! collection flows as durable state machines, and exports collected
//! file content as streaming archives.
//!
//! The layers, bottom up:
//!
//! - [`magpie_store`]: versioned attribute storage, sharded by agent,
//!   with per-name leases.
//! - [`magpie_object`]: typed objects over raw attributes: kinds,
//!   chunked streams, containers, recursive stream discovery.
//! - [`magpie_queue`]: per-agent task mailboxes with leased
//!   at-least-once delivery and per-session response inboxes.
//! - [`magpie_flow`]: the flow runner: durable request/response state
//!   machines checkpointed atomically in the store.
//! - [`magpie_archive`]: streaming tar/zstd export of collected
//!   streams.
//!
//! [`Fleet`] wires these together behind one handle:
//!
//! ```
//! use magpie::{Fleet, Value};
//!
//! let fleet = Fleet::builder().build();
//! let agent = magpie::AgentId::new("C.4f2a9c01");
//! let session = fleet
//!     .start_flow(&agent, "fetch_file", Value::from("/etc/hostname"))
//!     .unwrap();
//!
//! // The agent checks in, does the work, and answers.
//! let tasks = fleet.check_in(&agent, 10);
//! for task in tasks {
//!     fleet
//!         .post_response(magpie::TaskResponse {
//!             session_id: task.session_id.clone(),
//!             request_id: task.request_id,
//!             result: Ok(Value::Bytes(b"host-1\n".to_vec())),
//!         })
//!         .unwrap();
//! }
//! assert!(fleet.get_status(&session).unwrap().is_terminal());
//! ```

#![warn(missing_docs)]

mod fleet;
pub mod prelude;

pub use fleet::{Fleet, FleetBuilder};
pub use magpie_archive::{ArchiveStreamer, Compression};
pub use magpie_core::{
    AgeSelector, AgentId, Error, ObjectName, RequestId, Result, SessionId, Timestamp, Value,
};
pub use magpie_flow::{
    FlowLogic, FlowRegistry, FlowRunner, FlowStatus, OutboundRequest, RetryPolicy, StepContext,
    StepOutcome,
};
pub use magpie_object::{Container, KindTag, ObjectHandle, Schema, Stream};
pub use magpie_queue::{Priority, Task, TaskQueue, TaskResponse};
pub use magpie_store::AttributeStore;
