//! Agent task queue
//!
//! Endpoint agents are offline most of the time. Outbound work sits in
//! a per-agent mailbox until the agent checks in, is leased out for a
//! bounded interval, and is requeued if the agent never acknowledges
//! it. Delivery is at-least-once: a task is delivered, cancelled, or
//! pending, never silently dropped.
//!
//! Responses travel the other way through per-session inboxes; the flow
//! runner drains an inbox and delivers the batch to the owning session.

#![warn(missing_docs)]

mod queue;
mod task;

pub use queue::{TaskQueue, DEFAULT_LEASE_MICROS};
pub use task::{Priority, Task, TaskResponse};
