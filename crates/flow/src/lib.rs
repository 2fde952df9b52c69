//! Durable flow instances
//!
//! A flow is a persisted state machine that collects data from one
//! agent across many request/response round trips. Between steps the
//! instance is nothing but attributes on a store object; any worker
//! holding the session lease can load it, advance it one step, and
//! checkpoint the result atomically. Workers are interchangeable and a
//! crash between checkpoints loses nothing.

#![warn(missing_docs)]

pub mod flows;
mod logic;
mod retry;
mod runner;
mod status;

pub use logic::{FlowLogic, FlowRegistry, OutboundRequest, StepContext, StepOutcome};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use runner::{FlowRunner, DEFAULT_SESSION_LEASE_MICROS};
pub use status::FlowStatus;
