//! Convenience re-exports for typical callers.

pub use crate::{
    AgeSelector, AgentId, Compression, Error, Fleet, FleetBuilder, FlowStatus, ObjectName,
    Priority, RequestId, Result, SessionId, Task, TaskResponse, Timestamp, Value,
};
