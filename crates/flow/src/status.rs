//! Flow lifecycle status

use magpie_core::{Error, Result};

/// Lifecycle state of a flow instance.
///
/// `Running` is the only non-terminal state; a terminal instance never
/// changes again and responses delivered to it are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Waiting on agent responses or ready to advance.
    Running,
    /// Completed; `flow:result` holds the outcome.
    Finished,
    /// Step logic failed; `flow:error` holds the message.
    Error,
}

impl FlowStatus {
    /// The persisted string form.
    pub fn as_str(self) -> &'static str {
        match self {
            FlowStatus::Running => "RUNNING",
            FlowStatus::Finished => "FINISHED",
            FlowStatus::Error => "ERROR",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "RUNNING" => Ok(FlowStatus::Running),
            "FINISHED" => Ok(FlowStatus::Finished),
            "ERROR" => Ok(FlowStatus::Error),
            other => Err(Error::Serialization(format!(
                "unknown flow status {other:?}"
            ))),
        }
    }

    /// Whether the instance will never change again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, FlowStatus::Running)
    }
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlowStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FlowStatus::parse(s)
    }
}
