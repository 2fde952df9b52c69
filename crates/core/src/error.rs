//! Unified error taxonomy
//!
//! One canonical error enum for the whole substrate. The taxonomy
//! matters more than the messages: callers branch on which kind
//! occurred, and only [`Error::is_transient`] failures are retried.

use thiserror::Error;

/// All Magpie errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Name does not resolve to any data, or to data of the expected
    /// kind. Terminal; surfaced to callers as-is.
    #[error("not found: {0}")]
    NotFound(String),

    /// An open/upgrade asked for a kind the stored object is not.
    #[error("wrong kind: expected {expected}, got {actual}")]
    WrongKind {
        /// Kind the caller asked for.
        expected: String,
        /// Kind actually stored.
        actual: String,
    },

    /// Transient I/O failure. Retried internally with backoff; surfaced
    /// only after retries are exhausted.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A per-name lease is held by someone else. Not a failure: try
    /// again shortly.
    #[error("lock contention on {0}")]
    LockContention(String),

    /// Flow step logic raised. Terminal for the session; recorded on
    /// the instance and surfaced as flow status ERROR.
    #[error("flow logic error: {0}")]
    FlowLogic(String),

    /// A path or component failed name validation.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Encoding or decoding of a persisted value failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Underlying I/O error (archive sinks, test fixtures).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bug or invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the operation may succeed.
    ///
    /// Lock contention and transient unavailability are the only
    /// retryable kinds; everything else is terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Unavailable(_) | Error::LockContention(_))
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Error::NotFound(what.to_string())
    }
}

/// Result alias used throughout the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;
