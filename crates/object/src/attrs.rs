//! Well-known attribute names
//!
//! Attribute names are plain strings in the store; these constants are
//! the schema vocabulary the built-in kinds declare. A trailing `:`
//! marks a prefix family (one attribute per chunk, per request, ...).

/// Kind tag of the object; its version times are the object's version
/// times.
pub const TYPE: &str = "type";

/// Total byte length of a stream's content.
pub const SIZE: &str = "size";

/// Structured stat record for filesystem entries.
pub const STAT: &str = "stat";

/// When content was last collected.
pub const LAST: &str = "last";

/// Chunk size a stream was written with.
pub const CHUNK_SIZE: &str = "chunk_size";

/// Prefix family for stream content chunks: `content:<10-digit index>`.
pub const CONTENT_PREFIX: &str = "content:";

/// Flow kind name the instance was started with.
pub const FLOW_KIND: &str = "flow:kind";

/// Externally visible lifecycle flag (RUNNING / FINISHED / ERROR).
pub const FLOW_STATUS: &str = "flow:status";

/// Opaque engine-defined progress blob, rewritten at every checkpoint.
pub const FLOW_STATE: &str = "flow:state";

/// Outstanding request ids awaiting a response.
pub const FLOW_PENDING: &str = "flow:pending";

/// Responses buffered for the current step.
pub const FLOW_COLLECTED: &str = "flow:collected";

/// Terminal result written when the flow finishes.
pub const FLOW_RESULT: &str = "flow:result";

/// Error recorded when flow logic fails.
pub const FLOW_ERROR: &str = "flow:error";

/// Agent the flow runs against.
pub const FLOW_AGENT: &str = "flow:agent";

/// Arguments the flow was started with.
pub const FLOW_ARGS: &str = "flow:args";

/// Format the content-chunk attribute name for a chunk index.
///
/// Zero-padded so attribute-name order equals chunk order.
pub fn content_chunk(index: u64) -> String {
    format!("{CONTENT_PREFIX}{index:010}")
}

/// Parse a chunk index back out of a content attribute name.
pub fn content_chunk_index(attribute: &str) -> Option<u64> {
    attribute.strip_prefix(CONTENT_PREFIX)?.parse().ok()
}
