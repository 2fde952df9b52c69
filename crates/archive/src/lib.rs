//! Streaming archive export
//!
//! Turns collected streams into a tar archive (optionally zstd-framed)
//! without ever holding more than one content chunk in memory. The
//! generator is a push-style codec: every call returns exactly the
//! bytes to emit. The streamer drives it from a multi-stream read,
//! pull-based, so a slow consumer back-pressures the reads and
//! dropping the iterator is cancellation.

#![warn(missing_docs)]

mod generator;
mod streamer;

pub use generator::{ArchiveGenerator, Compression, FileMeta};
pub use streamer::ArchiveStreamer;
