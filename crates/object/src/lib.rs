//! Typed object layer
//!
//! Gives meaning to raw attribute histories: every object has a *kind*
//! (a tag in a flat, single-rooted hierarchy) that decides which
//! attributes are legal and how they are interpreted. The store knows
//! bytes and timestamps; this layer knows that `agent-1/fs/etc/passwd`
//! is a chunked stream with a size and a stat record.
//!
//! Kinds are data, not types: a [`Schema`] maps kind tag to
//! `{parent, attributes}` and inheritance is a parent-tag walk. An open
//! handle carries its tag; [`ObjectHandle::upgrade`] is a checked
//! re-tag, never a cast.

#![warn(missing_docs)]

pub mod attrs;
mod container;
mod handle;
mod schema;
mod stream;

pub use container::{walk_streams, Container};
pub use handle::{multi_open, ObjectHandle};
pub use schema::{KindTag, Schema};
pub use stream::{MultiStreamChunks, Stream, StreamChunk, DEFAULT_CHUNK_SIZE};
