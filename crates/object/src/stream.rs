//! Chunked byte streams
//!
//! A stream's content lives as versioned `content:NNNNNNNNNN`
//! attributes, one per fixed-size chunk; `size` is the derived total.
//! Random-offset reads compute the covering chunk range and fetch it in
//! one ranged read, so a read touches only the chunks it needs.

use crate::attrs;
use crate::handle::ObjectHandle;
use crate::schema::{KindTag, Schema};
use magpie_core::{AgeSelector, Error, ObjectName, Result, Timestamp, Value};
use magpie_store::AttributeStore;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default content chunk size: 512 KiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 512 * 1024;

/// How many chunks a batched multi-stream read fetches at once.
const READ_WINDOW_CHUNKS: u64 = 8;

/// A chunked byte stream object.
#[derive(Debug)]
pub struct Stream {
    handle: ObjectHandle,
    chunk_size: u64,
}

impl Stream {
    /// Create an empty stream at `name`.
    pub fn create(
        store: Arc<AttributeStore>,
        schema: Arc<Schema>,
        name: ObjectName,
        chunk_size: Option<u64>,
    ) -> Result<Self> {
        let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(Error::Internal("chunk size must be positive".into()));
        }
        let mut handle = ObjectHandle::create(store, schema, name, KindTag::stream())?;
        handle.set_batch(vec![
            (attrs::SIZE.to_string(), Value::Int(0)),
            (attrs::CHUNK_SIZE.to_string(), Value::Int(chunk_size as i64)),
        ])?;
        Ok(Stream { handle, chunk_size })
    }

    /// Open an existing stream.
    pub fn open(
        store: Arc<AttributeStore>,
        schema: Arc<Schema>,
        name: &ObjectName,
        age: AgeSelector,
    ) -> Result<Self> {
        let handle = ObjectHandle::open(store, schema, name, &KindTag::stream(), age)?;
        Self::from_handle(handle)
    }

    /// Wrap an already-open handle, checking its kind.
    pub fn from_handle(handle: ObjectHandle) -> Result<Self> {
        if !handle.schema().is_a(handle.kind(), &KindTag::stream()) {
            return Err(Error::WrongKind {
                expected: KindTag::stream().to_string(),
                actual: handle.kind().to_string(),
            });
        }
        let chunk_size = handle
            .get(attrs::CHUNK_SIZE)
            .and_then(Value::as_int)
            .map(|n| n as u64)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        Ok(Stream { handle, chunk_size })
    }

    /// The stream's name.
    pub fn name(&self) -> &ObjectName {
        self.handle.name()
    }

    /// The underlying handle.
    pub fn handle(&self) -> &ObjectHandle {
        &self.handle
    }

    /// Chunk size the content is stored with.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Total content length in bytes (the derived `size` attribute).
    pub fn size(&self) -> u64 {
        self.handle
            .get(attrs::SIZE)
            .and_then(Value::as_int)
            .map(|n| n.max(0) as u64)
            .unwrap_or(0)
    }

    /// When content was last collected; `None` if never.
    pub fn content_age(&self) -> Option<Timestamp> {
        self.handle
            .get_versions(attrs::LAST)
            .first()
            .map(|(_, ts)| *ts)
    }

    /// Append bytes to the stream.
    ///
    /// A trailing partial chunk is re-versioned with the merged
    /// content; full chunks, the new `size` and the `last` collection
    /// marker all land in one atomic batch.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return self
                .handle
                .set_batch(vec![(attrs::LAST.to_string(), Value::Null)]);
        }

        let size = self.size();
        let cs = self.chunk_size;
        let first_chunk = size / cs;
        let intra = (size % cs) as usize;

        let mut combined = if intra > 0 {
            self.read_chunk(first_chunk)?
        } else {
            Vec::new()
        };
        combined.extend_from_slice(data);

        let mut writes = Vec::new();
        for (i, chunk) in combined.chunks(cs as usize).enumerate() {
            writes.push((
                attrs::content_chunk(first_chunk + i as u64),
                Value::Bytes(chunk.to_vec()),
            ));
        }
        writes.push((
            attrs::SIZE.to_string(),
            Value::Int((size + data.len() as u64) as i64),
        ));
        writes.push((attrs::LAST.to_string(), Value::Null));
        self.handle.set_batch(writes)
    }

    fn read_age(&self) -> AgeSelector {
        // Content reads want one version per chunk even when the handle
        // was opened with full history.
        match self.handle.age() {
            AgeSelector::AllTimes => AgeSelector::Newest,
            other => other,
        }
    }

    fn read_chunk(&self, index: u64) -> Result<Vec<u8>> {
        let versions = self.handle.store().read(
            self.handle.name(),
            &attrs::content_chunk(index),
            self.read_age(),
        )?;
        match versions.into_iter().next() {
            Some((Value::Bytes(bytes), _)) => Ok(bytes),
            Some((other, _)) => Err(Error::Serialization(format!(
                "chunk {index} of {} holds {}, expected Bytes",
                self.handle.name(),
                other.type_name()
            ))),
            None => Ok(Vec::new()),
        }
    }

    /// Read `length` bytes starting at `offset`.
    ///
    /// `length == 0` means to end of stream. Reads past the end clamp;
    /// an offset at or past the end reads empty. One ranged store read
    /// fetches exactly the covering chunk window.
    pub fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let size = self.size();
        if offset >= size {
            return Ok(Vec::new());
        }
        let length = if length == 0 {
            size - offset
        } else {
            length.min(size - offset)
        };

        let cs = self.chunk_size;
        let first = offset / cs;
        let last = (offset + length - 1) / cs;

        let window = self.handle.store().read_range(
            self.handle.name(),
            &attrs::content_chunk(first),
            &attrs::content_chunk(last),
            self.read_age(),
        )?;

        // Assemble the covering window, then slice the exact request.
        let mut buffer = vec![0u8; ((last - first + 1) * cs) as usize];
        let mut high_water = 0usize;
        for av in window {
            let Some(index) = attrs::content_chunk_index(&av.attribute) else {
                continue;
            };
            let Some(bytes) = av.value.as_bytes() else {
                return Err(Error::Serialization(format!(
                    "chunk {index} of {} holds {}, expected Bytes",
                    self.handle.name(),
                    av.value.type_name()
                )));
            };
            let at = ((index - first) * cs) as usize;
            buffer[at..at + bytes.len()].copy_from_slice(bytes);
            high_water = high_water.max(at + bytes.len());
        }

        let start = (offset - first * cs) as usize;
        let end = start + length as usize;
        if end > high_water {
            return Err(Error::not_found(format!(
                "{}: content missing past byte {high_water}",
                self.handle.name()
            )));
        }
        Ok(buffer[start..end].to_vec())
    }
}

/// One chunk pulled from a multi-stream read.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    /// Index of the source stream in the input order.
    pub stream_index: usize,
    /// Byte offset of this chunk within its stream.
    pub offset: u64,
    /// The chunk payload.
    pub data: Vec<u8>,
}

/// Pull-iterator over many streams' chunks.
///
/// Yields chunks ordered by stream identity first, then offset, with at
/// most one read window buffered. A consumer that stops pulling stops
/// the reads; there is nothing to cancel.
pub struct MultiStreamChunks {
    streams: Vec<Stream>,
    current: usize,
    offset: u64,
    window: VecDeque<StreamChunk>,
}

impl MultiStreamChunks {
    /// Iterate the chunks of `streams` in order.
    pub fn new(streams: Vec<Stream>) -> Self {
        MultiStreamChunks {
            streams,
            current: 0,
            offset: 0,
            window: VecDeque::new(),
        }
    }

    /// The streams being merged.
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn refill(&mut self) -> Result<()> {
        while self.window.is_empty() && self.current < self.streams.len() {
            let stream = &self.streams[self.current];
            let size = stream.size();
            if self.offset >= size {
                self.current += 1;
                self.offset = 0;
                continue;
            }
            let cs = stream.chunk_size();
            let want = (READ_WINDOW_CHUNKS * cs).min(size - self.offset);
            let data = stream.read(self.offset, want)?;
            for piece in data.chunks(cs as usize) {
                self.window.push_back(StreamChunk {
                    stream_index: self.current,
                    offset: self.offset,
                    data: piece.to_vec(),
                });
                self.offset += piece.len() as u64;
            }
        }
        Ok(())
    }
}

impl Iterator for MultiStreamChunks {
    type Item = Result<StreamChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.window.is_empty() {
            if let Err(e) = self.refill() {
                // Poison further pulls by skipping the failed stream.
                self.current += 1;
                self.offset = 0;
                return Some(Err(e));
            }
        }
        self.window.pop_front().map(Ok)
    }
}
