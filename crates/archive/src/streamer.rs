//! Multi-stream archive merge

use crate::generator::{ArchiveGenerator, Compression, FileMeta};
use magpie_core::Result;
use magpie_object::{MultiStreamChunks, Stream};
use std::collections::VecDeque;
use tracing::debug;

const DEFAULT_MODE: u32 = 0o644;

/// Streams an archive of many collected streams.
///
/// An iterator of byte pieces: headers and footers are emitted on
/// stream-identity changes in the underlying chunk merge, so every
/// stream gets exactly one header/footer pair, empty streams included.
/// Pull-driven end to end; dropping the iterator cancels the export.
pub struct ArchiveStreamer {
    generator: Option<ArchiveGenerator>,
    chunks: MultiStreamChunks,
    // Archive path and metadata per stream, in stream order.
    members: Vec<(String, FileMeta)>,
    // Streams [0, next_member) have had their header emitted.
    next_member: usize,
    open: bool,
    pieces: VecDeque<Vec<u8>>,
    failed: bool,
}

impl ArchiveStreamer {
    /// Export `streams` under `prefix/` in the archive.
    pub fn new(streams: Vec<Stream>, prefix: &str, compression: Compression) -> Result<Self> {
        let members = streams
            .iter()
            .map(|stream| {
                let path = if prefix.is_empty() {
                    stream.name().to_string()
                } else {
                    format!("{}/{}", prefix.trim_end_matches('/'), stream.name())
                };
                let meta = FileMeta {
                    size: stream.size(),
                    mtime: stream
                        .content_age()
                        .map(|micros| (micros / 1_000_000).max(0) as u64)
                        .unwrap_or(0),
                    mode: DEFAULT_MODE,
                };
                (path, meta)
            })
            .collect();
        Ok(ArchiveStreamer {
            generator: Some(ArchiveGenerator::open(compression)?),
            chunks: MultiStreamChunks::new(streams),
            members,
            next_member: 0,
            open: false,
            pieces: VecDeque::new(),
            failed: false,
        })
    }

    fn push(&mut self, piece: Vec<u8>) {
        if !piece.is_empty() {
            self.pieces.push_back(piece);
        }
    }

    /// Close the open member and open members up to and including
    /// `target`; members skipped over are empty and get an immediate
    /// header/footer pair.
    fn open_through(&mut self, target: usize) -> Result<()> {
        let Some(generator) = self.generator.as_mut() else {
            return Ok(());
        };
        let mut queued = Vec::new();
        if self.open {
            queued.push(generator.write_file_footer()?);
            self.open = false;
        }
        while self.next_member <= target {
            let (path, meta) = &self.members[self.next_member];
            debug!(path, size = meta.size, "archiving stream");
            queued.push(generator.write_file_header(path, meta)?);
            if self.next_member < target {
                queued.push(generator.write_file_footer()?);
            } else {
                self.open = true;
            }
            self.next_member += 1;
        }
        for piece in queued {
            self.push(piece);
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        match self.chunks.next() {
            Some(chunk) => {
                let chunk = chunk?;
                if !self.open || self.next_member != chunk.stream_index + 1 {
                    self.open_through(chunk.stream_index)?;
                }
                let Some(generator) = self.generator.as_mut() else {
                    return Ok(());
                };
                let piece = generator.write_file_chunk(&chunk.data)?;
                self.push(piece);
            }
            None => {
                // Everything read; flush trailing empty members and the
                // archive trailer.
                let last = self.members.len();
                if self.next_member < last {
                    self.open_through(last - 1)?;
                }
                if let Some(mut generator) = self.generator.take() {
                    let mut queued = Vec::new();
                    if self.open {
                        queued.push(generator.write_file_footer()?);
                        self.open = false;
                    }
                    queued.push(generator.close()?);
                    for piece in queued {
                        self.push(piece);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Iterator for ArchiveStreamer {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(piece) = self.pieces.pop_front() {
                return Some(Ok(piece));
            }
            if self.failed || self.generator.is_none() {
                return None;
            }
            if let Err(err) = self.advance() {
                self.failed = true;
                return Some(Err(err));
            }
        }
    }
}
