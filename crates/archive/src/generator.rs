//! Push-style tar generator

use magpie_core::{Error, Result};
use std::io::Write;

const BLOCK: usize = 512;
const ZSTD_LEVEL: i32 = 3;

/// Archive compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Plain tar.
    None,
    /// Tar inside a single zstd frame.
    #[default]
    Zstd,
}

/// What the archive records about a member file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Content length; chunks must add up to exactly this.
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: u64,
    /// Unix permission bits.
    pub mode: u32,
}

enum Sink {
    Plain(Vec<u8>),
    Zstd(zstd::stream::write::Encoder<'static, Vec<u8>>),
}

impl Sink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Sink::Plain(buffer) => {
                buffer.extend_from_slice(bytes);
                Ok(())
            }
            Sink::Zstd(encoder) => {
                encoder.write_all(bytes)?;
                Ok(())
            }
        }
    }

    /// Whatever the codec has emitted since the last take. The zstd
    /// encoder is not flushed here; forcing a frame block per call
    /// would ruin the ratio on small chunks. Bytes it still holds
    /// surface on a later take or in `finish`.
    fn take(&mut self) -> Result<Vec<u8>> {
        match self {
            Sink::Plain(buffer) => Ok(std::mem::take(buffer)),
            Sink::Zstd(encoder) => Ok(std::mem::take(encoder.get_mut())),
        }
    }

    fn finish(self) -> Result<Vec<u8>> {
        match self {
            Sink::Plain(buffer) => Ok(buffer),
            Sink::Zstd(encoder) => Ok(encoder.finish()?),
        }
    }
}

struct OpenMember {
    path: String,
    declared: u64,
    written: u64,
}

/// Incremental tar writer.
///
/// Strict call discipline: `write_file_header`, then chunks summing to
/// exactly the declared size, then `write_file_footer`, repeated per
/// member, then `close`. Each call returns the bytes ready to emit;
/// the codec may hold back up to one compression block until `close`.
pub struct ArchiveGenerator {
    sink: Sink,
    member: Option<OpenMember>,
}

impl ArchiveGenerator {
    /// Start an archive.
    pub fn open(compression: Compression) -> Result<Self> {
        let sink = match compression {
            Compression::None => Sink::Plain(Vec::new()),
            Compression::Zstd => {
                Sink::Zstd(zstd::stream::write::Encoder::new(Vec::new(), ZSTD_LEVEL)?)
            }
        };
        Ok(ArchiveGenerator { sink, member: None })
    }

    /// Begin a member file.
    pub fn write_file_header(&mut self, path: &str, meta: &FileMeta) -> Result<Vec<u8>> {
        if let Some(open) = &self.member {
            return Err(Error::Internal(format!(
                "header for {path:?} while {:?} is still open",
                open.path
            )));
        }
        let mut header = tar::Header::new_ustar();
        header.set_path(path)?;
        header.set_size(meta.size);
        header.set_mtime(meta.mtime);
        header.set_mode(meta.mode);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();

        self.sink.write(header.as_bytes())?;
        self.member = Some(OpenMember {
            path: path.to_string(),
            declared: meta.size,
            written: 0,
        });
        self.sink.take()
    }

    /// Emit one chunk of the open member's content.
    pub fn write_file_chunk(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let Some(member) = &mut self.member else {
            return Err(Error::Internal("chunk with no member open".into()));
        };
        if member.written + data.len() as u64 > member.declared {
            return Err(Error::Internal(format!(
                "member {:?} overflows its declared {} bytes",
                member.path, member.declared
            )));
        }
        member.written += data.len() as u64;
        self.sink.write(data)?;
        self.sink.take()
    }

    /// Finish the open member, padding its content to a block boundary.
    pub fn write_file_footer(&mut self) -> Result<Vec<u8>> {
        let Some(member) = self.member.take() else {
            return Err(Error::Internal("footer with no member open".into()));
        };
        if member.written != member.declared {
            return Err(Error::Internal(format!(
                "member {:?} closed at {} of {} bytes",
                member.path, member.written, member.declared
            )));
        }
        let tail = (member.written % BLOCK as u64) as usize;
        if tail != 0 {
            self.sink.write(&[0u8; BLOCK][..BLOCK - tail])?;
        }
        self.sink.take()
    }

    /// Emit the archive trailer and flush the codec.
    pub fn close(mut self) -> Result<Vec<u8>> {
        if let Some(open) = &self.member {
            return Err(Error::Internal(format!(
                "close while {:?} is still open",
                open.path
            )));
        }
        self.sink.write(&[0u8; 2 * BLOCK])?;
        self.sink.finish()
    }
}
