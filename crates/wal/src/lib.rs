//! # WAL: Write-Ahead Log
//!
//! Crash-safe durability for the HeliosDB storage engine.
//!
//! Every mutation (`PUT` or `DELETE`) is appended here **before** the
//! corresponding memtable update. On restart the log is replayed to rebuild
//! the memtable, so no acknowledged write is lost to a process kill. A single
//! WAL covers whatever has not yet been flushed into an SSTable; after a
//! successful flush the log is [`reset`](WalWriter::reset) to zero length.
//!
//! ## Binary record format (all little-endian)
//!
//! ```text
//! [total_len: u32][type: u8][ksize: u32][vsize: u32][checksum: u32]
//! [key bytes][value bytes, PUT only]
//! ```
//!
//! `type` is 1 for PUT, 2 for DELETE (`vsize` must be 0 for DELETE), and
//! `total_len = 17 + ksize + vsize`. The checksum is FNV-1a/32 over the
//! logical payload `[type][ksize_le][vsize_le][key][value]`, not over the
//! header bytes as laid out on disk. This formulation is part of the format.
//!
//! Appends are flushed to the OS but not fsync'd: a process kill loses
//! nothing, a power cut may lose the un-synced suffix. Replay tolerates any
//! torn or garbage tail by stopping at the first bad record.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Size of the fixed record header.
pub const HEADER_LEN: u32 = 17;

const TYPE_PUT: u8 = 1;
const TYPE_DELETE: u8 = 2;

/// A mutation recovered from the log during replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// A key-value insertion.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// A key deletion (tombstone).
    Del { key: Vec<u8> },
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Key plus value exceed what a record header can describe.
    #[error("wal record too large (total_len exceeds u32::MAX)")]
    RecordTooLarge,
}

/// Append-only WAL writer.
///
/// Each record is serialized into a reusable scratch buffer, checksummed,
/// and handed to the file in a single `write_all`. The writer owns its path
/// so that [`reset`](Self::reset) can unlink and recreate the file after a
/// flush.
pub struct WalWriter {
    path: PathBuf,
    file: File,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) the log in append mode.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file,
            buf: Vec::with_capacity(256),
        })
    }

    /// Appends a PUT record.
    pub fn append_put(&mut self, key: &[u8], value: &[u8]) -> Result<(), WalError> {
        self.append_record(TYPE_PUT, key, Some(value))
    }

    /// Appends a DELETE record.
    pub fn append_delete(&mut self, key: &[u8]) -> Result<(), WalError> {
        self.append_record(TYPE_DELETE, key, None)
    }

    fn append_record(
        &mut self,
        kind: u8,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> Result<(), WalError> {
        let ksize = key.len() as u32;
        let vsize = value.map_or(0, |v| v.len() as u32);

        let total_len = HEADER_LEN as u64 + ksize as u64 + vsize as u64;
        if total_len > u32::MAX as u64 {
            return Err(WalError::RecordTooLarge);
        }

        // Checksum covers the logical payload, not the on-disk header.
        let mut chk = Fnv32::new();
        chk.update(&[kind]);
        chk.update(&ksize.to_le_bytes());
        chk.update(&vsize.to_le_bytes());
        chk.update(key);
        if let Some(v) = value {
            chk.update(v);
        }

        self.buf.clear();
        self.buf.extend_from_slice(&(total_len as u32).to_le_bytes());
        self.buf.push(kind);
        self.buf.extend_from_slice(&ksize.to_le_bytes());
        self.buf.extend_from_slice(&vsize.to_le_bytes());
        self.buf.extend_from_slice(&chk.finish().to_le_bytes());
        self.buf.extend_from_slice(key);
        if let Some(v) = value {
            self.buf.extend_from_slice(v);
        }

        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        Ok(())
    }

    /// Unlinks the log and reopens it empty, in append mode. Called after a
    /// flush has durably promoted the memtable into an SSTable.
    pub fn reset(&mut self) -> Result<(), WalError> {
        fs::remove_file(&self.path)?;
        self.file = open_append(&self.path)?;
        Ok(())
    }

    /// Forces everything down to disk. Not part of the per-record append
    /// path; available for callers that want a stronger durability point.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Sequential reader that replays the valid prefix of a log.
///
/// Generic over any `Read` so tests can replay from in-memory buffers.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing log for replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays records in order, invoking `apply` for each valid one.
    ///
    /// Replay is bounded-prefix: it stops silently (returning `Ok`) at the
    /// first sign of a torn or corrupt tail, which is any of
    ///
    /// * end of file, or a short header read;
    /// * `total_len < 17`;
    /// * an unknown record type;
    /// * a DELETE with a nonzero `vsize`;
    /// * `total_len != 17 + ksize + vsize`;
    /// * a short key or value read;
    /// * a checksum mismatch.
    ///
    /// Everything before the first bad record has already been applied.
    /// Genuine I/O errors (anything other than an unexpected EOF) propagate.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(WalRecord),
    {
        loop {
            let mut header = [0u8; HEADER_LEN as usize];
            match self.rdr.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            }

            let mut fields = &header[..];
            let total_len = fields.read_u32::<LittleEndian>()?;
            let kind = fields.read_u8()?;
            let ksize = fields.read_u32::<LittleEndian>()?;
            let vsize = fields.read_u32::<LittleEndian>()?;
            let checksum = fields.read_u32::<LittleEndian>()?;

            if total_len < HEADER_LEN {
                return Ok(());
            }
            if kind != TYPE_PUT && kind != TYPE_DELETE {
                return Ok(());
            }
            if kind == TYPE_DELETE && vsize != 0 {
                return Ok(());
            }
            if total_len as u64 != HEADER_LEN as u64 + ksize as u64 + vsize as u64 {
                return Ok(());
            }

            let mut key = vec![0u8; ksize as usize];
            match self.rdr.read_exact(&mut key) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            }

            let mut value = Vec::new();
            if kind == TYPE_PUT {
                value.resize(vsize as usize, 0);
                match self.rdr.read_exact(&mut value) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                    Err(e) => return Err(WalError::Io(e)),
                }
            }

            let mut chk = Fnv32::new();
            chk.update(&[kind]);
            chk.update(&ksize.to_le_bytes());
            chk.update(&vsize.to_le_bytes());
            chk.update(&key);
            chk.update(&value);
            if chk.finish() != checksum {
                // Corrupt tail: stop without applying garbage.
                return Ok(());
            }

            match kind {
                TYPE_PUT => apply(WalRecord::Put { key, value }),
                _ => apply(WalRecord::Del { key }),
            }
        }
    }
}

/// Streaming FNV-1a/32 over the logical record payload.
struct Fnv32(u32);

impl Fnv32 {
    fn new() -> Self {
        Fnv32(2_166_136_261)
    }

    fn update(&mut self, data: &[u8]) {
        for &b in data {
            self.0 ^= b as u32;
            self.0 = self.0.wrapping_mul(16_777_619);
        }
    }

    fn finish(&self) -> u32 {
        self.0
    }
}
