use anyhow::{bail, Result};
use bloom::BloomFilter;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::format::{bloom_path, Fnv32, FOOTER_BYTES, INDEX_STRIDE, SSTABLE_MAGIC, TOMBSTONE_VSIZE};

/// Outcome of probing a single SSTable for a key.
///
/// `Tombstone` and `Value` both terminate a stack search: a tombstone in a
/// newer table shadows any value in an older one. `Missing` means this table
/// has no entry (certainly, or "probably not" via the bloom filter) and the
/// search moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Missing,
    Tombstone,
    Value(Vec<u8>),
}

/// Sparse-index entry: the first key of an indexed record and its offset.
struct IndexEntry {
    key: Vec<u8>,
    offset: u64,
}

/// Read handle for one SSTable.
///
/// [`open`](Self::open) validates the footer checksum first; a corrupt file
/// never yields a reader. A valid table keeps a read-only [`File`] used only
/// through positional reads (`read_exact_at`), so a reader is freely shared
/// across threads with no interior locking; the engine clones `Arc`s of
/// these into read snapshots.
///
/// The sparse index holds every 16th record's (first key, offset); a lookup
/// binary-searches it and then walks at most 16 records. If the bloom
/// sidecar was loadable, negative lookups usually return without touching
/// the file at all.
pub struct SsTableReader {
    path: PathBuf,
    file: File,
    /// End of the records region (file size minus footer).
    end: u64,
    index: Vec<IndexEntry>,
    bloom: Option<BloomFilter>,
}

impl SsTableReader {
    /// Opens and validates the table at `path`, building the sparse index.
    ///
    /// Fails if the file is missing, too small, has a bad magic, or its
    /// checksum does not match; callers treat such files as absent. A
    /// missing or unreadable bloom sidecar is not an error.
    pub fn open(path: &Path) -> Result<Self> {
        if !Self::is_valid(path) {
            bail!("corrupt or unreadable sstable: {}", path.display());
        }

        let file = File::open(path)?;
        let size = file.metadata()?.len();

        let mut table = Self {
            path: path.to_path_buf(),
            file,
            end: size - FOOTER_BYTES,
            index: Vec::new(),
            bloom: BloomFilter::load(&bloom_path(path)).ok(),
        };

        // Walk the records region once, indexing every 16th record. The
        // walk stops early at anything malformed; the checksum pass above
        // makes that unreachable in practice.
        let mut offset = 0u64;
        let mut count = 0u64;
        while offset < table.end {
            let Some((key, next)) = table.read_key_at(offset) else {
                break;
            };
            if count % INDEX_STRIDE == 0 {
                table.index.push(IndexEntry { key, offset });
            }
            count += 1;
            offset = next;
        }

        Ok(table)
    }

    /// Validates the file at `path`: size, footer magic, and a full
    /// recomputation of the records-region FNV-1a/32 checksum, streamed in
    /// chunks.
    pub fn is_valid(path: &Path) -> bool {
        fn check(path: &Path) -> io::Result<bool> {
            let file = File::open(path)?;
            let size = file.metadata()?.len();
            if size < FOOTER_BYTES {
                return Ok(false);
            }

            let mut footer = [0u8; FOOTER_BYTES as usize];
            file.read_exact_at(&mut footer, size - FOOTER_BYTES)?;
            let magic = u64::from_le_bytes(footer[0..8].try_into().unwrap());
            let stored = u32::from_le_bytes(footer[8..12].try_into().unwrap());
            if magic != SSTABLE_MAGIC {
                return Ok(false);
            }

            let mut chk = Fnv32::new();
            let mut buf = vec![0u8; 64 * 1024];
            let mut offset = 0u64;
            let mut remaining = size - FOOTER_BYTES;
            while remaining > 0 {
                let n = remaining.min(buf.len() as u64) as usize;
                file.read_exact_at(&mut buf[..n], offset)?;
                chk.update(&buf[..n]);
                offset += n as u64;
                remaining -= n as u64;
            }
            Ok(chk.finish() == stored)
        }
        check(path).unwrap_or(false)
    }

    /// Point lookup.
    ///
    /// Never fails: any read problem or malformed record mid-scan simply
    /// ends the scan as [`Probe::Missing`].
    pub fn get(&self, key: &[u8]) -> Probe {
        if let Some(ref bf) = self.bloom {
            if !bf.possibly_contains(key) {
                return Probe::Missing;
            }
        }

        if self.index.is_empty() {
            return Probe::Missing;
        }

        // Greatest indexed key <= target; a target below index[0] still
        // starts at index[0].offset (== 0) and falls out on the first
        // greater key.
        let pos = self.index.partition_point(|e| e.key.as_slice() <= key);
        let mut offset = self.index[pos.saturating_sub(1)].offset;

        while let Some((k, v, next)) = self.read_record_at(offset) {
            if k.as_slice() == key {
                return match v {
                    Some(value) => Probe::Value(value),
                    None => Probe::Tombstone,
                };
            }
            if k.as_slice() > key {
                break;
            }
            offset = next;
        }
        Probe::Missing
    }

    /// Sequential iterator over all records, in key order. Compaction feeds
    /// these into the merge heap.
    pub fn records(&self) -> RecordIter<'_> {
        RecordIter {
            table: self,
            offset: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ---- record parsing ----
    //
    // Both helpers treat any bound violation or short read as a soft
    // end-of-scan (None), never an error: a corrupt tail truncates the
    // table, it does not break it.

    /// Reads the record header at `offset`, returning (ksize, vsize).
    fn read_header_at(&self, offset: u64) -> Option<(u32, u32)> {
        if offset + 8 > self.end {
            return None;
        }
        let mut buf = [0u8; 8];
        self.file.read_exact_at(&mut buf, offset).ok()?;
        Some((
            u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        ))
    }

    /// Reads the key at `offset` and computes the next record offset,
    /// without touching the value bytes. Used for the index-building walk.
    fn read_key_at(&self, offset: u64) -> Option<(Vec<u8>, u64)> {
        let (ksize, vsize) = self.read_header_at(offset)?;
        let key_end = offset.checked_add(8 + ksize as u64)?;
        if key_end > self.end {
            return None;
        }

        let mut key = vec![0u8; ksize as usize];
        self.file.read_exact_at(&mut key, offset + 8).ok()?;

        let next = if vsize == TOMBSTONE_VSIZE {
            key_end
        } else {
            let value_end = key_end.checked_add(vsize as u64)?;
            if value_end > self.end {
                return None;
            }
            value_end
        };
        Some((key, next))
    }

    /// Reads the full record at `offset`: key, optional value, next offset.
    fn read_record_at(&self, offset: u64) -> Option<(Vec<u8>, Option<Vec<u8>>, u64)> {
        let (ksize, vsize) = self.read_header_at(offset)?;
        let key_end = offset.checked_add(8 + ksize as u64)?;
        if key_end > self.end {
            return None;
        }

        let mut key = vec![0u8; ksize as usize];
        self.file.read_exact_at(&mut key, offset + 8).ok()?;

        if vsize == TOMBSTONE_VSIZE {
            return Some((key, None, key_end));
        }

        let value_end = key_end.checked_add(vsize as u64)?;
        if value_end > self.end {
            return None;
        }
        let mut value = vec![0u8; vsize as usize];
        self.file.read_exact_at(&mut value, key_end).ok()?;
        Some((key, Some(value), value_end))
    }
}

impl std::fmt::Debug for SsTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsTableReader")
            .field("path", &self.path)
            .field("records_end", &self.end)
            .field("index_entries", &self.index.len())
            .field("bloom", &self.bloom.is_some())
            .finish()
    }
}

/// Forward iterator over a table's records. Stops at the records-region end
/// or the first malformed record, whichever comes first.
pub struct RecordIter<'a> {
    table: &'a SsTableReader,
    offset: u64,
}

impl Iterator for RecordIter<'_> {
    type Item = (Vec<u8>, Option<Vec<u8>>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.table.end {
            return None;
        }
        let (key, value, next) = self.table.read_record_at(self.offset)?;
        self.offset = next;
        Some((key, value))
    }
}
