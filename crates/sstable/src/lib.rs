//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk storage files for the HeliosDB storage engine.
//!
//! When the in-memory [`memtable`] exceeds its size threshold the engine
//! flushes it to disk as an SSTable. SSTables are *write-once, read-many*:
//! once renamed into place they are never modified, only replaced wholesale
//! by compaction.
//!
//! ## File layout
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ RECORDS (sorted by key, each key at most once)             │
//! │                                                            │
//! │ ksize (u32) | vsize (u32) | key | value                    │
//! │                                                            │
//! │ vsize == 0xFFFFFFFF marks a tombstone; the value bytes     │
//! │ are omitted entirely for tombstones.                       │
//! ├────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 12 bytes)                              │
//! │                                                            │
//! │ magic (u64 LE) "HELIOSST" | checksum (u32 LE)              │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The checksum is FNV-1a/32 over every byte
//! of the records region. A file whose magic or checksum does not match is
//! corrupt and treated as absent by readers.
//!
//! Two structures accelerate point lookups and live only in memory:
//!
//! * a **sparse index**: (first key, offset) of every 16th record, rebuilt
//!   on open by walking the file;
//! * an optional **bloom filter**, loaded from the `<path>.bloom` sidecar.
//!
//! [`memtable`]: ../memtable/index.html

mod format;
mod merge;
mod reader;
mod writer;

pub use format::{bloom_path, tmp_path, FOOTER_BYTES, SSTABLE_MAGIC, TOMBSTONE_VSIZE};
pub use merge::MergeIterator;
pub use reader::{Probe, RecordIter, SsTableReader};
pub use writer::SsTableWriter;

#[cfg(test)]
mod tests;
