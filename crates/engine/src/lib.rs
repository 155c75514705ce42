//! # Engine: the HeliosDB storage engine
//!
//! Ties the [`memtable`], [`wal`], and [`sstable`] crates together into a
//! complete LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌─────────────────────────────────────────────────┐
//! │                  HeliosDb                       │
//! │                                                 │
//! │ write.rs → WAL append → Memtable insert         │
//! │              |                                  │
//! │              | (memtable >= 1 MiB?)             │
//! │              v                                  │
//! │           flush → new SSTable + manifest entry  │
//! │              |                                  │
//! │              | (stack >= 8 tables?)             │
//! │              v                                  │
//! │      background worker → merge 4 newest         │
//! │                                                 │
//! │ read.rs → Memtable → SSTables newest→oldest     │
//! │             (first hit wins)                    │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module          | Purpose                                            |
//! |-----------------|----------------------------------------------------|
//! | `lib.rs`        | `HeliosDb`, open/close, the shared state + worker  |
//! | `manifest.rs`   | ordered list of live SSTable names, atomic rewrite |
//! | `recovery.rs`   | tmp cleanup, manifest scrubbing, WAL replay        |
//! | `write.rs`      | `put()`, `del()`, `flush()`                        |
//! | `read.rs`       | `get()`                                            |
//! | `compaction.rs` | `compact()`, the worker loop, one merge attempt    |
//!
//! ## Concurrency
//!
//! A single `RwLock` guards all mutable engine state: memtable, WAL handle,
//! SSTable stack, manifest, and the id counter. Mutations and both install
//! phases of compaction take it exclusively; `get` takes it shared just long
//! enough to probe the memtable and clone the stack snapshot. The readers
//! in the snapshot are `Arc`-shared and internally immutable, so SSTable
//! probes run without the lock.
//!
//! A separate mutex + condvar pair wakes the single background compaction
//! worker; it guards only the stop/request flags, never storage state.
//!
//! ## Crash safety
//!
//! Every mutation hits the WAL before the memtable. The WAL is reset only
//! after a flush has fsync'd both the new SSTable and the manifest that
//! names it. SSTables and the manifest are written via tmp + rename, so a
//! kill at any point leaves either the old state or the new one, never a
//! half-written file that a later open would trust.

mod compaction;
mod manifest;
mod read;
mod recovery;
mod write;

use anyhow::Result;
use manifest::Manifest;
use memtable::Memtable;
use parking_lot::{Condvar, Mutex, RwLock};
use sstable::SsTableReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::info;
use wal::WalWriter;

/// Memtable byte threshold that triggers a synchronous flush.
pub const MEMTABLE_MAX_BYTES: usize = 1 << 20;

/// Stack depth at which a compaction request is enqueued.
pub const COMPACTION_TRIGGER: usize = 8;

/// How many of the newest SSTables one merge attempt consumes.
pub const MERGE_WIDTH: usize = 4;

/// WAL filename inside the data directory.
pub const WAL_FILENAME: &str = "wal.log";

/// Largest accepted key.
pub const MAX_KEY_SIZE: usize = u32::MAX as usize;
/// Largest accepted value. `u32::MAX` itself is the tombstone sentinel.
pub const MAX_VALUE_SIZE: usize = (u32::MAX - 1) as usize;

/// `sst_000123.dat`
pub(crate) fn sst_filename(id: u64) -> String {
    format!("sst_{:06}.dat", id)
}

/// Everything the storage lock protects.
pub(crate) struct State {
    pub(crate) mem: Memtable,
    pub(crate) wal: WalWriter,
    /// Live tables, newest first. Mirrors the manifest (which is stored
    /// oldest first).
    pub(crate) sstables: Vec<Arc<SsTableReader>>,
    pub(crate) manifest: Manifest,
    pub(crate) next_sst_id: u64,
}

/// Wake-up flags for the compaction worker. Guarded by its own mutex so
/// that requesting work never contends with the storage lock.
#[derive(Default)]
pub(crate) struct BgFlags {
    pub(crate) stop: bool,
    pub(crate) requested: bool,
}

pub(crate) struct Shared {
    pub(crate) dir: PathBuf,
    pub(crate) state: RwLock<State>,
    pub(crate) bg: Mutex<BgFlags>,
    pub(crate) bg_cv: Condvar,
}

/// The storage engine handle.
///
/// Cheap to share behind an `Arc` from the caller's side; all methods take
/// `&self` except [`close`](Self::close). Dropping the handle shuts the
/// background worker down; unflushed data stays in the WAL and is replayed
/// by the next [`open`](Self::open).
pub struct HeliosDb {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl HeliosDb {
    /// Opens (creating if necessary) the data directory and recovers its
    /// state: stale `*.tmp` files are deleted, the manifest is loaded and
    /// scrubbed of missing or corrupt SSTables, and the WAL is replayed
    /// into a fresh memtable. Finally the background compaction worker is
    /// started.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        recovery::remove_tmp_files(&dir);
        let (manifest, sstables, next_sst_id) = recovery::load_manifest_and_tables(&dir)?;

        let wal_path = dir.join(WAL_FILENAME);
        let mut mem = Memtable::new();
        recovery::replay_wal(&wal_path, &mut mem)?;
        let wal = WalWriter::create(&wal_path)?;

        info!(
            dir = %dir.display(),
            sstables = sstables.len(),
            replayed_entries = mem.len(),
            "opened database"
        );

        let shared = Arc::new(Shared {
            dir,
            state: RwLock::new(State {
                mem,
                wal,
                sstables,
                manifest,
                next_sst_id,
            }),
            bg: Mutex::new(BgFlags::default()),
            bg_cv: Condvar::new(),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("helios-compact".into())
                .spawn(move || shared.worker_loop())?
        };

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Stops and joins the background worker. Idempotent; also runs on
    /// drop. No engine calls are defined after `close`.
    pub fn close(&mut self) {
        if let Some(handle) = self.worker.take() {
            {
                let mut flags = self.shared.bg.lock();
                flags.stop = true;
            }
            self.shared.bg_cv.notify_all();
            let _ = handle.join();
        }
    }

    /// Number of live SSTables in the stack.
    #[must_use]
    pub fn sstable_count(&self) -> usize {
        self.shared.state.read().sstables.len()
    }

    /// Current memtable size in accounted bytes.
    #[must_use]
    pub fn memtable_bytes(&self) -> usize {
        self.shared.state.read().mem.bytes()
    }

    /// Number of memtable entries, tombstones included.
    #[must_use]
    pub fn memtable_entries(&self) -> usize {
        self.shared.state.read().mem.len()
    }
}

impl std::fmt::Debug for HeliosDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("HeliosDb")
            .field("dir", &self.shared.dir)
            .field("memtable_entries", &state.mem.len())
            .field("memtable_bytes", &state.mem.bytes())
            .field("sstables", &state.sstables.len())
            .field("next_sst_id", &state.next_sst_id)
            .finish()
    }
}

impl Drop for HeliosDb {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests;
