//! Size-tiered background compaction.
//!
//! A single worker thread sleeps on a condvar until a request arrives
//! (from a deep flush or an explicit [`HeliosDb::compact`] call) and then
//! runs one merge attempt: the 4 newest SSTables are merged (newest entry
//! per key wins, tombstones preserved) into one table that replaces them
//! in the manifest.
//!
//! The scan and the write run without the storage lock; only the manifest
//! snapshot, the id allocation, and the install take it. A flush can
//! therefore land mid-merge, which the install detects by re-checking that
//! the manifest tail still equals the merged set, discarding the attempt
//! otherwise. Discarded or not, a new request is enqueued whenever the
//! stack is still at the trigger depth, so a backlog keeps draining.
//!
//! Tombstones are never dropped here: only the newest 4 tables merge, and
//! any table below them may still hold the deleted key, and dropping the
//! marker would resurrect it. The cost is that tombstones for
//! frequently-deleted keys accumulate until their older copies have been
//! merged away.

use anyhow::Result;
use sstable::{bloom_path, MergeIterator, SsTableReader, SsTableWriter};
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{sst_filename, HeliosDb, Shared};
use crate::{COMPACTION_TRIGGER, MERGE_WIDTH};

impl HeliosDb {
    /// Requests a compaction and returns immediately; the background
    /// worker picks it up.
    pub fn compact(&self) {
        self.shared.request_compaction();
    }
}

impl Shared {
    pub(crate) fn request_compaction(&self) {
        {
            let mut flags = self.bg.lock();
            flags.requested = true;
        }
        self.bg_cv.notify_one();
    }

    /// Body of the worker thread. Exits when `stop` is set by `close`.
    pub(crate) fn worker_loop(&self) {
        let mut flags = self.bg.lock();
        loop {
            self.bg_cv
                .wait_while(&mut flags, |f| !f.stop && !f.requested);
            if flags.stop {
                break;
            }
            flags.requested = false;

            drop(flags);
            if let Err(e) = self.compact_once() {
                // The inputs are untouched until install, so a failed
                // attempt loses nothing; the next request retries.
                warn!(error = %e, "compaction attempt failed");
            }
            flags = self.bg.lock();
        }
    }

    /// One merge attempt over the `MERGE_WIDTH` newest tables.
    fn compact_once(&self) -> Result<()> {
        // Snapshot the manifest tail under the storage lock.
        let inputs: Vec<String> = {
            let state = self.state.write();
            let files = state.manifest.files();
            if files.len() < MERGE_WIDTH {
                return Ok(());
            }
            files[files.len() - MERGE_WIDTH..].to_vec()
        };

        // Merge unlocked. The inputs are immutable on-disk files; a racing
        // flush can only append newer tables, which the install re-check
        // catches. Unopenable inputs are treated as absent.
        let sources: Vec<SsTableReader> = inputs
            .iter()
            .filter_map(|name| SsTableReader::open(&self.dir.join(name)).ok())
            .collect();
        let merged: Vec<(Vec<u8>, Option<Vec<u8>>)> =
            MergeIterator::new(sources.iter().map(|t| t.records()).collect()).collect();

        // Allocate the output id under the lock, write it unlocked.
        let (out_name, out_path) = {
            let mut state = self.state.write();
            let id = state.next_sst_id;
            state.next_sst_id += 1;
            let name = sst_filename(id);
            let path = self.dir.join(&name);
            (name, path)
        };
        SsTableWriter::write_atomic(
            &out_path,
            merged.iter().map(|(k, v)| (k.as_slice(), v.as_deref())),
        )?;

        // Install under the storage lock.
        let mut state = self.state.write();

        let tail_matches = {
            let files = state.manifest.files();
            files.len() >= MERGE_WIDTH && files[files.len() - MERGE_WIDTH..] == inputs[..]
        };
        if !tail_matches {
            // A flush moved the tail mid-merge. Discard this attempt; the
            // orphan output was never named by the manifest.
            drop(state);
            let _ = fs::remove_file(&out_path);
            let _ = fs::remove_file(bloom_path(&out_path));
            warn!(file = %out_name, "manifest tail moved during merge; discarding attempt");
            self.request_if_deep();
            return Ok(());
        }

        let new_files = {
            let files = state.manifest.files();
            let mut v = files[..files.len() - MERGE_WIDTH].to_vec();
            v.push(out_name.clone());
            v
        };
        state.manifest.set_files(new_files);
        state.manifest.save()?;

        // The replacement manifest is durable; the inputs are now garbage.
        for name in &inputs {
            let path = self.dir.join(name);
            let _ = fs::remove_file(&path);
            let _ = fs::remove_file(bloom_path(&path));
        }

        // Reload the stack from the manifest, newest first.
        let mut tables = Vec::new();
        for name in state.manifest.files() {
            match SsTableReader::open(&self.dir.join(name)) {
                Ok(table) => tables.push(Arc::new(table)),
                Err(e) => warn!(file = %name, error = %e, "dropping sstable during stack reload"),
            }
        }
        tables.reverse();
        state.sstables = tables;

        info!(
            merged = inputs.len(),
            entries = merged.len(),
            output = %out_name,
            stack = state.sstables.len(),
            "compaction installed"
        );

        drop(state);
        self.request_if_deep();
        Ok(())
    }

    /// Re-enqueues a request when the stack is still at the trigger depth.
    fn request_if_deep(&self) {
        let deep = self.state.read().sstables.len() >= COMPACTION_TRIGGER;
        if deep {
            self.request_compaction();
        }
    }
}
