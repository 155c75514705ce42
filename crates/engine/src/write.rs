//! Write path: `put()`, `del()`, `flush()`, and the locked flush routine.
//!
//! Every mutation appends to the WAL first, then updates the memtable,
//! always under the exclusive storage lock, so mutations are totally
//! ordered and a WAL failure surfaces before any in-memory state moves.

use anyhow::{ensure, Result};
use sstable::{SsTableReader, SsTableWriter};
use std::sync::Arc;
use tracing::debug;

use crate::{sst_filename, HeliosDb, Shared, State};
use crate::{COMPACTION_TRIGGER, MAX_KEY_SIZE, MAX_VALUE_SIZE, MEMTABLE_MAX_BYTES};

impl HeliosDb {
    /// Inserts or overwrites a key.
    ///
    /// On success the record has been handed to the OS via the WAL. May
    /// flush synchronously when the memtable crosses its size threshold.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        );
        ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );

        let mut state = self.shared.state.write();

        // WAL first; an append failure must leave the memtable untouched.
        state.wal.append_put(&key, &value)?;
        state.mem.put(key, value);

        if state.mem.bytes() >= MEMTABLE_MAX_BYTES {
            self.shared.flush_locked(&mut state)?;
        }
        Ok(())
    }

    /// Deletes a key by recording a tombstone.
    ///
    /// Recorded even when the key is absent from the memtable: an older
    /// SSTable may still hold it, and the tombstone must shadow that copy.
    pub fn del(&self, key: Vec<u8>) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        );

        let mut state = self.shared.state.write();

        state.wal.append_delete(&key)?;
        state.mem.delete(key);

        if state.mem.bytes() >= MEMTABLE_MAX_BYTES {
            self.shared.flush_locked(&mut state)?;
        }
        Ok(())
    }

    /// Promotes the memtable into a new SSTable now. No-op when the
    /// memtable is empty.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.shared.state.write();
        self.shared.flush_locked(&mut state)
    }
}

impl Shared {
    /// The flush routine. Caller holds the storage lock exclusively.
    ///
    /// Steps, in durability order:
    ///
    /// 1. allocate the next SSTable id;
    /// 2. `write_atomic` the memtable (already key-sorted); the rename
    ///    inside is the durability point for the table;
    /// 3. append the filename to the manifest and atomically rewrite it;
    /// 4. push the opened reader onto the front of the stack;
    /// 5. clear the memtable and reset the WAL;
    /// 6. request compaction if the stack is deep enough.
    pub(crate) fn flush_locked(&self, state: &mut State) -> Result<()> {
        if state.mem.is_empty() {
            return Ok(());
        }

        let id = state.next_sst_id;
        state.next_sst_id += 1;
        let filename = sst_filename(id);
        let path = self.dir.join(&filename);

        let entries = state.mem.len();
        SsTableWriter::write_atomic(
            &path,
            state.mem.iter().map(|(k, v)| (k.as_slice(), v.as_deref())),
        )?;

        state.manifest.push(filename.clone());
        state.manifest.save()?;

        let reader = Arc::new(SsTableReader::open(&path)?);
        state.sstables.insert(0, reader);

        debug!(
            file = %filename,
            entries,
            bytes = state.mem.bytes(),
            stack = state.sstables.len(),
            "flushed memtable"
        );

        state.mem.clear();
        state.wal.reset()?;

        if state.sstables.len() >= COMPACTION_TRIGGER {
            self.request_compaction();
        }
        Ok(())
    }
}
