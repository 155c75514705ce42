//! Read path: `get()`.
//!
//! The memtable is probed under the shared lock and is authoritative when
//! it has any entry for the key, tombstones included. Otherwise the
//! stack snapshot (cloned `Arc`s) is probed newest to oldest **after** the
//! lock is released; the readers are internally immutable, so concurrent
//! flushes and compactions never disturb a scan in progress.

use sstable::Probe;

use crate::HeliosDb;

impl HeliosDb {
    /// Point lookup. Returns the newest live value, or `None` if the key
    /// was never written or its newest entry is a tombstone.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let tables = {
            let state = self.shared.state.read();
            if let Some(entry) = state.mem.entry(key) {
                return entry.clone();
            }
            state.sstables.clone()
        };

        // Newest to oldest; the first table with an entry decides.
        for table in &tables {
            match table.get(key) {
                Probe::Value(value) => return Some(value),
                Probe::Tombstone => return None,
                Probe::Missing => {}
            }
        }
        None
    }
}
