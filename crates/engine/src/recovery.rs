//! Cold-start recovery: tmp cleanup, manifest scrubbing, WAL replay.

use anyhow::Result;
use memtable::Memtable;
use sstable::SsTableReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use wal::{WalReader, WalRecord};

use crate::manifest::Manifest;

/// Deletes leftover `*.tmp` files (interrupted SSTable, sidecar, or
/// manifest writes). Best-effort; nothing durable ever lives in a tmp name.
pub(crate) fn remove_tmp_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let p = entry.path();
        if p.extension().map(|e| e == "tmp").unwrap_or(false) {
            debug!(path = %p.display(), "removing stale tmp file");
            let _ = std::fs::remove_file(&p);
        }
    }
}

/// Loads the manifest and opens its tables.
///
/// Entries whose file is missing or fails validation are dropped; if any
/// were dropped the cleaned manifest is rewritten atomically, so the
/// invariant "every listed file exists and is valid" holds from here on.
///
/// Returns the manifest, the stack (newest first), and the next SSTable id
/// (max id named by the manifest, plus one).
pub(crate) fn load_manifest_and_tables(
    dir: &Path,
) -> Result<(Manifest, Vec<Arc<SsTableReader>>, u64)> {
    let mut manifest = Manifest::load_or_create(dir)?;

    let mut next_sst_id = 1u64;
    for name in manifest.files() {
        if let Some(id) = parse_sst_id(name) {
            next_sst_id = next_sst_id.max(id + 1);
        }
    }

    let mut kept = Vec::new();
    let mut tables = Vec::new();
    for name in manifest.files() {
        let path = dir.join(name);
        if !path.exists() || !SsTableReader::is_valid(&path) {
            warn!(file = %name, "dropping missing or corrupt sstable from manifest");
            continue;
        }
        match SsTableReader::open(&path) {
            Ok(table) => {
                kept.push(name.clone());
                tables.push(Arc::new(table));
            }
            Err(e) => {
                warn!(file = %name, error = %e, "dropping unreadable sstable from manifest");
            }
        }
    }

    if kept.len() != manifest.files().len() {
        manifest.set_files(kept);
        manifest.save()?;
    }

    // Manifest order is oldest→newest; the stack is probed newest→oldest.
    tables.reverse();

    Ok((manifest, tables, next_sst_id))
}

/// `sst_000123.dat` → `Some(123)`.
pub(crate) fn parse_sst_id(name: &str) -> Option<u64> {
    name.strip_prefix("sst_")?
        .strip_suffix(".dat")?
        .parse()
        .ok()
}

/// Replays the WAL into `mem`. A missing file is a fresh start; a torn or
/// corrupt tail ends the replay silently with everything before it applied.
pub(crate) fn replay_wal(path: &Path, mem: &mut Memtable) -> Result<()> {
    let mut reader = match WalReader::open(path) {
        Ok(r) => r,
        Err(wal::WalError::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(());
        }
        Err(e) => return Err(anyhow::anyhow!(e).context("failed to open WAL for replay")),
    };

    reader.replay(|record| match record {
        WalRecord::Put { key, value } => mem.put(key, value),
        WalRecord::Del { key } => mem.delete(key),
    })?;

    Ok(())
}
