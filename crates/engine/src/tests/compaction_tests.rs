use super::helpers::{count_sst_files, manifest_lines, wait_until};
use crate::{HeliosDb, COMPACTION_TRIGGER, MERGE_WIDTH};
use anyhow::Result;
use sstable::SsTableReader;
use tempfile::tempdir;

/// One flushed SSTable per call, holding a single distinct key.
fn flush_one(db: &HeliosDb, key: &str, value: &str) -> Result<()> {
    db.put(key.as_bytes().to_vec(), value.as_bytes().to_vec())?;
    db.flush()?;
    Ok(())
}

#[test]
fn compact_below_merge_width_is_a_noop() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    for i in 0..MERGE_WIDTH - 1 {
        flush_one(&db, &format!("k{}", i), "v")?;
    }

    db.compact();
    // Give the worker a moment; nothing should change.
    std::thread::sleep(std::time::Duration::from_millis(200));
    assert_eq!(db.sstable_count(), MERGE_WIDTH - 1);
    assert_eq!(count_sst_files(dir.path()), MERGE_WIDTH - 1);
    Ok(())
}

#[test]
fn explicit_compact_merges_newest_four() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    for i in 0..5 {
        flush_one(&db, &format!("k{}", i), &format!("v{}", i))?;
    }
    assert_eq!(db.sstable_count(), 5);

    db.compact();
    assert!(wait_until(|| db.sstable_count() == 2));

    // Oldest table survives untouched; the merged table replaces the tail.
    let names = manifest_lines(dir.path());
    assert_eq!(names, vec!["sst_000001.dat", "sst_000006.dat"]);
    assert_eq!(count_sst_files(dir.path()), 2);

    for i in 0..5 {
        assert_eq!(
            db.get(format!("k{}", i).as_bytes()),
            Some(format!("v{}", i).into_bytes())
        );
    }
    Ok(())
}

#[test]
fn deep_stack_triggers_compaction_automatically() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    for i in 0..COMPACTION_TRIGGER {
        flush_one(&db, &format!("k{}", i), "v")?;
    }

    // 8 tables trip the trigger; the worker merges the newest 4 into one.
    assert!(wait_until(|| db.sstable_count()
        == COMPACTION_TRIGGER - MERGE_WIDTH + 1));

    for i in 0..COMPACTION_TRIGGER {
        assert_eq!(db.get(format!("k{}", i).as_bytes()), Some(b"v".to_vec()));
    }
    Ok(())
}

#[test]
fn compaction_keeps_newest_value_for_duplicates() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    for i in 0..4 {
        flush_one(&db, "k", &format!("v{}", i))?;
    }

    db.compact();
    assert!(wait_until(|| db.sstable_count() == 1));
    assert_eq!(db.get(b"k"), Some(b"v3".to_vec()));
    Ok(())
}

#[test]
fn compaction_preserves_tombstones_that_shadow_older_tables() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    // Oldest table (outside the merge set) holds the key.
    flush_one(&db, "k", "old")?;

    // Four newer tables; one carries the tombstone.
    db.del(b"k".to_vec())?;
    db.flush()?;
    for i in 0..3 {
        flush_one(&db, &format!("other{}", i), "x")?;
    }
    assert_eq!(db.sstable_count(), 5);

    db.compact();
    assert!(wait_until(|| db.sstable_count() == 2));

    // If the merge had dropped the tombstone, the old value would
    // resurrect here.
    assert_eq!(db.get(b"k"), None);

    // The merged table really does carry the marker.
    let merged_name = manifest_lines(dir.path()).pop().unwrap();
    let merged = SsTableReader::open(&dir.path().join(merged_name))?;
    assert_eq!(merged.get(b"k"), sstable::Probe::Tombstone);
    Ok(())
}

#[test]
fn compaction_unlinks_inputs_and_sidecars() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    for i in 0..4 {
        flush_one(&db, &format!("k{}", i), "v")?;
    }
    db.compact();
    assert!(wait_until(|| db.sstable_count() == 1));

    assert_eq!(count_sst_files(dir.path()), 1);
    for i in 1..=4 {
        let name = format!("sst_{:06}.dat", i);
        assert!(!dir.path().join(&name).exists(), "{} should be gone", name);
        assert!(!dir.path().join(format!("{}.bloom", name)).exists());
    }
    assert!(dir.path().join("sst_000005.dat").exists());
    assert!(dir.path().join("sst_000005.dat.bloom").exists());
    Ok(())
}

#[test]
fn writes_during_compaction_are_preserved() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    for i in 0..4 {
        flush_one(&db, &format!("k{}", i), "v")?;
    }
    db.compact();

    // Race some writes against the merge; whichever way the install
    // re-check goes, nothing may be lost.
    for i in 0..50 {
        db.put(format!("w{:02}", i).into_bytes(), b"live".to_vec())?;
    }
    db.flush()?;

    // A second request covers the case where the racing flush made the
    // first attempt discard itself.
    db.compact();
    assert!(wait_until(|| db.sstable_count() <= 2));
    for i in 0..4 {
        assert_eq!(db.get(format!("k{}", i).as_bytes()), Some(b"v".to_vec()));
    }
    for i in 0..50 {
        assert_eq!(db.get(format!("w{:02}", i).as_bytes()), Some(b"live".to_vec()));
    }
    Ok(())
}

#[test]
fn compacted_state_survives_reopen() -> Result<()> {
    let dir = tempdir()?;

    {
        let db = HeliosDb::open(dir.path())?;
        for i in 0..5000u32 {
            db.put(format!("k{}", i).into_bytes(), format!("v{}", i).into_bytes())?;
        }
        db.flush()?;

        for i in (0..5000u32).step_by(2) {
            db.del(format!("k{}", i).into_bytes())?;
        }
        db.flush()?;

        for i in 0..5000u32 {
            db.put(format!("k{}", i).into_bytes(), format!("v2{}", i).into_bytes())?;
        }
        db.flush()?;

        db.compact();
        // Three tables only: the merge attempt aborts below MERGE_WIDTH,
        // which is itself part of the contract being exercised.
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    let db = HeliosDb::open(dir.path())?;
    for i in 0..5000u32 {
        assert_eq!(
            db.get(format!("k{}", i).as_bytes()),
            Some(format!("v2{}", i).into_bytes()),
            "k{}",
            i
        );
    }
    Ok(())
}

#[test]
fn repeated_fill_and_compact_converges() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    // Two rounds of trigger-depth fills; re-enqueueing keeps draining the
    // stack below the trigger.
    for round in 0..2 {
        for i in 0..COMPACTION_TRIGGER {
            flush_one(&db, &format!("r{}k{}", round, i), "v")?;
        }
        assert!(wait_until(|| db.sstable_count() < COMPACTION_TRIGGER));
    }

    for round in 0..2 {
        for i in 0..COMPACTION_TRIGGER {
            assert_eq!(
                db.get(format!("r{}k{}", round, i).as_bytes()),
                Some(b"v".to_vec())
            );
        }
    }
    Ok(())
}
