use super::helpers::count_sst_files;
use crate::HeliosDb;
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn put_then_get() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    db.put(b"name".to_vec(), b"tejas".to_vec())?;
    assert_eq!(db.get(b"name"), Some(b"tejas".to_vec()));
    Ok(())
}

#[test]
fn overwrite_in_memtable() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    db.put(b"k".to_vec(), b"v1".to_vec())?;
    db.put(b"k".to_vec(), b"v2".to_vec())?;
    assert_eq!(db.get(b"k"), Some(b"v2".to_vec()));
    assert_eq!(db.memtable_entries(), 1);
    Ok(())
}

#[test]
fn del_then_get_is_none() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    db.put(b"k".to_vec(), b"v".to_vec())?;
    db.del(b"k".to_vec())?;
    assert_eq!(db.get(b"k"), None);
    Ok(())
}

#[test]
fn empty_key_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    assert!(db.put(Vec::new(), b"v".to_vec()).is_err());
    assert!(db.del(Vec::new()).is_err());
    Ok(())
}

#[test]
fn delete_of_absent_key_is_recorded() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    // The key exists nowhere, but older SSTables could hold it in general,
    // so the tombstone must be written unconditionally.
    db.del(b"ghost".to_vec())?;
    assert_eq!(db.memtable_entries(), 1);

    db.flush()?;
    assert_eq!(count_sst_files(dir.path()), 1);
    assert_eq!(db.get(b"ghost"), None);
    Ok(())
}

#[test]
fn flush_writes_sstable_and_resets_state() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    db.put(b"a".to_vec(), b"1".to_vec())?;
    db.put(b"b".to_vec(), b"2".to_vec())?;
    assert!(db.memtable_bytes() > 0);
    assert!(std::fs::metadata(dir.path().join("wal.log"))?.len() > 0);

    db.flush()?;

    assert_eq!(count_sst_files(dir.path()), 1);
    assert_eq!(db.memtable_entries(), 0);
    assert_eq!(db.memtable_bytes(), 0);
    assert_eq!(db.sstable_count(), 1);
    // WAL is truncated once the flush is durable.
    assert_eq!(std::fs::metadata(dir.path().join("wal.log"))?.len(), 0);

    // Data still readable from the SSTable.
    assert_eq!(db.get(b"a"), Some(b"1".to_vec()));
    assert_eq!(db.get(b"b"), Some(b"2".to_vec()));
    Ok(())
}

#[test]
fn flush_of_empty_memtable_is_noop() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    db.flush()?;
    db.flush()?;
    assert_eq!(count_sst_files(dir.path()), 0);
    assert_eq!(db.sstable_count(), 0);
    Ok(())
}

#[test]
fn sst_filenames_are_monotonic() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    for i in 0..3 {
        db.put(format!("k{}", i).into_bytes(), b"v".to_vec())?;
        db.flush()?;
    }

    let mut names: Vec<String> = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".dat"))
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["sst_000001.dat", "sst_000002.dat", "sst_000003.dat"]
    );
    Ok(())
}

#[test]
fn memtable_threshold_triggers_automatic_flush() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    // Two ~600 KiB values; the second crosses the 1 MiB threshold and
    // flushes synchronously inside put().
    let big = vec![b'x'; 600 * 1024];
    db.put(b"k1".to_vec(), big.clone())?;
    assert_eq!(db.sstable_count(), 0);

    db.put(b"k2".to_vec(), big)?;
    assert_eq!(db.sstable_count(), 1);
    assert_eq!(db.memtable_bytes(), 0);

    assert!(db.get(b"k1").is_some());
    assert!(db.get(b"k2").is_some());
    Ok(())
}

#[test]
fn concurrent_readers_and_writer() -> Result<()> {
    let dir = tempdir()?;
    let db = HeliosDb::open(dir.path())?;

    std::thread::scope(|s| {
        let writer = s.spawn(|| {
            for i in 0..500u64 {
                db.put(format!("k{:04}", i).into_bytes(), b"v".to_vec())
                    .unwrap();
                if i % 100 == 99 {
                    db.flush().unwrap();
                }
            }
        });

        let reader = s.spawn(|| {
            // Reads race the writer; whatever is visible must be the
            // written value, never garbage.
            for _ in 0..1000 {
                for i in (0..500u64).step_by(97) {
                    if let Some(v) = db.get(format!("k{:04}", i).as_bytes()) {
                        assert_eq!(v, b"v");
                    }
                }
            }
        });

        writer.join().unwrap();
        reader.join().unwrap();
    });

    for i in 0..500u64 {
        assert_eq!(db.get(format!("k{:04}", i).as_bytes()), Some(b"v".to_vec()));
    }
    Ok(())
}
