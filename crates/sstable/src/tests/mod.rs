
use std::path::Path;

use crate::SsTableWriter;

type Entry = (Vec<u8>, Option<Vec<u8>>);

/// Writes a table from sorted (key, optional value) pairs.
pub fn write_table(path: &Path, entries: &[Entry]) {
    SsTableWriter::write_atomic(path, entries.iter().map(|(k, v)| (k.as_slice(), v.as_deref())))
        .unwrap();
}

/// `n` sorted live entries `keyNNNN -> valNNNN`.
pub fn sample_entries(n: usize) -> Vec<Entry> {
    (0..n)
        .map(|i| {
            (
                format!("key{:04}", i).into_bytes(),
                Some(format!("val{:04}", i).into_bytes()),
            )
        })
        .collect()
}
