use std::path::{Path, PathBuf};

/// Footer magic, ASCII "HELIOSST".
pub const SSTABLE_MAGIC: u64 = 0x4845_4C49_4F53_5354;

/// Footer size: u64 magic + u32 checksum.
pub const FOOTER_BYTES: u64 = 12;

/// `vsize` sentinel marking a tombstone record.
pub const TOMBSTONE_VSIZE: u32 = u32::MAX;

/// Every 16th record gets a sparse-index entry.
pub const INDEX_STRIDE: u64 = 16;

/// Streaming FNV-1a/32, used for the footer checksum over the records
/// region.
pub struct Fnv32(u32);

impl Fnv32 {
    pub fn new() -> Self {
        Fnv32(2_166_136_261)
    }

    pub fn update(&mut self, data: &[u8]) {
        for &b in data {
            self.0 ^= b as u32;
            self.0 = self.0.wrapping_mul(16_777_619);
        }
    }

    pub fn finish(&self) -> u32 {
        self.0
    }
}

impl Default for Fnv32 {
    fn default() -> Self {
        Self::new()
    }
}

/// `<path>.tmp`, the staging name for atomic writes.
pub fn tmp_path(path: &Path) -> PathBuf {
    append_extension(path, ".tmp")
}

/// `<path>.bloom`, the bloom sidecar next to an SSTable.
pub fn bloom_path(path: &Path) -> PathBuf {
    append_extension(path, ".bloom")
}

// Path::with_extension would replace ".dat"; the on-disk names stack
// suffixes instead (sst_000001.dat.bloom).
fn append_extension(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
