use anyhow::{Context, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::format::{bloom_path, tmp_path, Fnv32, SSTABLE_MAGIC, TOMBSTONE_VSIZE};

pub struct SsTableWriter;

impl SsTableWriter {
    /// Writes an SSTable at `final_path` from sorted entries.
    ///
    /// `entries` must be sorted by key ascending and contain each key at
    /// most once; `None` values are written as tombstones. The memtable and
    /// the merge iterator both satisfy this by construction.
    ///
    /// The write is atomic: records and footer are streamed to
    /// `<final_path>.tmp`, flushed and fsync'd, renamed into place, and the
    /// final name is fsync'd. The rename is the durability point for the
    /// table. Only then is the bloom sidecar built and installed (with the
    /// same tmp + rename dance); losing a sidecar loses nothing but a fast
    /// path.
    ///
    /// Any I/O error propagates to the caller; a failed write leaves at most
    /// a `*.tmp` file behind, which opens ignore and the engine deletes at
    /// startup.
    pub fn write_atomic<'a, I>(final_path: &Path, entries: I) -> Result<()>
    where
        I: ExactSizeIterator<Item = (&'a [u8], Option<&'a [u8]>)>,
    {
        let tmp = tmp_path(final_path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .with_context(|| format!("failed to create sstable tmp at {}", tmp.display()))?;
        let mut out = BufWriter::new(file);

        let mut chk = Fnv32::new();
        let mut filter = BloomFilter::sized_for(entries.len());

        for (key, value) in entries {
            let ksize = key.len() as u32;
            let vsize = value.map_or(TOMBSTONE_VSIZE, |v| v.len() as u32);

            out.write_u32::<LittleEndian>(ksize)?;
            out.write_u32::<LittleEndian>(vsize)?;
            out.write_all(key)?;

            chk.update(&ksize.to_le_bytes());
            chk.update(&vsize.to_le_bytes());
            chk.update(key);

            if let Some(v) = value {
                out.write_all(v)?;
                chk.update(v);
            }

            filter.add(key);
        }

        out.write_u64::<LittleEndian>(SSTABLE_MAGIC)?;
        out.write_u32::<LittleEndian>(chk.finish())?;
        out.flush()?;
        out.get_ref().sync_all()?;
        drop(out);

        fs::rename(&tmp, final_path)
            .with_context(|| format!("failed to install sstable at {}", final_path.display()))?;
        File::open(final_path)?.sync_all()?;

        filter.save(&bloom_path(final_path))?;

        Ok(())
    }
}
