//! Manifest: the authoritative list of live SSTable files.
//!
//! A plain text file, `manifest.txt`, one SSTable filename per line
//! (LF-terminated, no paths), ordered **oldest to newest**. The in-memory
//! SSTable stack is this list reversed.
//!
//! The manifest is never edited in place: every change writes
//! `manifest.txt.tmp`, flushes, fsyncs, and renames over the real name, so
//! a crash leaves either the old list or the new one. Readers ignore a
//! stray `.tmp`.
//!
//! Text was chosen over binary so an operator can inspect a data directory
//! with nothing but `cat`; the file is one short line per table.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Manifest filename inside the data directory.
pub const MANIFEST_FILENAME: &str = "manifest.txt";

const MANIFEST_TMP_FILENAME: &str = "manifest.txt.tmp";

/// In-memory copy of the manifest, oldest entry first.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    files: Vec<String>,
}

impl Manifest {
    /// Loads `data_dir/manifest.txt`, creating an empty manifest file when
    /// none exists; a freshly opened directory always carries one.
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(MANIFEST_FILENAME);

        if !path.exists() {
            let manifest = Self {
                path,
                files: Vec::new(),
            };
            manifest.save()?;
            return Ok(manifest);
        }

        let file = File::open(&path)
            .with_context(|| format!("failed to open manifest at {}", path.display()))?;
        let mut files = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.context("failed to read manifest line")?;
            if !line.is_empty() {
                files.push(line);
            }
        }

        Ok(Self { path, files })
    }

    /// Atomically persists the current list: tmp file, flush, fsync,
    /// rename.
    pub fn save(&self) -> Result<()> {
        let tmp = self.path.with_file_name(MANIFEST_TMP_FILENAME);
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)
                .with_context(|| format!("failed to create manifest tmp at {}", tmp.display()))?;
            for name in &self.files {
                writeln!(f, "{}", name)?;
            }
            f.flush()?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to install manifest at {}", self.path.display()))?;
        Ok(())
    }

    /// Entries oldest to newest.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Appends a newly flushed table (does **not** save).
    pub fn push(&mut self, filename: String) {
        self.files.push(filename);
    }

    /// Replaces the whole list (does **not** save). Used by compaction
    /// installs and open-time scrubbing.
    pub fn set_files(&mut self, files: Vec<String>) {
        self.files = files;
    }
}
