use std::path::Path;
use std::time::{Duration, Instant};

/// Number of `sst_*.dat` files in a data directory.
pub fn count_sst_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "dat")
                .unwrap_or(false)
        })
        .count()
}

/// Manifest lines, oldest first.
pub fn manifest_lines(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("manifest.txt"))
        .unwrap()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

/// Polls `cond` until it holds or five seconds pass. Background compaction
/// is asynchronous, so tests observe it by waiting on file or stack counts.
pub fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}
