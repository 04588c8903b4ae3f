//! Utility functions for timestamps, string truncation, and file system
//! checks.

use chrono::Local;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Timestamp that names this run's output files, e.g. `20260807_1405`.
///
/// One stamp is taken at startup and reused for every source so a run's four
/// CSVs sort together and never clobber an earlier run's files.
pub fn run_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M").to_string()
}

/// Capture timestamp recorded in the `time_scraped` column of page-source
/// rows, e.g. `07-08-2026 14:05`.
pub fn scrape_stamp() -> String {
    Local::now().format("%d-%m-%Y %H:%M").to_string()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…(+{} bytes)", &s[..max], s.len() - max)
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable
/// (permission denied, read-only filesystem, etc.).
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
