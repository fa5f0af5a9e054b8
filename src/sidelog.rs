//! Append-only side logs: every scanned payload and every unclassified error.
//! Best effort: a failed append is reported through tracing and otherwise ignored.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Clone, Debug)]
pub struct SideLog {
    scan_path: PathBuf,
    error_path: PathBuf,
}

impl SideLog {
    pub fn new(scan_path: impl Into<PathBuf>, error_path: impl Into<PathBuf>) -> Self {
        Self {
            scan_path: scan_path.into(),
            error_path: error_path.into(),
        }
    }

    pub fn record_scan(&self, entry: &str) {
        append(&self.scan_path, entry);
    }

    pub fn record_error(&self, entry: &str) {
        append(&self.error_path, entry);
    }
}

fn append(path: &Path, entry: &str) {
    if let Err(e) = try_append(path, entry) {
        warn!(path = %path.display(), error = %e, "failed to append to side log");
    }
}

fn try_append(path: &Path, entry: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{entry}")
}
