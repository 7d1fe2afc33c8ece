//! Persistent Sinks

use crate::LogError;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Append-only storage for batches of log lines
pub trait PersistentSink {
    /// Append a block of text in one call
    fn append_batch(&mut self, block: &str) -> Result<(), LogError>;
}

/// Appends batches to a file, reopening it for every batch
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the next numbered log (`<n>.csv`, one past the highest) in `dir`
    pub fn create_next(dir: &Path) -> Result<Self, LogError> {
        fs::create_dir_all(dir)?;

        let mut highest = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(number) = log_number(&entry.file_name().to_string_lossy()) {
                highest = highest.max(number);
            }
        }

        let path = dir.join(format!("{}.csv", highest + 1));
        File::create(&path)?;
        info!("Creating new log: {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistentSink for FileSink {
    fn append_batch(&mut self, block: &str) -> Result<(), LogError> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(block.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Number of a `<digits>.csv` file name
fn log_number(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(".csv")?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
