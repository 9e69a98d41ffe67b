//! Single-writer append-only log abstraction.
//!
//! The event ledger, receipt files, and the run-lifecycle log all share this
//! interface so the storage backend can be swapped without touching
//! orchestration logic. The design assumes one concurrent writer per
//! repository; there is no locking.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Durable, sequential, append-only line log.
pub trait AppendLog {
    /// Append one line (without trailing newline), creating the backing
    /// storage as needed. Existing entries are never rewritten.
    fn append(&self, line: &str) -> Result<()>;

    /// Read every line in append order. Missing backing storage reads as
    /// empty.
    fn read_all(&self) -> Result<Vec<String>>;
}

/// Flat-file JSONL-style implementation of [`AppendLog`].
#[derive(Debug, Clone)]
pub struct JsonlLog {
    path: PathBuf,
}

impl JsonlLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl AppendLog for JsonlLog {
    fn append(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        writeln!(file, "{line}").with_context(|| format!("append {}", self.path.display()))?;
        debug!(path = %self.path.display(), "appended log line");
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }
}
