//! Per-session trace directory layout.
//!
//! Every case writes its trace under one directory, at a path derived only
//! from the case name:
//!
//! * dump path base: `<dir>/<name>` (passed to the emulator as `--dump-path`)
//! * trace index: `<dir>/<name>.tidx` (written by the emulator, read by the oracle)
//!
//! The directory is reset once per session, before any emulator starts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::common::error::{HarnessError, Result};

/// Extension the emulator appends to the dump path for the trace index.
pub const TRACE_INDEX_EXTENSION: &str = "tidx";

/// Name-derived trace paths under one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLayout {
    dir: PathBuf,
}

impl TraceLayout {
    /// Uses `dir` as the session trace directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Trace directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Dump path base for the case `name`.
    pub fn dump_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Trace index file for the case `name`.
    pub fn index_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{TRACE_INDEX_EXTENSION}"))
    }

    /// Creates the directory if needed and removes everything inside it.
    ///
    /// Stale traces from an earlier session must never be mistaken for
    /// current results, so any failure here is fatal to the session.
    pub fn reset(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| HarnessError::io(&self.dir, e))?;
        let entries = fs::read_dir(&self.dir).map_err(|e| HarnessError::io(&self.dir, e))?;
        let mut removed = 0usize;
        for entry in entries {
            let entry = entry.map_err(|e| HarnessError::io(&self.dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| HarnessError::io(&path, e))?;
            let outcome = if file_type.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match outcome {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(HarnessError::io(&path, e)),
            }
        }
        debug!(dir = %self.dir.display(), removed, "trace directory reset");
        Ok(())
    }
}
