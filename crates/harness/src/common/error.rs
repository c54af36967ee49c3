//! Harness error taxonomy.
//!
//! This module defines how failures travel through the pipelines. It provides:
//! 1. **Fatal Errors:** `HarnessError`, raised for setup, manifest, layout and oracle failures.
//! 2. **Layout Errors:** `LayoutError`, the address-transform failures that abort image assembly.
//! 3. **Dispatch Failures:** `DispatchFailure`, recorded on a single case's outcome and never raised.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the harness.
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Failures that stop a pipeline before or during its run.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A required external directory, environment variable or tool is missing.
    #[error("setup error: {0}")]
    Setup(String),

    /// The manifest file does not exist.
    #[error("manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    /// The manifest exists but is malformed.
    #[error("failed to parse manifest {}: {message}", path.display())]
    ManifestParse {
        /// Manifest that failed to parse.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// An address recipe could not be applied.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// The device-tree generator failed.
    #[error("device tree generation failed: {0}")]
    DeviceTree(String),

    /// A directory was expected to hold a complete image set but does not.
    #[error("incomplete image set in {}", .0.display())]
    IncompleteImageSet(PathBuf),

    /// The trace oracle could not be started.
    #[error("failed to run trace verifier {}: {source}", path.display())]
    Verifier {
        /// Oracle executable path.
        path: PathBuf,
        /// Spawn error.
        #[source]
        source: io::Error,
    },

    /// Filesystem failure on a specific path.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being read, written or removed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl HarnessError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures applying an address layout recipe.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// `pad_to` does not lie above the image origin.
    #[error("invalid layout for {}: pad-to {pad_to:#x} is not above origin {origin:#x}", source_path.display())]
    InvalidLayout {
        /// Source executable.
        source_path: PathBuf,
        /// Effective image origin after VMA adjustment.
        origin: u64,
        /// Requested end address.
        pad_to: u64,
    },

    /// The source executable does not exist.
    #[error("source executable not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// The source is not a readable ELF file.
    #[error("failed to parse ELF {}: {message}", path.display())]
    ElfParse {
        /// Source executable.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// A section filter names a section the executable does not contain, or
    /// keeps only a section that has no loadable bytes.
    #[error("loadable section '{section}' not found in {}", path.display())]
    SectionNotFound {
        /// Source executable.
        path: PathBuf,
        /// Requested section name.
        section: String,
    },

    /// The `[origin, pad_to)` window cannot be held in memory.
    #[error("image for {} is too large: {len:#x} bytes", source_path.display())]
    ImageTooLarge {
        /// Source executable.
        source_path: PathBuf,
        /// Requested image length.
        len: u64,
    },
}

/// Why a single emulator run did not complete cleanly.
///
/// Recorded on the run's outcome; siblings in the same batch are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchFailure {
    /// The emulator exited with a non-zero code.
    #[error("emulator exited with code {0}")]
    NonZeroExit(i32),

    /// The emulator was terminated by a signal and reported no exit code.
    #[error("emulator terminated without an exit code")]
    Terminated,

    /// The emulator process could not be started.
    #[error("failed to spawn emulator: {0}")]
    Spawn(String),

    /// The wall-clock guard expired and the process was killed.
    #[error("emulator exceeded wall-clock limit of {0} ms")]
    TimedOut(u128),

    /// The batch was cancelled before or while this case ran.
    #[error("run cancelled")]
    Cancelled,
}
