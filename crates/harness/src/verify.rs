//! Trace verification through the external oracle.
//!
//! The oracle (`rafi-check-io`) takes every trace index of a session as a
//! positional argument and reports acceptance through its exit status. It is
//! invoked exactly once per session; this module never reads the traces.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{info, warn};

use crate::common::error::{HarnessError, Result};
use crate::config::{BuildVariant, PlatformConfig};

/// Exit code reported when the oracle was killed by a signal.
pub const VERIFIER_SIGNAL_EXIT_CODE: i32 = 128;

/// Invokes the trace oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceVerifier {
    oracle: PathBuf,
}

impl TraceVerifier {
    /// Verifier running the oracle at `oracle`.
    pub fn new(oracle: impl Into<PathBuf>) -> Self {
        Self {
            oracle: oracle.into(),
        }
    }

    /// Verifier running the configured oracle build for `variant`.
    pub fn from_config(config: &PlatformConfig, variant: BuildVariant) -> Self {
        Self::new(config.oracle_path(variant))
    }

    /// Oracle executable.
    pub fn oracle(&self) -> &Path {
        &self.oracle
    }

    /// Builds the oracle command line over `index_paths`, sorted.
    pub fn command<P: AsRef<Path>>(&self, index_paths: &[P]) -> Command {
        let mut paths: Vec<&Path> = index_paths.iter().map(AsRef::as_ref).collect();
        paths.sort_unstable();
        let mut cmd = Command::new(&self.oracle);
        let _ = cmd.args(paths).stdin(Stdio::null());
        cmd
    }

    /// Runs the oracle once over every trace index.
    ///
    /// # Arguments
    ///
    /// * `index_paths` - Trace index files, in any order. Missing files are
    ///   passed through; rejecting them is the oracle's job.
    ///
    /// # Returns
    ///
    /// The oracle's exit code, unchanged. A signal-terminated oracle yields
    /// [`VERIFIER_SIGNAL_EXIT_CODE`].
    ///
    /// # Errors
    ///
    /// `Verifier` if the oracle could not be started.
    pub fn verify<P: AsRef<Path>>(&self, index_paths: &[P]) -> Result<i32> {
        let mut cmd = self.command(index_paths);
        info!(oracle = %self.oracle.display(), traces = index_paths.len(), "verifying traces");
        let status = cmd.status().map_err(|source| HarnessError::Verifier {
            path: self.oracle.clone(),
            source,
        })?;
        let code = status.code().unwrap_or_else(|| {
            warn!(oracle = %self.oracle.display(), "oracle terminated by signal");
            VERIFIER_SIGNAL_EXIT_CODE
        });
        if code == 0 {
            info!("all traces accepted");
        } else {
            warn!(code, "trace verification failed");
        }
        Ok(code)
    }
}
