//! Test manifests.
//!
//! A manifest is a JSON array of test records:
//!
//! ```json
//! [
//!   { "name": "rv64ui-p-add", "cycle": 5000, "host-io-addr": "0x80001000", "xlen": 64 },
//!   { "name": "rv64ui-p-fence_i", "cycle": 5000, "host-io-addr": "0x80001000", "xlen": 64, "skip": true }
//! ]
//! ```
//!
//! Loading is all-or-nothing: a missing file, a malformed record or a duplicate
//! name rejects the whole manifest.

/// Shell-style name patterns.
pub mod glob;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::common::addr::GuestAddr;
use crate::common::error::{HarnessError, Result};
use crate::config::BuildVariant;

pub use glob::GlobPattern;

/// Register width of the emulated hart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "u32")]
pub enum Xlen {
    /// RV32.
    Rv32,
    /// RV64.
    Rv64,
}

impl Xlen {
    /// Width in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Rv32 => 32,
            Self::Rv64 => 64,
        }
    }
}

impl TryFrom<u32> for Xlen {
    type Error = String;

    fn try_from(bits: u32) -> std::result::Result<Self, Self::Error> {
        match bits {
            32 => Ok(Self::Rv32),
            64 => Ok(Self::Rv64),
            other => Err(format!("xlen must be 32 or 64, got {other}")),
        }
    }
}

impl fmt::Display for Xlen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// One test program and its run parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestCase {
    /// Unique name; also names the image and trace files.
    pub name: String,
    /// Maximum emulated cycles before the emulator stops.
    pub cycle: u64,
    /// Register width.
    pub xlen: Xlen,
    /// Address polled for the test's pass/fail write; `None` disables host I/O.
    #[serde(rename = "host-io-addr", default)]
    pub host_io_addr: Option<GuestAddr>,
    /// Excluded from runs but reported by name.
    #[serde(default)]
    pub skip: bool,
    /// Emulator build the case was dispatched to; stamped at dispatch time.
    #[serde(skip)]
    pub build_variant: Option<BuildVariant>,
}

impl TestCase {
    /// Creates a runnable case without a host I/O address.
    pub fn new(name: impl Into<String>, cycle: u64, xlen: Xlen) -> Self {
        Self {
            name: name.into(),
            cycle,
            xlen,
            host_io_addr: None,
            skip: false,
            build_variant: None,
        }
    }

    /// Sets the host I/O polling address.
    #[must_use]
    pub const fn with_host_io_addr(mut self, addr: GuestAddr) -> Self {
        self.host_io_addr = Some(addr);
        self
    }

    /// Marks the case as skipped.
    #[must_use]
    pub const fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }
}

/// Result of filtering a manifest: every case lands in exactly one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Matching cases to run.
    pub runnable: Vec<TestCase>,
    /// Matching cases marked `skip`.
    pub skipped: Vec<TestCase>,
    /// Cases the pattern did not select.
    pub unmatched: Vec<TestCase>,
}

impl Partition {
    /// Names of the skipped cases, in manifest order.
    pub fn skipped_names(&self) -> Vec<String> {
        self.skipped.iter().map(|c| c.name.clone()).collect()
    }

    /// Total number of cases across all groups.
    pub fn len(&self) -> usize {
        self.runnable.len() + self.skipped.len() + self.unmatched.len()
    }

    /// Returns `true` if the source manifest was empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An ordered, validated list of test cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestManifest {
    path: Option<PathBuf>,
    cases: Vec<TestCase>,
}

/// Case names become image and trace file names, so they must stay inside
/// their directory on every host.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
        && !name.contains(['/', '\\', '\0'])
}

impl TestManifest {
    /// Loads a manifest file.
    ///
    /// # Errors
    ///
    /// * `ManifestNotFound` if `path` does not exist.
    /// * `ManifestParse` if the JSON is malformed, a record is invalid, or a name repeats.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(HarnessError::ManifestNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(HarnessError::io(path, e)),
        };
        Self::parse(&text, Some(path))
    }

    /// Parses manifest JSON; `origin` is only used in error messages.
    pub fn parse(text: &str, origin: Option<&Path>) -> Result<Self> {
        let parse_error = |message: String| HarnessError::ManifestParse {
            path: origin.map_or_else(|| PathBuf::from("<inline>"), Path::to_path_buf),
            message,
        };
        let cases: Vec<TestCase> =
            serde_json::from_str(text).map_err(|e| parse_error(e.to_string()))?;
        Self::from_cases(cases)
            .map(|manifest| Self {
                path: origin.map(Path::to_path_buf),
                ..manifest
            })
            .map_err(|e| match e {
                HarnessError::ManifestParse { message, .. } => parse_error(message),
                other => other,
            })
    }

    /// Builds a manifest from in-memory cases, rejecting duplicate names and
    /// names that are not a single plain file name.
    pub fn from_cases(cases: Vec<TestCase>) -> Result<Self> {
        let mut seen = std::collections::HashSet::with_capacity(cases.len());
        for case in &cases {
            if !is_plain_file_name(&case.name) {
                return Err(HarnessError::ManifestParse {
                    path: PathBuf::from("<inline>"),
                    message: format!("test name '{}' is not a plain file name", case.name),
                });
            }
            if !seen.insert(case.name.as_str()) {
                return Err(HarnessError::ManifestParse {
                    path: PathBuf::from("<inline>"),
                    message: format!("duplicate test name '{}'", case.name),
                });
            }
        }
        Ok(Self { path: None, cases })
    }

    /// File the manifest was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cases in manifest order.
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Number of cases.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns `true` for an empty manifest.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Names of the cases matching `pattern`, skipped ones included.
    pub fn matching_names(&self, pattern: &GlobPattern) -> Vec<&str> {
        self.cases
            .iter()
            .filter(|c| pattern.matches(&c.name))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Splits the manifest into runnable, skipped and unmatched cases.
    pub fn filter(&self, pattern: &GlobPattern) -> Partition {
        let mut partition = Partition::default();
        for case in &self.cases {
            let group = if !pattern.matches(&case.name) {
                &mut partition.unmatched
            } else if case.skip {
                &mut partition.skipped
            } else {
                &mut partition.runnable
            };
            group.push(case.clone());
        }
        partition
    }
}
