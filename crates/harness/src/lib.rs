//! Conformance harness for the rafi RISC-V emulator.
//!
//! This crate prepares boot images and drives verified emulator runs. It provides:
//! 1. **Images:** ELF-to-flat-binary address transforms and per-target boot image assembly.
//! 2. **Manifests:** JSON test lists with glob filtering and skip markers.
//! 3. **Dispatch:** Parallel, fail-soft emulator invocations in a bounded worker pool.
//! 4. **Verification:** A single oracle invocation over all produced trace indices.
//! 5. **Sessions:** The reset/dispatch/verify state machine tying the above together.
//!
//! The emulator, the trace oracle and the device-tree generator are external
//! executables; this crate only builds their command lines and interprets exit codes.

/// Common types (guest addresses, error taxonomy).
pub mod common;
/// Platform configuration (tool paths, directories, build variants).
pub mod config;
/// Parallel emulator dispatch (invocation contract, process runner, worker pool).
pub mod dispatch;
/// Flat image generation and boot image assembly.
pub mod image;
/// Test manifest loading and filtering.
pub mod manifest;
/// Run sessions and aggregated results.
pub mod session;
/// Trace directory layout and per-case artifact paths.
pub mod trace;
/// Trace verification through the external oracle.
pub mod verify;

/// Immutable platform configuration; construct with `PlatformConfig::default()` or load from JSON.
pub use crate::config::PlatformConfig;
/// Crate-wide error and result types.
pub use crate::common::error::{HarnessError, Result};
/// Parallel emulator dispatcher.
pub use crate::dispatch::EmulationDispatcher;
/// Test manifest and its records.
pub use crate::manifest::{TestCase, TestManifest};
/// Session driver and its aggregated result.
pub use crate::session::{Session, SessionResult};
