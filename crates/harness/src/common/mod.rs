//! Common types shared by every harness component.
//!
//! This module provides the building blocks the pipelines are written against:
//! 1. **Address Types:** A strong guest-address type with the emulator's hex encoding.
//! 2. **Error Handling:** The setup/layout/manifest error taxonomy and per-case dispatch failures.

/// Guest address type and its textual encodings.
pub mod addr;

/// Error types and dispatch failure records.
pub mod error;

pub use addr::GuestAddr;
pub use error::{DispatchFailure, HarnessError, LayoutError, Result};
