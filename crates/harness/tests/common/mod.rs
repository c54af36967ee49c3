//! Shared helpers for harness tests.

/// Minimal ELF64 writer.
pub mod elf;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Routes `tracing` output through the test harness writer once per binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
