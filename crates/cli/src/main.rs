//! rafi emulator conformance CLI.
//!
//! This binary is the single entry point for image preparation and verified runs. It performs:
//! 1. **Prepare:** Build flat images for riscv-tests, a Linux boot, or Zephyr samples.
//! 2. **Run:** Dispatch test programs on the emulator in parallel and verify their traces.
//!
//! Exit status is the oracle's exit code for verified runs, the emulator's for
//! single-run targets, and 2 for setup failures.

mod prepare;
mod run;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rvconform_core::config::PlatformConfig;
use rvconform_core::session::SETUP_FAILURE_EXIT_CODE;

#[derive(Parser, Debug)]
#[command(
    name = "rvconform",
    author,
    version,
    about = "Boot image preparation and trace-verified conformance runs for rafi-emu",
    long_about = "Prepare flat memory images from ELF executables and run them on rafi-emu, verifying traces with rafi-check-io.\n\nExamples:\n  rvconform prepare riscv-tests -c isa.json -i riscv-tests -o work/riscv-tests -t isa\n  rvconform run riscv-tests -i isa.json -f 'rv64ui-*'\n  rvconform prepare linux --sdk ~/freedom-u-sdk\n  rvconform run linux --dump -c 100000"
)]
struct Cli {
    /// Platform configuration override (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build boot images for a target.
    #[command(subcommand)]
    Prepare(prepare::PrepareCommand),

    /// Run a target on the emulator.
    #[command(subcommand)]
    Run(run::RunCommand),
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let config = match &cli.config {
        Some(path) => PlatformConfig::from_json_file(path),
        None => Ok(PlatformConfig::default()),
    };

    let result = config.and_then(|config| match cli.command {
        Commands::Prepare(cmd) => prepare::execute(&config, cmd).map(|()| 0),
        Commands::Run(cmd) => run::execute(&config, cmd),
    });

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(SETUP_FAILURE_EXIT_CODE);
        }
    }
}

/// Logs to stderr; `RUST_LOG` overrides the default `info` filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
