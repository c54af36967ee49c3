//! `rvconform prepare` subcommands.

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};
use tracing::info;

use rvconform_core::config::{PlatformConfig, require_dir};
use rvconform_core::image::{BootImageAssembler, BootTarget, QemuDeviceTree, TestSuite};
use rvconform_core::manifest::{GlobPattern, TestManifest};
use rvconform_core::{HarnessError, Result};

#[derive(Subcommand, Debug)]
pub enum PrepareCommand {
    /// Convert riscv-tests executables into flat images.
    RiscvTests {
        /// Test list (JSON manifest).
        #[arg(short = 'c', long = "config-path")]
        manifest: PathBuf,

        /// riscv-tests build directory.
        #[arg(short = 'i', long = "in-dir", required_unless_present = "list")]
        in_dir: Option<PathBuf>,

        /// Output directory; cleared before writing.
        #[arg(short = 'o', long = "out-dir", required_unless_present = "list")]
        out_dir: Option<PathBuf>,

        /// Test suite subdirectory.
        #[arg(short = 't', long = "type", value_enum)]
        suite: SuiteArg,

        /// Only prepare tests whose name matches this glob.
        #[arg(short = 'f', long)]
        filter: Option<String>,

        /// List test names and exit.
        #[arg(short = 'l', long = "list")]
        list: bool,
    },

    /// Build the Linux boot image set from a Freedom U SDK tree.
    Linux {
        /// SDK root directory.
        #[arg(long, env = "RAFI_FREEDOM_U_SDK")]
        sdk: Option<PathBuf>,
    },

    /// Build ROM/RAM images for Zephyr samples.
    Zephyr {
        /// Zephyr tree root.
        #[arg(long, env = "ZEPHYR_BASE")]
        zephyr_base: Option<PathBuf>,

        /// Sample names (default: the configured samples).
        #[arg(long = "sample")]
        samples: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SuiteArg {
    Isa,
    Benchmarks,
}

impl From<SuiteArg> for TestSuite {
    fn from(arg: SuiteArg) -> Self {
        match arg {
            SuiteArg::Isa => Self::Isa,
            SuiteArg::Benchmarks => Self::Benchmarks,
        }
    }
}

pub fn execute(config: &PlatformConfig, cmd: PrepareCommand) -> Result<()> {
    match cmd {
        PrepareCommand::RiscvTests {
            manifest,
            in_dir,
            out_dir,
            suite,
            filter,
            list,
        } => prepare_riscv_tests(&manifest, in_dir, out_dir, suite.into(), filter, list),
        PrepareCommand::Linux { sdk } => prepare_linux(config, sdk),
        PrepareCommand::Zephyr {
            zephyr_base,
            samples,
        } => prepare_zephyr(config, zephyr_base, samples),
    }
}

fn prepare_riscv_tests(
    manifest: &std::path::Path,
    in_dir: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    suite: TestSuite,
    filter: Option<String>,
    list: bool,
) -> Result<()> {
    let manifest = TestManifest::load(manifest)?;
    let pattern = filter.as_deref().map_or_else(GlobPattern::any, GlobPattern::new);
    let names: Vec<String> = manifest
        .matching_names(&pattern)
        .into_iter()
        .map(str::to_string)
        .collect();

    if list {
        for name in &names {
            println!("{name}");
        }
        return Ok(());
    }

    let in_dir = in_dir
        .ok_or_else(|| HarnessError::Setup("input directory is not specified (-i)".to_string()))?;
    let in_dir = require_dir(&in_dir, "riscv-tests input")?;
    let out_dir = out_dir
        .ok_or_else(|| HarnessError::Setup("output directory is not specified (-o)".to_string()))?;

    let set = BootImageAssembler::new(out_dir).assemble(&BootTarget::BareMetal {
        in_dir,
        suite,
        tests: names,
    })?;
    info!(images = set.entries.len(), "riscv-tests images prepared");
    Ok(())
}

fn prepare_linux(config: &PlatformConfig, sdk: Option<PathBuf>) -> Result<()> {
    let sdk = sdk.ok_or_else(|| {
        HarnessError::Setup("environment variable 'RAFI_FREEDOM_U_SDK' is not set".to_string())
    })?;
    let sdk_dir = require_dir(&sdk, "Freedom U SDK")?;
    let qemu = QemuDeviceTree::new(sdk_dir.join(&config.linux.qemu_path));

    let set = BootImageAssembler::new(config.resolve(&config.linux.output_dir))
        .with_device_tree_source(Box::new(qemu))
        .assemble(&BootTarget::Linux { sdk_dir })?;
    info!(images = set.entries.len(), "linux images prepared");
    Ok(())
}

fn prepare_zephyr(
    config: &PlatformConfig,
    zephyr_base: Option<PathBuf>,
    samples: Vec<String>,
) -> Result<()> {
    let zephyr_base = zephyr_base.ok_or_else(|| {
        HarnessError::Setup("environment variable 'ZEPHYR_BASE' is not set".to_string())
    })?;
    let zephyr_base = require_dir(&zephyr_base, "Zephyr")?;
    let samples = if samples.is_empty() {
        config.zephyr.samples.clone()
    } else {
        samples
    };

    let set = BootImageAssembler::new(config.resolve(&config.zephyr.binary_dir)).assemble(
        &BootTarget::RtosSplit {
            zephyr_base,
            samples,
        },
    )?;
    info!(images = set.entries.len(), "zephyr images prepared");
    Ok(())
}
