//! Platform configuration for the harness.
//!
//! This module replaces ambient, host-keyed path constants with one explicitly
//! constructed value that every component receives. It provides:
//! 1. **Defaults:** The memory map, cycle budgets and directory layout of the rafi tree.
//! 2. **Structures:** Per-pipeline sections for riscv-tests, Linux and Zephyr runs.
//! 3. **Tool Resolution:** Emulator and oracle paths per `BuildVariant` and host OS.
//!
//! Configuration is `PlatformConfig::default()` for the CLI, or deserialized from a
//! JSON override file where every field is optional.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::common::error::{HarnessError, Result};

/// Default configuration constants for the harness.
///
/// These mirror the fixed memory map the emulator and the prebuilt guest
/// software are linked against.
pub mod defaults {
    /// Guest RAM base; bare-metal tests, the bootloader and RTOS RAM images load here.
    pub const RAM_BASE: u64 = 0x8000_0000;

    /// End of the single flat image produced for a bare-metal ISA test.
    pub const BARE_METAL_PAD_TO: u64 = 0x8000_8000;

    /// Bootloader (bbl) image end; the kernel starts here.
    pub const BOOTLOADER_PAD_TO: u64 = 0x8020_0000;

    /// Kernel image origin.
    pub const KERNEL_BASE: u64 = 0x8020_0000;

    /// Kernel image end.
    pub const KERNEL_PAD_TO: u64 = 0x81f0_0000;

    /// VMA adjustment that rebases vmlinux from its linked virtual base to `KERNEL_BASE`.
    pub const KERNEL_VMA_ADJUST: u64 = 0x20_8020_0000;

    /// Guest address the initramfs archive is loaded at.
    pub const INITRAMFS_BASE: u64 = 0x8400_0000;

    /// Boot ROM base; the Linux boot starts executing here.
    pub const BOOT_ROM_BASE: u64 = 0x1000;

    /// RTOS ROM (vector table) image origin.
    pub const RTOS_ROM_BASE: u64 = 0x0000_1000;

    /// RTOS ROM (vector table) image end.
    pub const RTOS_ROM_PAD_TO: u64 = 0x0000_2000;

    /// RTOS RAM image end.
    pub const RTOS_RAM_PAD_TO: u64 = 0x8000_8000;

    /// Name of the section holding the RTOS vector table.
    pub const RTOS_VECTOR_SECTION: &str = "vector";

    /// Guest RAM size passed to the emulator for Linux boots (128 MiB).
    pub const LINUX_RAM_SIZE: u64 = 128 * 1024 * 1024;

    /// Cycle budget for a Linux boot run.
    pub const LINUX_CYCLES: u64 = 5 * 1000 * 1000;

    /// Cycle budget for an RTOS sample run.
    pub const ZEPHYR_CYCLES: u64 = 10_000;

    /// Default RTOS samples.
    pub const ZEPHYR_SAMPLES: [&str; 2] = ["philosophers", "synchronization"];
}

/// Which emulator build to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum BuildVariant {
    /// Unoptimized build with assertions.
    Debug,
    /// Optimized build.
    #[default]
    Release,
}

impl BuildVariant {
    /// Returns the variant name used in build directory names.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "Debug",
            Self::Release => "Release",
        }
    }

    /// Selects `Debug` when `debug` is set, `Release` otherwise.
    pub const fn from_debug_flag(debug: bool) -> Self {
        if debug { Self::Debug } else { Self::Release }
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host operating system family; decides the build directory layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum HostOs {
    /// Single-config generators: `build_<Variant>/<tool>`.
    Unix,
    /// Multi-config generators: `build_<Variant>/<Variant>/<tool>.exe`.
    Windows,
}

impl Default for HostOs {
    fn default() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Unix }
    }
}

/// Root configuration for all pipelines.
///
/// # Examples
///
/// ```
/// use rvconform_core::config::{BuildVariant, PlatformConfig};
///
/// let config = PlatformConfig::default();
/// assert_eq!(config.riscv_tests.load_addr, 0x8000_0000);
///
/// let json = r#"{ "root_dir": "/opt/rafi", "host_os": "Unix" }"#;
/// let config: PlatformConfig = serde_json::from_str(json).unwrap();
/// assert_eq!(
///     config.emulator_path(BuildVariant::Debug),
///     std::path::PathBuf::from("/opt/rafi/build_Debug/rafi-emu")
/// );
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Directory every relative path below is resolved against.
    pub root_dir: PathBuf,
    /// Host OS family used for tool path resolution.
    pub host_os: HostOs,
    /// Emulator executable base name.
    pub emulator_name: String,
    /// Trace oracle executable base name.
    pub oracle_name: String,
    /// Bare-metal ISA test settings.
    pub riscv_tests: RiscvTestsConfig,
    /// Linux boot settings.
    pub linux: LinuxConfig,
    /// RTOS sample settings.
    pub zephyr: ZephyrConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            host_os: HostOs::default(),
            emulator_name: "rafi-emu".to_string(),
            oracle_name: "rafi-check-io".to_string(),
            riscv_tests: RiscvTestsConfig::default(),
            linux: LinuxConfig::default(),
            zephyr: ZephyrConfig::default(),
        }
    }
}

impl PlatformConfig {
    /// Loads a configuration override from a JSON file.
    ///
    /// Fields missing from the file keep their default values.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| HarnessError::Setup(format!("invalid config {}: {e}", path.display())))
    }

    /// Returns a copy of this configuration rooted at `root`.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_dir = root.into();
        self
    }

    /// Resolves `path` against `root_dir` unless it is already absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    /// Path of the emulator executable for `variant`.
    pub fn emulator_path(&self, variant: BuildVariant) -> PathBuf {
        self.tool_path(&self.emulator_name, variant)
    }

    /// Path of the trace oracle executable for `variant`.
    pub fn oracle_path(&self, variant: BuildVariant) -> PathBuf {
        self.tool_path(&self.oracle_name, variant)
    }

    fn tool_path(&self, tool: &str, variant: BuildVariant) -> PathBuf {
        let build_dir = self.root_dir.join(format!("build_{variant}"));
        match self.host_os {
            HostOs::Unix => build_dir.join(tool),
            HostOs::Windows => build_dir.join(variant.as_str()).join(format!("{tool}.exe")),
        }
    }
}

/// Settings for bare-metal ISA test runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiscvTestsConfig {
    /// Directory holding `<name>.bin` flat images.
    pub binary_dir: PathBuf,
    /// Per-session trace directory.
    pub trace_dir: PathBuf,
    /// Guest address each test image is loaded at.
    pub load_addr: u64,
    /// Initial program counter.
    pub start_pc: u64,
}

impl Default for RiscvTestsConfig {
    fn default() -> Self {
        Self {
            binary_dir: PathBuf::from("third_party/rafi-prebuilt-binary/riscv-tests/isa"),
            trace_dir: PathBuf::from("work/riscv-tests/trace"),
            load_addr: defaults::RAM_BASE,
            start_pc: defaults::RAM_BASE,
        }
    }
}

/// Settings for Linux boot preparation and runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinuxConfig {
    /// Directory holding the prebuilt boot ROM, bbl, vmlinux and initramfs images.
    pub binary_dir: PathBuf,
    /// Output directory of `prepare linux`.
    pub output_dir: PathBuf,
    /// Trace directory for boot runs.
    pub trace_dir: PathBuf,
    /// QEMU executable, relative to the SDK directory.
    pub qemu_path: PathBuf,
    /// Default cycle budget.
    pub cycles: u64,
    /// Guest RAM size in bytes.
    pub ram_size: u64,
}

impl Default for LinuxConfig {
    fn default() -> Self {
        Self {
            binary_dir: PathBuf::from("third_party/rafi-prebuilt-binary/linux"),
            output_dir: PathBuf::from("work/linux"),
            trace_dir: PathBuf::from("work/linux/trace"),
            qemu_path: PathBuf::from("work/riscv-qemu/prefix/bin/qemu-system-riscv64"),
            cycles: defaults::LINUX_CYCLES,
            ram_size: defaults::LINUX_RAM_SIZE,
        }
    }
}

/// Settings for RTOS sample preparation and runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZephyrConfig {
    /// Output directory of `prepare zephyr`, and image directory for runs.
    pub binary_dir: PathBuf,
    /// Trace directory for sample runs.
    pub trace_dir: PathBuf,
    /// Sample names processed when none are given on the command line.
    pub samples: Vec<String>,
    /// Default cycle budget.
    pub cycles: u64,
}

impl Default for ZephyrConfig {
    fn default() -> Self {
        Self {
            binary_dir: PathBuf::from("work/zephyr"),
            trace_dir: PathBuf::from("work/zephyr/trace"),
            samples: defaults::ZEPHYR_SAMPLES.iter().map(ToString::to_string).collect(),
            cycles: defaults::ZEPHYR_CYCLES,
        }
    }
}

/// Returns `path` if it is an existing directory, or a setup error naming `what`.
pub fn require_dir(path: &Path, what: &str) -> Result<PathBuf> {
    if path.is_dir() {
        Ok(path.to_path_buf())
    } else {
        Err(HarnessError::Setup(format!(
            "{what} directory '{}' does not exist",
            path.display()
        )))
    }
}
