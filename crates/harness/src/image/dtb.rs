//! Device-tree blob generation.
//!
//! The Linux boot needs a device tree matching the emulator's `virt`-like
//! machine. It is produced by a reference virtual machine and treated as an
//! opaque artifact; this module only defines the seam and the default QEMU
//! invocation.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::info;

use crate::common::error::{HarnessError, Result};

/// Produces a device-tree blob for a bootloader/kernel/initrd triple.
pub trait DeviceTreeSource: Send + Sync {
    /// Writes a device-tree blob to `out_path`.
    ///
    /// # Arguments
    ///
    /// * `bios` - Bootloader executable.
    /// * `kernel` - Kernel executable.
    /// * `initrd` - Initial ramdisk archive.
    /// * `out_path` - Destination of the blob.
    fn generate(&self, bios: &Path, kernel: &Path, initrd: &Path, out_path: &Path) -> Result<()>;
}

/// Dumps the device tree of QEMU's `virt` machine.
#[derive(Debug, Clone)]
pub struct QemuDeviceTree {
    qemu_path: PathBuf,
}

impl QemuDeviceTree {
    /// Uses the QEMU system emulator at `qemu_path`.
    pub fn new(qemu_path: impl Into<PathBuf>) -> Self {
        Self {
            qemu_path: qemu_path.into(),
        }
    }

    /// Builds the QEMU command line without running it.
    pub fn command(&self, bios: &Path, kernel: &Path, initrd: &Path, out_path: &Path) -> Command {
        let mut cmd = Command::new(&self.qemu_path);
        let _ = cmd
            .arg("-nographic")
            .arg("-machine")
            .arg(format!("virt,dumpdtb={}", out_path.display()))
            .arg("-bios")
            .arg(bios)
            .arg("-kernel")
            .arg(kernel)
            .arg("-initrd")
            .arg(initrd)
            .stdin(Stdio::null());
        cmd
    }
}

impl DeviceTreeSource for QemuDeviceTree {
    fn generate(&self, bios: &Path, kernel: &Path, initrd: &Path, out_path: &Path) -> Result<()> {
        // QEMU resolves dumpdtb= relative to its own cwd.
        let out_path = std::path::absolute(out_path).map_err(|e| HarnessError::io(out_path, e))?;
        let mut cmd = self.command(bios, kernel, initrd, &out_path);
        info!(qemu = %self.qemu_path.display(), out = %out_path.display(), "generating device tree");

        let status = cmd.status().map_err(|e| {
            HarnessError::DeviceTree(format!("failed to run {}: {e}", self.qemu_path.display()))
        })?;
        if !status.success() {
            return Err(HarnessError::DeviceTree(format!(
                "{} exited with {status}",
                self.qemu_path.display()
            )));
        }
        if !out_path.is_file() {
            return Err(HarnessError::DeviceTree(format!(
                "{} did not produce {}",
                self.qemu_path.display(),
                out_path.display()
            )));
        }
        Ok(())
    }
}
