//! Boot image assembly.
//!
//! This module produces the complete image set for one boot target. It performs:
//! 1. **Reset:** Removes and recreates the output directory before anything is written.
//! 2. **Transforms:** Runs one address recipe per image according to the target's memory map.
//! 3. **External Artifacts:** Copies the initramfs verbatim and asks a `DeviceTreeSource` for the DTB.
//! 4. **Sealing:** Writes `image-set.json` last; `ImageSet::open_verified` only accepts sealed directories.
//!
//! Any failing step aborts the assembly and leaves the directory unsealed.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::addr::GuestAddr;
use crate::common::error::{HarnessError, Result};
use crate::config::defaults;
use crate::image::dtb::DeviceTreeSource;
use crate::image::recipe::{AddressLayoutRecipe, SectionFilter};
use crate::image::transform::transform;

/// File written last into a fully assembled output directory.
pub const IMAGE_SET_MARKER: &str = "image-set.json";

/// What an image is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageRole {
    /// Reset-vector ROM executed before the bootloader.
    BootRom,
    /// Supervisor binary interface / bootloader (bbl).
    Bootloader,
    /// Operating system kernel.
    Kernel,
    /// Initial ramdisk archive.
    Initramfs,
    /// Flattened device tree.
    DeviceTreeBlob,
    /// Single bare-metal test program.
    Program,
    /// RTOS image body, vector table removed.
    Ram,
    /// RTOS vector table.
    Rom,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BootRom => "boot-rom",
            Self::Bootloader => "bootloader",
            Self::Kernel => "kernel",
            Self::Initramfs => "initramfs",
            Self::DeviceTreeBlob => "device-tree-blob",
            Self::Program => "program",
            Self::Ram => "ram",
            Self::Rom => "rom",
        };
        f.write_str(name)
    }
}

/// One produced artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Test or sample the image belongs to (the target name for single-image-set targets).
    pub name: String,
    /// Role within the boot.
    pub role: ImageRole,
    /// File holding the image.
    pub path: PathBuf,
    /// Guest address the emulator should load the file at, if it is loaded directly.
    pub load_address: Option<GuestAddr>,
}

/// The artifacts produced for one boot target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageSet {
    /// Directory holding every entry.
    pub out_dir: PathBuf,
    /// Entries in production order.
    pub entries: Vec<ImageEntry>,
}

impl ImageSet {
    /// Returns the first entry with `role`.
    pub fn get(&self, role: ImageRole) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.role == role)
    }

    /// Returns every entry belonging to `name`.
    pub fn entries_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ImageEntry> + 'a {
        self.entries.iter().filter(move |e| e.name == name)
    }

    /// Opens a previously assembled directory.
    ///
    /// Fails with `IncompleteImageSet` unless the directory was sealed by a
    /// successful assembly.
    pub fn open_verified(dir: &Path) -> Result<Self> {
        let marker = dir.join(IMAGE_SET_MARKER);
        let text = match fs::read_to_string(&marker) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(HarnessError::IncompleteImageSet(dir.to_path_buf()));
            }
            Err(e) => return Err(HarnessError::io(&marker, e)),
        };
        let set: Self = serde_json::from_str(&text)
            .map_err(|_| HarnessError::IncompleteImageSet(dir.to_path_buf()))?;
        if set.entries.iter().any(|e| !e.path.is_file()) {
            return Err(HarnessError::IncompleteImageSet(dir.to_path_buf()));
        }
        Ok(set)
    }

    fn seal(&self) -> Result<()> {
        let marker = self.out_dir.join(IMAGE_SET_MARKER);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| HarnessError::io(&marker, io::Error::other(e)))?;
        fs::write(&marker, json).map_err(|e| HarnessError::io(&marker, e))
    }
}

/// riscv-tests input layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestSuite {
    /// `isa/<name>` instruction tests.
    Isa,
    /// `benchmarks/<name>` programs.
    Benchmarks,
}

impl TestSuite {
    /// Subdirectory name under the input directory.
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Isa => "isa",
            Self::Benchmarks => "benchmarks",
        }
    }
}

/// A guest software configuration with its own memory map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootTarget {
    /// One flat image per bare-metal test program.
    BareMetal {
        /// Root of the riscv-tests build tree.
        in_dir: PathBuf,
        /// Which subdirectory to read from.
        suite: TestSuite,
        /// Test program names.
        tests: Vec<String>,
    },
    /// Bootloader, kernel, initramfs and device tree for a Linux boot.
    Linux {
        /// Root of the Freedom U SDK work tree.
        sdk_dir: PathBuf,
    },
    /// ROM/RAM split images for each RTOS sample.
    RtosSplit {
        /// Root of the Zephyr tree.
        zephyr_base: PathBuf,
        /// Sample names.
        samples: Vec<String>,
    },
}

/// Writes the image set for a boot target into one output directory.
pub struct BootImageAssembler {
    out_dir: PathBuf,
    device_tree: Option<Box<dyn DeviceTreeSource>>,
}

impl fmt::Debug for BootImageAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootImageAssembler")
            .field("out_dir", &self.out_dir)
            .field("device_tree", &self.device_tree.is_some())
            .finish()
    }
}

impl BootImageAssembler {
    /// Creates an assembler writing into `out_dir`.
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            device_tree: None,
        }
    }

    /// Sets the device-tree generator used by the Linux target.
    #[must_use]
    pub fn with_device_tree_source(mut self, source: Box<dyn DeviceTreeSource>) -> Self {
        self.device_tree = Some(source);
        self
    }

    /// Output directory.
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Clears the output directory and produces every image `target` needs.
    ///
    /// # Arguments
    ///
    /// * `target` - Boot target to assemble.
    ///
    /// # Returns
    ///
    /// The sealed image set. On error the directory holds no marker and must be
    /// treated as invalid.
    pub fn assemble(&self, target: &BootTarget) -> Result<ImageSet> {
        if matches!(target, BootTarget::Linux { .. }) && self.device_tree.is_none() {
            return Err(HarnessError::Setup(
                "Linux assembly requires a device tree source".to_string(),
            ));
        }

        reset_dir(&self.out_dir)?;
        let mut set = ImageSet {
            out_dir: self.out_dir.clone(),
            entries: Vec::new(),
        };

        match target {
            BootTarget::BareMetal {
                in_dir,
                suite,
                tests,
            } => self.assemble_bare_metal(&mut set, in_dir, *suite, tests)?,
            BootTarget::Linux { sdk_dir } => self.assemble_linux(&mut set, sdk_dir)?,
            BootTarget::RtosSplit {
                zephyr_base,
                samples,
            } => self.assemble_rtos(&mut set, zephyr_base, samples)?,
        }

        set.seal()?;
        info!(dir = %self.out_dir.display(), images = set.entries.len(), "image set complete");
        Ok(set)
    }

    fn assemble_bare_metal(
        &self,
        set: &mut ImageSet,
        in_dir: &Path,
        suite: TestSuite,
        tests: &[String],
    ) -> Result<()> {
        for name in tests {
            let recipe = AddressLayoutRecipe::new(
                in_dir.join(suite.dir_name()).join(name),
                self.out_dir.join(format!("{name}.bin")),
                defaults::RAM_BASE,
                defaults::BARE_METAL_PAD_TO,
            );
            let image = transform(&recipe)?;
            set.entries.push(ImageEntry {
                name: name.clone(),
                role: ImageRole::Program,
                path: image.path,
                load_address: Some(GuestAddr(defaults::RAM_BASE)),
            });
        }
        Ok(())
    }

    fn assemble_linux(&self, set: &mut ImageSet, sdk_dir: &Path) -> Result<()> {
        let bbl = sdk_dir.join("work/riscv-pk/bbl");
        let vmlinux = sdk_dir.join("work/linux/vmlinux");
        let initramfs = sdk_dir.join("work/initramfs.cpio.gz");

        let bootloader = transform(&AddressLayoutRecipe::new(
            &bbl,
            self.out_dir.join("bbl.bin"),
            defaults::RAM_BASE,
            defaults::BOOTLOADER_PAD_TO,
        ))?;
        set.entries.push(ImageEntry {
            name: "linux".to_string(),
            role: ImageRole::Bootloader,
            path: bootloader.path,
            load_address: Some(GuestAddr(defaults::RAM_BASE)),
        });

        let dtb_path = self.out_dir.join("rafi-emu.dtb");
        if let Some(device_tree) = &self.device_tree {
            device_tree.generate(&bbl, &vmlinux, &initramfs, &dtb_path)?;
        }
        set.entries.push(ImageEntry {
            name: "linux".to_string(),
            role: ImageRole::DeviceTreeBlob,
            path: dtb_path,
            load_address: None,
        });

        let kernel = transform(
            &AddressLayoutRecipe::new(
                &vmlinux,
                self.out_dir.join("vmlinux.bin"),
                defaults::KERNEL_BASE,
                defaults::KERNEL_PAD_TO,
            )
            .with_vma_adjust(defaults::KERNEL_VMA_ADJUST),
        )?;
        set.entries.push(ImageEntry {
            name: "linux".to_string(),
            role: ImageRole::Kernel,
            path: kernel.path,
            load_address: Some(GuestAddr(defaults::KERNEL_BASE)),
        });

        let initramfs_out = self.out_dir.join("initramfs.cpio.gz");
        copy_file(&initramfs, &initramfs_out)?;
        set.entries.push(ImageEntry {
            name: "linux".to_string(),
            role: ImageRole::Initramfs,
            path: initramfs_out,
            load_address: Some(GuestAddr(defaults::INITRAMFS_BASE)),
        });
        Ok(())
    }

    fn assemble_rtos(&self, set: &mut ImageSet, zephyr_base: &Path, samples: &[String]) -> Result<()> {
        for name in samples {
            let elf = zephyr_base
                .join("samples")
                .join(name)
                .join("outdir/qemu_riscv32/zephyr.strip");

            let ram = transform(
                &AddressLayoutRecipe::new(
                    &elf,
                    self.out_dir.join(format!("{name}.ram.bin")),
                    defaults::RAM_BASE,
                    defaults::RTOS_RAM_PAD_TO,
                )
                .with_section_filter(SectionFilter::Exclude(
                    defaults::RTOS_VECTOR_SECTION.to_string(),
                )),
            )?;
            set.entries.push(ImageEntry {
                name: name.clone(),
                role: ImageRole::Ram,
                path: ram.path,
                load_address: Some(GuestAddr(defaults::RAM_BASE)),
            });

            let rom = transform(
                &AddressLayoutRecipe::new(
                    &elf,
                    self.out_dir.join(format!("{name}.rom.bin")),
                    defaults::RTOS_ROM_BASE,
                    defaults::RTOS_ROM_PAD_TO,
                )
                .with_section_filter(SectionFilter::Only(
                    defaults::RTOS_VECTOR_SECTION.to_string(),
                )),
            )?;
            set.entries.push(ImageEntry {
                name: name.clone(),
                role: ImageRole::Rom,
                path: rom.path,
                load_address: Some(GuestAddr(defaults::RTOS_ROM_BASE)),
            });
        }
        Ok(())
    }
}

/// Removes `dir` (if present) and recreates it empty.
pub fn reset_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(HarnessError::io(dir, e)),
    }
    fs::create_dir_all(dir).map_err(|e| HarnessError::io(dir, e))
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    match fs::copy(from, to) {
        Ok(bytes) => {
            info!(from = %from.display(), to = %to.display(), bytes, "copied artifact");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(crate::common::error::LayoutError::SourceNotFound(from.to_path_buf()).into())
        }
        Err(e) => Err(HarnessError::io(from, e)),
    }
}
