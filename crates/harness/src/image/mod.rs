//! Boot image preparation.
//!
//! This module turns compiled executables into the flat images the emulator loads. It provides:
//! 1. **Recipes:** Declarative address layouts (`AddressLayoutRecipe`, `SectionFilter`).
//! 2. **Transform:** ELF section extraction into zero-padded flat binaries.
//! 3. **Assembly:** Per-target image sets written into a freshly reset output directory.
//! 4. **Device Trees:** The external reference-VM boundary used for Linux boots.

/// Boot target assembly and image sets.
pub mod assembler;
/// Device-tree blob generation through an external reference VM.
pub mod dtb;
/// Address layout recipes.
pub mod recipe;
/// ELF-to-flat-image transform.
pub mod transform;

pub use assembler::{BootImageAssembler, BootTarget, ImageEntry, ImageRole, ImageSet, TestSuite};
pub use dtb::{DeviceTreeSource, QemuDeviceTree};
pub use recipe::{AddressLayoutRecipe, OutputFormat, SectionFilter};
pub use transform::{FlatImage, SectionImage, transform};
