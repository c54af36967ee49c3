//! ELF-to-flat-image transform.
//!
//! This module applies an `AddressLayoutRecipe` to an ELF executable. It performs:
//! 1. **Extraction:** Collects allocated sections that occupy file bytes, honoring the section filter.
//! 2. **Rebasing:** Adds the recipe's VMA adjustment (wrapping) to every section address.
//! 3. **Layout:** Places section bytes at `address - origin` in a zero-filled buffer of
//!    exactly `pad_to - origin` bytes, clipping anything outside that window.
//! 4. **Output:** Writes the buffer to the recipe's output path, replacing any existing file.
//!
//! The origin is the recipe's start address, raised to the lowest contributing
//! section when the program begins above it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use object::{Object, ObjectSection, SectionFlags, SectionKind};
use tracing::{debug, info};

use crate::common::addr::GuestAddr;
use crate::common::error::{HarnessError, LayoutError, Result};
use crate::image::recipe::{AddressLayoutRecipe, SectionFilter};

/// Bytes of one section, positioned at its (adjusted) guest address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionImage {
    /// Section name.
    pub name: String,
    /// Guest address of the first byte.
    pub address: u64,
    /// Section contents.
    pub data: Vec<u8>,
}

impl SectionImage {
    /// Creates a positioned section.
    pub fn new(name: impl Into<String>, address: u64, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            address,
            data,
        }
    }

    /// One past the last guest address covered by this section (saturating).
    pub fn end(&self) -> u64 {
        self.address.saturating_add(self.data.len() as u64)
    }
}

/// A flat image produced by [`transform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatImage {
    /// File the image was written to.
    pub path: PathBuf,
    /// Guest address of byte 0.
    pub origin: u64,
    /// Image contents.
    pub data: Vec<u8>,
}

impl FlatImage {
    /// Image length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a zero-length image (never produced by a valid recipe).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// One past the last guest address covered by the image.
    pub fn end(&self) -> u64 {
        self.origin + self.data.len() as u64
    }
}

/// Applies `recipe` and writes the resulting flat image.
///
/// # Arguments
///
/// * `recipe` - Source, destination and address window of the image.
///
/// # Returns
///
/// The written image. On any error no output file is created or modified.
///
/// # Errors
///
/// * `LayoutError::SourceNotFound` if the source executable is missing.
/// * `LayoutError::ElfParse` if the source is not a readable ELF file.
/// * `LayoutError::SectionNotFound` if the section filter names an absent section,
///   or an `Only` filter names a section with no loadable bytes.
/// * `LayoutError::InvalidLayout` if `pad_to_address` is not above the origin.
/// * `LayoutError::ImageTooLarge` if the image buffer cannot be allocated.
pub fn transform(recipe: &AddressLayoutRecipe) -> Result<FlatImage> {
    let source = recipe.source();
    let bytes = match fs::read(source) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(LayoutError::SourceNotFound(source.to_path_buf()).into());
        }
        Err(e) => return Err(HarnessError::io(source, e)),
    };

    let sections = extract_sections(
        source,
        &bytes,
        recipe.vma_adjust.unwrap_or(0),
        recipe.section_filter.as_ref(),
    )?;
    let (origin, data) = layout_sections(
        source,
        &sections,
        recipe.start_address,
        recipe.pad_to_address,
    )?;

    fs::write(recipe.output(), &data).map_err(|e| HarnessError::io(recipe.output(), e))?;
    info!(
        source = %source.display(),
        output = %recipe.output().display(),
        origin = %GuestAddr(origin),
        len = data.len(),
        "wrote flat image"
    );

    Ok(FlatImage {
        path: recipe.output().to_path_buf(),
        origin,
        data,
    })
}

/// Collects the loadable sections of an ELF image.
///
/// Only allocated sections with file contents are returned; NOBITS sections
/// such as `.bss` are zero in the flat image anyway.
///
/// # Arguments
///
/// * `path` - Source path, used in error messages.
/// * `bytes` - Raw ELF file contents.
/// * `vma_adjust` - Offset added (wrapping) to every section address.
/// * `filter` - Optional section selection.
pub fn extract_sections(
    path: &Path,
    bytes: &[u8],
    vma_adjust: u64,
    filter: Option<&SectionFilter>,
) -> Result<Vec<SectionImage>, LayoutError> {
    let parse_error = |message: String| LayoutError::ElfParse {
        path: path.to_path_buf(),
        message,
    };

    let file = object::File::parse(bytes).map_err(|e| parse_error(e.to_string()))?;
    if file.format() != object::BinaryFormat::Elf {
        return Err(parse_error(format!("unsupported format {:?}", file.format())));
    }

    let mut filter_matched = false;
    let mut sections = Vec::new();
    for section in file.sections() {
        let name = section.name().map_err(|e| parse_error(e.to_string()))?;
        let named = filter.is_some_and(|f| name == f.section());
        if !filter.is_none_or(|f| f.keeps(name)) {
            // An excluded section only has to exist.
            filter_matched |= named;
            continue;
        }
        if !is_loadable(&section) {
            continue;
        }
        let data = section.data().map_err(|e| parse_error(e.to_string()))?;
        if data.is_empty() {
            continue;
        }
        filter_matched |= named;
        let address = section.address().wrapping_add(vma_adjust);
        debug!(section = name, address = %GuestAddr(address), len = data.len(), "section");
        sections.push(SectionImage::new(name, address, data.to_vec()));
    }

    if let Some(filter) = filter.filter(|_| !filter_matched) {
        return Err(LayoutError::SectionNotFound {
            path: path.to_path_buf(),
            section: filter.section().to_string(),
        });
    }

    Ok(sections)
}

fn is_loadable<'data, S: ObjectSection<'data>>(section: &S) -> bool {
    let allocated = match section.flags() {
        SectionFlags::Elf { sh_flags } => sh_flags & u64::from(object::elf::SHF_ALLOC) != 0,
        _ => false,
    };
    let has_contents = !matches!(
        section.kind(),
        SectionKind::UninitializedData | SectionKind::UninitializedTls
    ) && section.file_range().is_some();
    allocated && has_contents
}

/// Lays positioned sections out into a flat image.
///
/// # Arguments
///
/// * `path` - Source path, used in error messages.
/// * `sections` - Sections to place.
/// * `start` - Requested image origin.
/// * `pad_to` - Address the image ends at.
///
/// # Returns
///
/// `(origin, bytes)` where `bytes.len() == pad_to - origin`.
///
/// # Errors
///
/// `InvalidLayout` if `pad_to <= origin`, `ImageTooLarge` if the window
/// cannot be allocated.
pub fn layout_sections(
    path: &Path,
    sections: &[SectionImage],
    start: u64,
    pad_to: u64,
) -> Result<(u64, Vec<u8>), LayoutError> {
    let origin = sections
        .iter()
        .map(|s| s.address)
        .min()
        .map_or(start, |lowest| lowest.max(start));

    let invalid = || LayoutError::InvalidLayout {
        source_path: path.to_path_buf(),
        origin,
        pad_to,
    };
    if pad_to <= origin {
        return Err(invalid());
    }
    let too_large = || LayoutError::ImageTooLarge {
        source_path: path.to_path_buf(),
        len: pad_to - origin,
    };
    let len = usize::try_from(pad_to - origin).map_err(|_| too_large())?;

    let mut image = Vec::new();
    image.try_reserve_exact(len).map_err(|_| too_large())?;
    image.resize(len, 0u8);
    for section in sections {
        let lo = section.address.max(origin);
        let hi = section.end().min(pad_to);
        if hi <= lo {
            continue;
        }
        let src = (lo - section.address) as usize;
        let dst = (lo - origin) as usize;
        let count = (hi - lo) as usize;
        image[dst..dst + count].copy_from_slice(&section.data[src..src + count]);
    }

    Ok((origin, image))
}
