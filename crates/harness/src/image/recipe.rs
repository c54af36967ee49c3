//! Address layout recipes.
//!
//! A recipe names one source executable, one output file and the address
//! window the output covers. It is the declarative form of an
//! `objcopy -O binary --set-start --pad-to [--adjust-vma] [--only-section|--remove-section]`
//! invocation.

use std::path::{Path, PathBuf};

/// Output encoding of a transformed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Headerless memory image, byte 0 at the image origin.
    #[default]
    FlatBinary,
}

/// Restricts which sections contribute to an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionFilter {
    /// Keep only the named section.
    Only(String),
    /// Drop the named section and keep every other one.
    Exclude(String),
}

impl SectionFilter {
    /// Name of the section this filter refers to.
    pub fn section(&self) -> &str {
        match self {
            Self::Only(name) | Self::Exclude(name) => name,
        }
    }

    /// Returns `true` if a section called `name` passes the filter.
    pub fn keeps(&self, name: &str) -> bool {
        match self {
            Self::Only(keep) => keep == name,
            Self::Exclude(drop) => drop != name,
        }
    }
}

/// Declarative description of one flat image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressLayoutRecipe {
    /// Executable the image is extracted from.
    pub source_path: PathBuf,
    /// File the image is written to.
    pub output_path: PathBuf,
    /// Output encoding.
    pub output_format: OutputFormat,
    /// Logical load origin of the image.
    pub start_address: u64,
    /// Address the image end is padded or truncated to.
    pub pad_to_address: u64,
    /// Offset added (wrapping) to every section address before extraction.
    pub vma_adjust: Option<u64>,
    /// Optional section selection.
    pub section_filter: Option<SectionFilter>,
}

impl AddressLayoutRecipe {
    /// Creates a flat-binary recipe covering `[start_address, pad_to_address)`.
    pub fn new(
        source_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        start_address: u64,
        pad_to_address: u64,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            output_path: output_path.into(),
            output_format: OutputFormat::FlatBinary,
            start_address,
            pad_to_address,
            vma_adjust: None,
            section_filter: None,
        }
    }

    /// Rebases every section by `adjust` before layout.
    #[must_use]
    pub const fn with_vma_adjust(mut self, adjust: u64) -> Self {
        self.vma_adjust = Some(adjust);
        self
    }

    /// Restricts the image to the sections accepted by `filter`.
    #[must_use]
    pub fn with_section_filter(mut self, filter: SectionFilter) -> Self {
        self.section_filter = Some(filter);
        self
    }

    /// Source executable path.
    pub fn source(&self) -> &Path {
        &self.source_path
    }

    /// Output image path.
    pub fn output(&self) -> &Path {
        &self.output_path
    }
}
