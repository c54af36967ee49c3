//! Minimal ELF64 little-endian writer.
//!
//! Produces just enough of an executable for section-based layout: an ELF
//! header, section contents, a `.shstrtab` and a section header table. No
//! program headers are emitted.

use std::fs;
use std::path::Path;

const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;
const SHT_NOBITS: u32 = 8;

/// `SHF_WRITE`.
pub const SHF_WRITE: u64 = 0x1;
/// `SHF_ALLOC`.
pub const SHF_ALLOC: u64 = 0x2;
/// `SHF_EXECINSTR`.
pub const SHF_EXECINSTR: u64 = 0x4;

const EHDR_SIZE: usize = 64;
const SHDR_SIZE: usize = 64;

#[derive(Debug, Clone)]
struct Section {
    name: String,
    kind: u32,
    flags: u64,
    addr: u64,
    data: Vec<u8>,
    nobits_size: u64,
}

/// Builder for a RISC-V ELF64 executable.
#[derive(Debug, Clone, Default)]
pub struct ElfBuilder {
    entry: u64,
    sections: Vec<Section>,
}

impl ElfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }

    /// Allocated, executable `PROGBITS` section.
    pub fn text(self, name: &str, addr: u64, data: &[u8]) -> Self {
        self.progbits(name, addr, SHF_ALLOC | SHF_EXECINSTR, data)
    }

    /// Allocated, writable `PROGBITS` section.
    pub fn data(self, name: &str, addr: u64, data: &[u8]) -> Self {
        self.progbits(name, addr, SHF_ALLOC | SHF_WRITE, data)
    }

    pub fn progbits(mut self, name: &str, addr: u64, flags: u64, data: &[u8]) -> Self {
        self.sections.push(Section {
            name: name.to_string(),
            kind: SHT_PROGBITS,
            flags,
            addr,
            data: data.to_vec(),
            nobits_size: 0,
        });
        self
    }

    /// `NOBITS` section such as `.bss`.
    pub fn bss(mut self, name: &str, addr: u64, size: u64) -> Self {
        self.sections.push(Section {
            name: name.to_string(),
            kind: SHT_NOBITS,
            flags: SHF_ALLOC | SHF_WRITE,
            addr,
            data: Vec::new(),
            nobits_size: size,
        });
        self
    }

    /// Non-allocated section such as `.comment`.
    pub fn note(self, name: &str, data: &[u8]) -> Self {
        self.progbits(name, 0, 0, data)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut shstrtab = vec![0u8];
        let mut name_offsets = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            name_offsets.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(section.name.as_bytes());
            shstrtab.push(0);
        }
        let shstrtab_name = shstrtab.len() as u32;
        shstrtab.extend_from_slice(b".shstrtab\0");

        let mut body = vec![0u8; EHDR_SIZE];
        let mut offsets = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            align(&mut body, 8);
            offsets.push(body.len() as u64);
            body.extend_from_slice(&section.data);
        }
        let shstrtab_offset = body.len() as u64;
        body.extend_from_slice(&shstrtab);
        align(&mut body, 8);
        let shoff = body.len() as u64;

        let shnum = self.sections.len() + 2;
        let shstrndx = shnum - 1;

        // Section headers.
        body.extend_from_slice(&[0u8; SHDR_SIZE]);
        for ((section, name), offset) in self.sections.iter().zip(&name_offsets).zip(&offsets) {
            let size = if section.kind == SHT_NOBITS {
                section.nobits_size
            } else {
                section.data.len() as u64
            };
            push_shdr(
                &mut body,
                *name,
                section.kind,
                section.flags,
                section.addr,
                *offset,
                size,
                4,
            );
        }
        push_shdr(
            &mut body,
            shstrtab_name,
            SHT_STRTAB,
            0,
            0,
            shstrtab_offset,
            shstrtab.len() as u64,
            1,
        );

        // ELF header.
        let mut ehdr = Vec::with_capacity(EHDR_SIZE);
        ehdr.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
        ehdr.extend_from_slice(&[0u8; 8]);
        ehdr.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        ehdr.extend_from_slice(&243u16.to_le_bytes()); // EM_RISCV
        ehdr.extend_from_slice(&1u32.to_le_bytes());
        ehdr.extend_from_slice(&self.entry.to_le_bytes());
        ehdr.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
        ehdr.extend_from_slice(&shoff.to_le_bytes());
        ehdr.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        ehdr.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
        ehdr.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
        ehdr.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
        ehdr.extend_from_slice(&(SHDR_SIZE as u16).to_le_bytes());
        ehdr.extend_from_slice(&(shnum as u16).to_le_bytes());
        ehdr.extend_from_slice(&(shstrndx as u16).to_le_bytes());
        assert_eq!(ehdr.len(), EHDR_SIZE);
        body[..EHDR_SIZE].copy_from_slice(&ehdr);
        body
    }

    pub fn write_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, self.build()).unwrap();
    }
}

fn align(buf: &mut Vec<u8>, to: usize) {
    while buf.len() % to != 0 {
        buf.push(0);
    }
}

#[allow(clippy::too_many_arguments)]
fn push_shdr(
    buf: &mut Vec<u8>,
    name: u32,
    kind: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    addralign: u64,
) {
    buf.extend_from_slice(&name.to_le_bytes());
    buf.extend_from_slice(&kind.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&addr.to_le_bytes());
    buf.extend_from_slice(&offset.to_le_bytes());
    buf.extend_from_slice(&size.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // sh_link
    buf.extend_from_slice(&0u32.to_le_bytes()); // sh_info
    buf.extend_from_slice(&addralign.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes()); // sh_entsize
}
