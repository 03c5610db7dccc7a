//! PE image parsing
//!
//! Only the section table and image size are needed: discovery scopes its
//! searches to `.data`/`.text` before falling back to the whole module.

use crate::error::{Error, Result};
use crate::source::MemorySource;

use byteorder::{ByteOrder, LE};

/// e_lfanew position in the DOS header
const PE_HEADER_OFFSET_LOCATION: usize = 0x3C;
const PE_HEADER_MAX_OFFSET: usize = 0x1000;
const SECTION_HEADER_SIZE: usize = 40;

const IMAGE_SCN_CNT_CODE: u32 = 0x0000_0020;
const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;

/// Default image bases tried when no module base is configured
pub const DEFAULT_IMAGE_BASES: [usize; 2] = [0x140000000, 0x400000];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// Absolute virtual address
    pub base: usize,
    pub size: usize,
    pub characteristics: u32,
}

impl Section {
    pub fn end(&self) -> usize {
        self.base + self.size
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.base && address < self.end()
    }

    pub fn is_executable(&self) -> bool {
        self.characteristics & (IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_CNT_CODE) != 0
    }

    pub fn is_writable(&self) -> bool {
        self.characteristics & IMAGE_SCN_MEM_WRITE != 0
    }
}

/// A loaded module and its sections
#[derive(Debug, Clone)]
pub struct Module {
    pub base: usize,
    pub size: usize,
    pub sections: Vec<Section>,
}

impl Module {
    pub fn end(&self) -> usize {
        self.base + self.size
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.base && address < self.end()
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Whether `address` lies in an executable section
    pub fn is_code(&self, address: usize) -> bool {
        self.sections
            .iter()
            .any(|s| s.is_executable() && s.contains(address))
    }

    /// Preferred data section: `.data` by name, else the first writable section
    pub fn data_section(&self) -> Option<&Section> {
        self.section(".data")
            .or_else(|| self.sections.iter().find(|s| s.is_writable() && !s.is_executable()))
    }

    pub fn code_sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.is_executable())
    }
}

/// Parse the PE headers of the image mapped at `base`
pub fn parse_module(source: &dyn MemorySource, base: usize) -> Result<Module> {
    let bad = |what: &str| Error::inconsistent(format!("PE image ({})", what), base);

    let dos_header = source
        .read_bytes(base, 64)
        .map_err(|_| Error::Read { address: base, size: 64 })?;

    if &dos_header[0..2] != b"MZ" {
        return Err(bad("DOS signature"));
    }

    let e_lfanew = PE_HEADER_OFFSET_LOCATION..PE_HEADER_OFFSET_LOCATION + 4;
    let pe_offset = LE::read_u32(&dos_header[e_lfanew]) as usize;
    if pe_offset == 0 || pe_offset > PE_HEADER_MAX_OFFSET {
        return Err(bad("e_lfanew"));
    }

    // PE signature + COFF header + the start of the optional header
    let pe_header = source
        .read_bytes(base + pe_offset, 0x60)
        .map_err(|_| Error::Read { address: base + pe_offset, size: 0x60 })?;

    if &pe_header[0..4] != b"PE\0\0" {
        return Err(bad("PE signature"));
    }

    let number_of_sections = LE::read_u16(&pe_header[6..8]) as usize;
    let size_of_optional_header = LE::read_u16(&pe_header[20..22]) as usize;
    let size_of_image = LE::read_u32(&pe_header[24 + 56..24 + 60]) as usize;

    if number_of_sections == 0 || number_of_sections > 100 {
        return Err(bad("section count"));
    }

    let sections_offset = base + pe_offset + 24 + size_of_optional_header;
    let table_size = number_of_sections * SECTION_HEADER_SIZE;
    let table = source
        .read_bytes(sections_offset, table_size)
        .map_err(|_| Error::Read { address: sections_offset, size: table_size })?;

    let sections: Vec<Section> = table
        .chunks_exact(SECTION_HEADER_SIZE)
        .map(|header| {
            let name_end = header[0..8].iter().position(|&b| b == 0).unwrap_or(8);
            Section {
                name: String::from_utf8_lossy(&header[..name_end]).to_string(),
                base: base + LE::read_u32(&header[12..16]) as usize,
                size: LE::read_u32(&header[8..12]) as usize,
                characteristics: LE::read_u32(&header[36..40]),
            }
        })
        .collect();

    let size = if size_of_image != 0 {
        size_of_image
    } else {
        sections.iter().map(|s| s.end() - base).max().unwrap_or(0)
    };

    Ok(Module {
        base,
        size,
        sections,
    })
}
