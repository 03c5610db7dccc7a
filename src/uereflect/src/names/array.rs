//! Chunked array of name entry pointers (UE4 before the name pool)
//!
//! The global points at an array of chunk pointers, each chunk holding
//! [`ENTRIES_PER_CHUNK`] pointers to entries. NumElements and NumChunks
//! follow the chunk pointer run.

use crate::probe::MemoryProbe;

use byteorder::{ByteOrder, LE};

pub const ENTRIES_PER_CHUNK: usize = 0x4000;
/// "None" as a little-endian u32
const NONE_TAG: u32 = 0x656E_6F4E;
/// Window searched inside an entry for the index and string fields
const ENTRY_PROBE: usize = 0x20;
const MAX_NAME_LENGTH: usize = 1024;

/// Measured layout of a name array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayShape {
    /// Offset of NumElements after the chunk array; NumChunks follows at +4
    pub num_elements_offset: usize,
    pub string_offset: usize,
    pub index_offset: usize,
}

/// Address of entry `index` in the array at `base`
pub fn entry_address(probe: &MemoryProbe, base: usize, index: u32) -> Option<usize> {
    let index = index as usize;
    let chunk = probe
        .read_ptr(base + (index / ENTRIES_PER_CHUNK) * crate::POINTER_SIZE)
        .filter(|&c| c != 0)?;
    probe
        .read_ptr(chunk + (index % ENTRIES_PER_CHUNK) * crate::POINTER_SIZE)
        .filter(|&e| e != 0)
}

/// Find NumElements after the run of chunk pointers.
///
/// Leading non-null qwords are chunk pointers; after at least one zero the
/// first non-zero qword holds (NumElements, NumChunks), and NumChunks must
/// equal the number of chunk pointers seen.
fn find_counts(probe: &MemoryProbe, base: usize, window: usize) -> Option<usize> {
    let data = probe.read_bytes(base, window).or_else(|| {
        let region = probe.source().find_region(base)?;
        probe.read_bytes(base, region.end - base)
    })?;

    let mut valid = 0usize;
    let mut zeros = 0usize;

    for (i, qword) in data.chunks_exact(8).enumerate() {
        let value = LE::read_u64(qword);
        if value == 0 {
            zeros += 1;
        } else if zeros == 0 {
            valid += 1;
        } else {
            let num_chunks = LE::read_i32(&qword[4..8]);
            if valid > 0 && num_chunks as usize == valid {
                return Some(i * crate::POINTER_SIZE);
            }
        }
    }

    None
}

/// Validate a candidate array and measure its entries.
///
/// `window` bounds the bytes searched for the element counts.
pub fn detect(probe: &MemoryProbe, base: usize, window: usize) -> Option<ArrayShape> {
    if !probe.is_readable(base) {
        return None;
    }

    let num_elements_offset = find_counts(probe, base, window)?;

    let none = probe.read_bytes(entry_address(probe, base, 0)?, ENTRY_PROBE + 4)?;
    let string_offset = (0..ENTRY_PROBE).find(|&i| LE::read_u32(&none[i..i + 4]) == NONE_TAG)?;

    let three = probe.read_bytes(entry_address(probe, base, 3)?, ENTRY_PROBE + 4)?;
    let eight = probe.read_bytes(entry_address(probe, base, 8)?, ENTRY_PROBE + 4)?;
    let index_offset = (0..ENTRY_PROBE).find(|&i| {
        LE::read_u32(&three[i..i + 4]) >> 1 == 3 && LE::read_u32(&eight[i..i + 4]) >> 1 == 8
    })?;

    Some(ArrayShape {
        num_elements_offset,
        string_offset,
        index_offset,
    })
}

/// Read the string of the entry at `entry`
pub fn read_entry(probe: &MemoryProbe, entry: usize, shape: &ArrayShape) -> Option<String> {
    let index = probe.read_u32(entry + shape.index_offset)?;
    let string = entry + shape.string_offset;

    if index & 1 != 0 {
        read_wide_cstring(probe, string)
    } else {
        probe.source().read_cstring(string, MAX_NAME_LENGTH).ok().or_else(|| {
            // entries near the end of a mapping can't take a full-length read
            let region = probe.source().find_region(string)?;
            probe
                .source()
                .read_cstring(string, region.end - string)
                .ok()
        })
    }
}

fn read_wide_cstring(probe: &MemoryProbe, address: usize) -> Option<String> {
    let mut chars = Vec::new();
    for i in 0..MAX_NAME_LENGTH {
        let c = probe.read_u16(address + i * 2)?;
        if c == 0 {
            break;
        }
        chars.push(c);
    }
    Some(String::from_utf16_lossy(&chars))
}
