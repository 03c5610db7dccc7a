//! Name pool (UE4.23+)
//!
//! Pool header:
//! - +0x00: lock
//! - +0x08: CurrentBlock (u32)
//! - +0x0C: CurrentByteCursor (u32)
//! - +0x10: Blocks[]
//!
//! Entries are a u16 header (wide flag in bit 0, length in the high bits)
//! followed by the characters, padded to the entry stride.

use crate::config::SanityBounds;
use crate::probe::MemoryProbe;

use byteorder::{ByteOrder, LE};

pub const BLOCKS_OFFSET: usize = 0x10;
pub const DEFAULT_BLOCK_OFFSET_BITS: u32 = 16;

const NONE: &[u8] = b"None";
/// Length of "ByteProperty", always the second entry
const SECOND_ENTRY_LENGTH: u16 = 12;
const MAX_LOCK_VALUE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolShape {
    /// Bytes before the characters; the u16 length header is the last two
    pub header_size: usize,
    pub stride: usize,
    pub length_shift: u32,
    pub block_offset_bits: u32,
}

impl PoolShape {
    pub fn block_size(&self) -> usize {
        self.stride << self.block_offset_bits
    }

    fn split(&self, index: u32) -> (usize, usize) {
        let block = (index >> self.block_offset_bits) as usize;
        let offset = (index & ((1 << self.block_offset_bits) - 1)) as usize;
        (block, offset * self.stride)
    }

    pub fn index_of(&self, block: usize, byte_offset: usize) -> u32 {
        ((block as u32) << self.block_offset_bits) | (byte_offset / self.stride) as u32
    }
}

/// Decoded entry header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub wide: bool,
    pub len: usize,
}

impl EntryHeader {
    fn parse(raw: u16, shape: &PoolShape) -> Self {
        Self {
            wide: raw & 1 != 0,
            len: (raw >> shape.length_shift) as usize,
        }
    }

    pub fn byte_len(&self) -> usize {
        if self.wide {
            self.len * 2
        } else {
            self.len
        }
    }
}

/// Pool header fields at `address`
#[derive(Debug, Clone, Copy)]
pub struct PoolHeader {
    pub lock: u64,
    pub current_block: u32,
    pub cursor: u32,
    pub block0: usize,
}

impl PoolHeader {
    pub fn parse(bytes: &[u8]) -> Self {
        Self {
            lock: LE::read_u64(&bytes[0..8]),
            current_block: LE::read_u32(&bytes[8..12]),
            cursor: LE::read_u32(&bytes[12..16]),
            block0: LE::read_u64(&bytes[16..24]) as usize,
        }
    }

    /// Cheap plausibility test before any dereference
    pub fn is_plausible(&self, bounds: &SanityBounds) -> bool {
        self.lock <= MAX_LOCK_VALUE
            && self.current_block <= bounds.name_pool_max_blocks
            && self.cursor != 0
            && self.cursor <= bounds.name_pool_max_cursor
            && self.block0 != 0
            && self.block0 % 2 == 0
    }
}

/// Validate a candidate pool and measure its entries
pub fn detect(probe: &MemoryProbe, address: usize, bounds: &SanityBounds) -> Option<PoolShape> {
    let header = PoolHeader::parse(&probe.read_bytes(address, 0x18)?);
    if !header.is_plausible(bounds) || !probe.is_readable(header.block0) {
        return None;
    }

    let block = probe.read_bytes(header.block0, 0x40)?;
    let header_size = block[..0x14]
        .windows(NONE.len())
        .position(|w| w == NONE)
        .filter(|&p| p >= 2)?;

    let stride = if header_size == 2 { 2 } else { 4 };
    let second = (header_size + NONE.len()).next_multiple_of(stride);
    let mut raw = LE::read_u16(&block[second + header_size - 2..second + header_size]);

    let mut length_shift = 0;
    while raw != SECOND_ENTRY_LENGTH {
        if raw == 0 || length_shift >= 16 {
            return None;
        }
        raw >>= 1;
        length_shift += 1;
    }

    Some(PoolShape {
        header_size,
        stride,
        length_shift,
        block_offset_bits: DEFAULT_BLOCK_OFFSET_BITS,
    })
}

pub fn entry_address(
    probe: &MemoryProbe,
    pool: usize,
    shape: &PoolShape,
    index: u32,
) -> Option<usize> {
    let (block, offset) = shape.split(index);
    let block = probe
        .read_ptr(pool + BLOCKS_OFFSET + block * crate::POINTER_SIZE)
        .filter(|&b| b != 0)?;
    Some(block + offset)
}

pub fn read_header(probe: &MemoryProbe, entry: usize, shape: &PoolShape) -> Option<EntryHeader> {
    let raw = probe.read_u16(entry + shape.header_size - 2)?;
    Some(EntryHeader::parse(raw, shape))
}

pub fn read_entry(probe: &MemoryProbe, entry: usize, shape: &PoolShape) -> Option<String> {
    let header = read_header(probe, entry, shape)?;
    if header.len == 0 {
        return None;
    }
    let bytes = probe.read_bytes(entry + shape.header_size, header.byte_len())?;
    Some(decode(&bytes, header.wide))
}

/// Target (ComparisonIndex, Number) of an outlined numbered entry
pub fn read_numbered(probe: &MemoryProbe, entry: usize, shape: &PoolShape) -> Option<(u32, u32)> {
    let header = read_header(probe, entry, shape)?;
    if header.len != 0 {
        return None;
    }
    let data = probe.read_bytes(entry + shape.header_size, 8)?;
    Some((LE::read_u32(&data[0..4]), LE::read_u32(&data[4..8])))
}

fn decode(bytes: &[u8], wide: bool) -> String {
    if wide {
        let chars: Vec<u16> = bytes.chunks_exact(2).map(LE::read_u16).collect();
        String::from_utf16_lossy(&chars)
    } else {
        String::from_utf8_lossy(bytes).to_string()
    }
}

/// Visit `(index, name)` for every entry until `visit` returns false.
///
/// Walks blocks up to CurrentBlock; the last block is read up to the cursor.
pub fn walk(
    probe: &MemoryProbe,
    pool: usize,
    shape: &PoolShape,
    mut visit: impl FnMut(u32, &str) -> bool,
) {
    let Some(header) = probe.read_bytes(pool, 0x18).map(|b| PoolHeader::parse(&b)) else {
        return;
    };

    for block in 0..=header.current_block as usize {
        let Some(block_address) = probe
            .read_ptr(pool + BLOCKS_OFFSET + block * crate::POINTER_SIZE)
            .filter(|&b| b != 0)
        else {
            continue;
        };

        let len = if block == header.current_block as usize {
            header.cursor as usize
        } else {
            shape.block_size()
        };
        let Some(data) = probe.read_bytes(block_address, len) else {
            tracing::debug!("Name block {} at {:#x} unreadable", block, block_address);
            continue;
        };

        let mut offset = 0;
        while offset + shape.header_size <= data.len() {
            let raw = LE::read_u16(&data[offset + shape.header_size - 2..]);
            let entry = EntryHeader::parse(raw, shape);
            let start = offset + shape.header_size;

            // zero-length headers are padding at the end of a block
            if entry.len == 0 || start + entry.byte_len() > data.len() {
                break;
            }

            let name = decode(&data[start..start + entry.byte_len()], entry.wide);
            if !visit(shape.index_of(block, offset), &name) {
                return;
            }

            offset = (start + entry.byte_len()).next_multiple_of(shape.stride);
        }
    }
}
