//! The raw read boundary
//!
//! Everything above this trait works with `Option`s; only implementations
//! and their direct callers see the underlying errors.

use super::MemoryRegion;
use anyhow::{bail, Result};

/// Read access to a target address space (live process, dump file, ...)
pub trait MemorySource: Send + Sync {
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>>;

    /// Mapped regions of the target
    fn regions(&self) -> &[MemoryRegion];

    /// Whether contents may change between two reads
    fn is_live(&self) -> bool;

    fn read_u8(&self, address: usize) -> Result<u8> {
        let bytes = self.read_bytes(address, 1)?;
        bytes.first().copied().ok_or_else(|| anyhow::anyhow!("Empty read at {:#x}", address))
    }

    fn read_u16(&self, address: usize) -> Result<u16> {
        let bytes = self.read_bytes(address, 2)?;
        Ok(u16::from_le_bytes(fixed(&bytes, address)?))
    }

    fn read_u32(&self, address: usize) -> Result<u32> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(u32::from_le_bytes(fixed(&bytes, address)?))
    }

    fn read_i32(&self, address: usize) -> Result<i32> {
        self.read_u32(address).map(|v| v as i32)
    }

    fn read_u64(&self, address: usize) -> Result<u64> {
        let bytes = self.read_bytes(address, 8)?;
        Ok(u64::from_le_bytes(fixed(&bytes, address)?))
    }

    /// Raw pointer value; no decoding and no validity check
    fn read_ptr(&self, address: usize) -> Result<usize> {
        self.read_u64(address).map(|v| v as usize)
    }

    /// NUL-terminated narrow string, at most `max_len` bytes
    fn read_cstring(&self, address: usize, max_len: usize) -> Result<String> {
        let bytes = self.read_bytes(address, max_len)?;
        let end = memchr::memchr(0, &bytes).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    fn find_region(&self, address: usize) -> Option<&MemoryRegion> {
        self.regions().iter().find(|r| r.contains(address))
    }

    /// Region-permission check; never touches the memory itself
    fn is_readable(&self, address: usize) -> bool {
        self.find_region(address).is_some_and(|r| r.is_readable())
    }
}

fn fixed<const N: usize>(bytes: &[u8], address: usize) -> Result<[u8; N]> {
    match <[u8; N]>::try_from(bytes) {
        Ok(array) => Ok(array),
        Err(_) => bail!("Short read at {:#x}: {} of {} bytes", address, bytes.len(), N),
    }
}
