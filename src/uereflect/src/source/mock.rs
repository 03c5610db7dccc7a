//! In-memory source for tests
//!
//! One contiguous buffer mapped at `base`. Regions default to a single
//! read-write mapping of the whole buffer; tests that care about
//! permissions (unreadable gaps, code sections) pass their own.

use super::{MemoryRegion, MemorySource};
use anyhow::{anyhow, Result};

pub struct MockMemorySource {
    data: Vec<u8>,
    base: usize,
    regions: Vec<MemoryRegion>,
}

impl MockMemorySource {
    pub fn new(data: Vec<u8>, base: usize) -> Self {
        let regions = vec![MemoryRegion::new(base, base + data.len(), "rw-p")];
        Self::with_regions(data, base, regions)
    }

    pub fn with_regions(data: Vec<u8>, base: usize, regions: Vec<MemoryRegion>) -> Self {
        Self { data, base, regions }
    }
}

impl MemorySource for MockMemorySource {
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>> {
        address
            .checked_sub(self.base)
            .and_then(|start| Some(start..start.checked_add(size)?))
            .and_then(|range| self.data.get(range))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                anyhow!("{:#x} bytes at {:#x} are outside the mock image", size, address)
            })
    }

    fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    fn is_live(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_relative_to_base() {
        let source = MockMemorySource::new(b"None\0ByteProperty\0".to_vec(), 0x7ff6_0000_0000);

        assert_eq!(source.read_cstring(0x7ff6_0000_0000, 16).unwrap(), "None");
        assert_eq!(source.read_cstring(0x7ff6_0000_0005, 16).unwrap(), "ByteProperty");
        assert_eq!(source.read_u32(0x7ff6_0000_0000).unwrap(), u32::from_le_bytes(*b"None"));
    }

    #[test]
    fn test_object_header_fields() {
        // vtable, flags, index as laid out in a UObject
        let mut data = Vec::new();
        data.extend(0x7ff6_1000_2100u64.to_le_bytes());
        data.extend(0x43u32.to_le_bytes());
        data.extend((-1i32).to_le_bytes());
        let source = MockMemorySource::new(data, 0x2000_0000);

        assert_eq!(source.read_ptr(0x2000_0000).unwrap(), 0x7ff6_1000_2100);
        assert_eq!(source.read_u16(0x2000_0008).unwrap(), 0x43);
        assert_eq!(source.read_i32(0x2000_000C).unwrap(), -1);
        assert_eq!(source.read_u8(0x2000_0000).unwrap(), 0x00);
    }

    #[test]
    fn test_reads_outside_the_image_fail() {
        let source = MockMemorySource::new(vec![0; 4], 0x1000);

        assert!(source.read_bytes(0x1002, 10).is_err());
        assert!(source.read_bytes(0x500, 4).is_err());
        assert!(source.read_bytes(0x1000, usize::MAX).is_err());
        assert!(source.read_u64(0x1000).is_err());
    }

    #[test]
    fn test_readability_follows_regions() {
        let source = MockMemorySource::with_regions(
            vec![0; 0x2000],
            0x1000,
            vec![
                MemoryRegion::new(0x1000, 0x2000, "r-xp"),
                MemoryRegion::new(0x2000, 0x3000, "---p"),
            ],
        );

        assert!(source.is_readable(0x1500));
        assert!(!source.is_readable(0x2500));
        assert!(!source.is_readable(0x5000));
        assert_eq!(source.find_region(0x2500).map(|r| r.start), Some(0x2000));
        // backed by data even where the region forbids it
        assert!(source.read_bytes(0x2500, 8).is_ok());
        assert!(!source.is_live());
    }
}
