//! Dump File Memory Source
//!
//! Reads from Windows minidumps or raw dumps with an accompanying maps file.

use super::process::parse_maps_line;
use super::{MemoryRegion, MemorySource};

use anyhow::{anyhow, bail, Context, Result};
use byteorder::{ByteOrder, LE};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Memory dump file source
pub struct DumpFile {
    mmap: Mmap,
    regions: Vec<MemoryRegion>,
    pub path: PathBuf,
}

impl DumpFile {
    /// "MDMP" in little-endian
    const MDMP_SIGNATURE: u32 = 0x504D444D;
    const MEMORY_64_LIST_STREAM: u32 = 9;

    /// Open a memory dump file
    ///
    /// Minidumps are detected by signature. Anything else is treated as a raw
    /// dump, mapped through `<path>.maps` when present and linearly
    /// (file offset == virtual address) otherwise.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mmap = Self::map(&path)?;

        info!(path = %path.display(), mb = mmap.len() / 1_000_000, "opened dump file");

        if mmap.len() >= 4 && LE::read_u32(&mmap[0..4]) == Self::MDMP_SIGNATURE {
            let regions = Self::parse_mdmp(&mmap)?;
            return Ok(DumpFile { mmap, regions, path });
        }

        let maps_path = path.with_extension("maps");
        let regions = if maps_path.exists() {
            Self::parse_maps_file(&maps_path)?
        } else {
            vec![MemoryRegion::captured(0, mmap.len(), 0)]
        };

        Ok(DumpFile { mmap, regions, path })
    }

    /// Open a raw dump with an explicit maps file
    pub fn open_with_maps<P: AsRef<Path>, Q: AsRef<Path>>(
        dump_path: P,
        maps_path: Q,
    ) -> Result<Self> {
        let path = dump_path.as_ref().to_path_buf();
        let mmap = Self::map(&path)?;
        let regions = Self::parse_maps_file(maps_path.as_ref())?;

        info!(
            path = %path.display(),
            regions = regions.len(),
            "opened dump file with maps"
        );

        Ok(DumpFile { mmap, regions, path })
    }

    fn map(path: &Path) -> Result<Mmap> {
        let file =
            File::open(path).with_context(|| format!("Failed to open dump file: {:?}", path))?;

        // SAFETY: the mapping is read-only and the file is not modified while mapped
        unsafe { Mmap::map(&file) }.with_context(|| format!("Failed to mmap dump file: {:?}", path))
    }

    /// Parse the Memory64List stream of a Windows minidump
    fn parse_mdmp(mmap: &[u8]) -> Result<Vec<MemoryRegion>> {
        if mmap.len() < 32 {
            bail!("MDMP file too small for header");
        }

        let num_streams = LE::read_u32(&mmap[0x08..0x0C]) as usize;
        let stream_dir_rva = LE::read_u32(&mmap[0x0C..0x10]) as usize;

        debug!(num_streams, stream_dir_rva, "minidump header");

        for i in 0..num_streams {
            let entry = stream_dir_rva + i * 12;
            if entry + 12 > mmap.len() {
                break;
            }

            let stream_type = LE::read_u32(&mmap[entry..entry + 4]);
            let rva = LE::read_u32(&mmap[entry + 8..entry + 12]) as usize;

            if stream_type != Self::MEMORY_64_LIST_STREAM {
                continue;
            }

            if rva + 16 > mmap.len() {
                bail!("Memory64ListStream header out of bounds");
            }

            let num_ranges = LE::read_u64(&mmap[rva..rva + 8]) as usize;
            let mut file_offset = LE::read_u64(&mmap[rva + 8..rva + 16]) as usize;
            let mut regions = Vec::with_capacity(num_ranges);

            for j in 0..num_ranges {
                let desc = rva + 16 + j * 16;
                if desc + 16 > mmap.len() {
                    break;
                }

                let start = LE::read_u64(&mmap[desc..desc + 8]) as usize;
                let size = LE::read_u64(&mmap[desc + 8..desc + 16]) as usize;

                regions.push(MemoryRegion::captured(start, start + size, file_offset));
                file_offset += size;
            }

            info!(ranges = regions.len(), "parsed minidump memory ranges");
            return Ok(regions);
        }

        bail!("No Memory64ListStream found in MDMP - dump may be incomplete")
    }

    /// Parse a maps file: either /proc/pid/maps lines or `0xSTART 0xEND SIZE 0xFILE_OFFSET`
    fn parse_maps_file(path: &Path) -> Result<Vec<MemoryRegion>> {
        let file =
            File::open(path).with_context(|| format!("Failed to open maps file: {:?}", path))?;

        let mut regions = Vec::new();

        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();

            if parts[0].starts_with("0x") {
                if parts.len() < 4 {
                    continue;
                }

                let hex = |s: &str| usize::from_str_radix(s.trim_start_matches("0x"), 16).ok();
                if let (Some(start), Some(end), Some(offset)) =
                    (hex(parts[0]), hex(parts[1]), hex(parts[3]))
                {
                    regions.push(MemoryRegion::captured(start, end, offset));
                }
            } else if let Some(region) = parse_maps_line(line) {
                regions.push(region);
            }
        }

        Ok(regions)
    }

    /// File range backing `[va, va + size)`, which must lie inside one region
    fn file_range(&self, va: usize, size: usize) -> Option<std::ops::Range<usize>> {
        let region = self.regions.iter().find(|r| r.contains(va))?;
        if va.checked_add(size)? > region.end {
            return None;
        }
        let offset = region.offset.checked_add(va - region.start)?;
        let end = offset.checked_add(size)?;
        (end <= self.mmap.len()).then_some(offset..end)
    }
}

impl MemorySource for DumpFile {
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>> {
        if !self.regions.iter().any(|r| r.contains(address)) {
            bail!("Address {:#x} out of dump range", address);
        }
        let range = self.file_range(address, size).ok_or_else(|| {
            anyhow!("Read of {} bytes at {:#x} leaves its dumped region", size, address)
        })?;

        Ok(self.mmap[range].to_vec())
    }

    fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    fn is_live(&self) -> bool {
        false
    }
}
