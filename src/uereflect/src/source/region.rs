//! Mapped address ranges and their protection

use bitflags::bitflags;

bitflags! {
    /// Page protection of a mapping
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Protection: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

impl Protection {
    /// Parse the `rwxp` column of /proc/pid/maps; anything but the
    /// expected letter in a slot leaves that bit clear
    pub fn from_perms(perms: &str) -> Self {
        let slots = [
            (b'r', Protection::READ),
            (b'w', Protection::WRITE),
            (b'x', Protection::EXECUTE),
        ];
        perms
            .bytes()
            .zip(slots)
            .filter(|(found, (expected, _))| found == expected)
            .fold(Protection::empty(), |acc, (_, (_, flag))| acc | flag)
    }
}

/// A mapped range `[start, end)` of the target's address space
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    pub start: usize,
    pub end: usize,
    pub protection: Protection,
    /// Where the range's bytes live in the backing file (dumps only)
    pub offset: usize,
    pub path: Option<String>,
}

impl MemoryRegion {
    pub fn new(start: usize, end: usize, perms: &str) -> Self {
        Self {
            start,
            end,
            protection: Protection::from_perms(perms),
            offset: 0,
            path: None,
        }
    }

    /// Region captured in a dump at `offset`; dumps carry no protection, so
    /// everything is treated as readable data
    pub fn captured(start: usize, end: usize, offset: usize) -> Self {
        Self {
            offset,
            ..Self::new(start, end, "rw-p")
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, address: usize) -> bool {
        (self.start..self.end).contains(&address)
    }

    pub fn is_readable(&self) -> bool {
        self.protection.contains(Protection::READ)
    }

    pub fn is_writable(&self) -> bool {
        self.protection.contains(Protection::WRITE)
    }
}
