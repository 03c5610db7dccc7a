//! The global name table
//!
//! Two historical shapes exist: a chunked array of entry pointers and the
//! block-based name pool. [`locate`] finds and measures either one;
//! [`NameTable`] resolves comparison indices to strings.

pub mod array;
mod locate;
pub mod pool;

pub use locate::locate;

use crate::probe::MemoryProbe;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a name table shape, usable in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameLayoutKind {
    Array,
    Pool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameTableLayout {
    Array(array::ArrayShape),
    Pool(pool::PoolShape),
}

impl NameTableLayout {
    pub fn kind(&self) -> NameLayoutKind {
        match self {
            NameTableLayout::Array(_) => NameLayoutKind::Array,
            NameTableLayout::Pool(_) => NameLayoutKind::Pool,
        }
    }
}

/// An FName as stored in an object: index into the name table plus instance number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FName {
    pub comparison_index: u32,
    pub number: u32,
}

impl FName {
    pub fn new(comparison_index: u32, number: u32) -> Self {
        Self {
            comparison_index,
            number,
        }
    }
}

/// Display form of a name with its instance number
pub fn format_name(name: &str, number: u32) -> String {
    if number > 0 {
        format!("{}_{}", name, number - 1)
    } else {
        name.to_string()
    }
}

/// A located name table
#[derive(Debug, Clone)]
pub struct NameTable {
    probe: MemoryProbe,
    /// Address of the global
    pub address: usize,
    pub layout: NameTableLayout,
}

impl NameTable {
    pub fn new(probe: MemoryProbe, address: usize, layout: NameTableLayout) -> Self {
        Self {
            probe,
            address,
            layout,
        }
    }

    /// Where the entries are indexed from: the global itself for pools,
    /// the array it points at otherwise
    fn base(&self) -> Option<usize> {
        match self.layout {
            NameTableLayout::Array(_) => self.probe.read_ptr(self.address).filter(|&p| p != 0),
            NameTableLayout::Pool(_) => Some(self.address),
        }
    }

    pub fn entry_address(&self, comparison_index: u32) -> Option<usize> {
        let base = self.base()?;
        match &self.layout {
            NameTableLayout::Array(_) => array::entry_address(&self.probe, base, comparison_index),
            NameTableLayout::Pool(shape) => {
                pool::entry_address(&self.probe, base, shape, comparison_index)
            }
        }
    }

    /// String of the entry at `comparison_index`
    pub fn resolve(&self, comparison_index: u32) -> Option<String> {
        let entry = self.entry_address(comparison_index)?;
        match &self.layout {
            NameTableLayout::Array(shape) => array::read_entry(&self.probe, entry, shape),
            NameTableLayout::Pool(shape) => pool::read_entry(&self.probe, entry, shape)
                .or_else(|| {
                    let (target, _) = pool::read_numbered(&self.probe, entry, shape)?;
                    if target == comparison_index {
                        return None;
                    }
                    let entry = pool::entry_address(&self.probe, self.address, shape, target)?;
                    pool::read_entry(&self.probe, entry, shape)
                }),
        }
    }

    /// Number stored in an outlined numbered entry, if `comparison_index` is one
    pub fn outline_number(&self, comparison_index: u32) -> Option<u32> {
        let NameTableLayout::Pool(shape) = &self.layout else {
            return None;
        };
        let entry = self.entry_address(comparison_index)?;
        pool::read_numbered(&self.probe, entry, shape).map(|(_, number)| number)
    }

    /// Display string of `name`, with `_N` appended for numbered instances
    pub fn display(&self, name: FName) -> Option<String> {
        Some(format_name(&self.resolve(name.comparison_index)?, name.number))
    }

    /// Comparison index of the first entry named `target`
    pub fn search(&self, target: &str) -> Option<u32> {
        match &self.layout {
            NameTableLayout::Pool(shape) => {
                let mut found = None;
                pool::walk(&self.probe, self.address, shape, |index, name| {
                    if name == target {
                        found = Some(index);
                    }
                    found.is_none()
                });
                found
            }
            NameTableLayout::Array(shape) => {
                let base = self.base()?;
                let num = self
                    .probe
                    .read_i32(base + shape.num_elements_offset)
                    .filter(|&n| n > 0)? as u32;
                (0..num).find(|&index| {
                    array::entry_address(&self.probe, base, index)
                        .and_then(|entry| array::read_entry(&self.probe, entry, shape))
                        .is_some_and(|name| name == target)
                })
            }
        }
    }
}

impl fmt::Display for NameLayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameLayoutKind::Array => write!(f, "name array"),
            NameLayoutKind::Pool => write!(f, "name pool"),
        }
    }
}
