//! The global object array
//!
//! [`locate`] finds the array and measures its items; [`ObjectTable`]
//! then reads it. The shape is fixed once found, but the element count is
//! re-read on every call since the target keeps allocating.

mod layout;
mod locate;

pub use layout::{ObjectLayoutKind, ObjectTableLayout};
pub use locate::locate;

use crate::codec::{CodecField, DecodeTable};
use crate::probe::MemoryProbe;

/// A located object array
#[derive(Debug, Clone)]
pub struct ObjectTable {
    probe: MemoryProbe,
    codec: DecodeTable,
    /// Address of the array header
    pub address: usize,
    pub kind: ObjectLayoutKind,
    pub layout: ObjectTableLayout,
    /// Offset of the object pointer inside an item
    pub item_offset: usize,
    pub item_size: usize,
    pub elements_per_chunk: Option<usize>,
}

impl ObjectTable {
    /// Live element count. Zero if the header can't be read.
    pub fn num(&self) -> usize {
        self.probe
            .read_i32(self.address + self.layout.num_offset())
            .map_or(0, |n| n.max(0) as usize)
    }

    pub fn max(&self) -> usize {
        self.probe
            .read_i32(self.address + self.layout.max_offset())
            .map_or(0, |n| n.max(0) as usize)
    }

    fn objects(&self) -> Option<usize> {
        let raw = self.probe.read_ptr(self.address + self.layout.objects_offset())?;
        Some(self.codec.decode_ptr(CodecField::ObjectTableBase, raw)).filter(|&p| p != 0)
    }

    /// Address of the item holding slot `index`
    fn item_address(&self, index: usize) -> Option<usize> {
        let objects = self.objects()?;
        match self.elements_per_chunk {
            None => Some(objects + index * self.item_size),
            Some(0) => None,
            Some(per_chunk) => {
                let chunk = self
                    .probe
                    .read_ptr(objects + (index / per_chunk) * crate::POINTER_SIZE)
                    .filter(|&c| c != 0)?;
                Some(chunk + (index % per_chunk) * self.item_size)
            }
        }
    }

    /// Object in slot `index`, or `None` for empty and out-of-range slots
    pub fn get_by_index(&self, index: usize) -> Option<usize> {
        if index >= self.num() {
            return None;
        }
        self.get_unchecked_count(index)
    }

    fn get_unchecked_count(&self, index: usize) -> Option<usize> {
        let item = self.item_address(index)?;
        self.probe
            .read_ptr(item + self.item_offset)
            .filter(|&object| object != 0)
    }

    /// Every populated slot as `(index, address)`.
    ///
    /// The count is read once, so the walk is bounded even while the target grows.
    pub fn iter(&self) -> ObjectIter<'_> {
        ObjectIter {
            table: self,
            index: 0,
            num: self.num(),
        }
    }
}

pub struct ObjectIter<'a> {
    table: &'a ObjectTable,
    index: usize,
    num: usize,
}

impl Iterator for ObjectIter<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.num {
            let index = self.index;
            self.index += 1;
            if let Some(object) = self.table.get_unchecked_count(index) {
                return Some((index, object));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.num - self.index))
    }
}
