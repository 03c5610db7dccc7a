//! Known shapes of the global object array
//!
//! Older engines use a single flat allocation; newer ones a chunked one.
//! Some builds reorder the chunked header, so every known ordering is
//! tried in turn.

use serde::{Deserialize, Serialize};

/// Name of a known object array shape, usable in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectLayoutKind {
    Flat,
    /// Objects pointer first, counts at 0x10
    Chunked,
    /// Counts first, objects pointer at 0x10
    ChunkedHeaderLast,
    /// NumElements first
    ChunkedCountFirst,
    /// MaxElements first, NumChunks right after
    ChunkedMaxFirst,
}

/// Field offsets within the object array header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectTableLayout {
    Flat {
        objects: usize,
        max: usize,
        num: usize,
    },
    Chunked {
        objects: usize,
        max_elements: usize,
        num_elements: usize,
        max_chunks: usize,
        num_chunks: usize,
    },
}

impl ObjectLayoutKind {
    /// Every shape in the order candidates are tested
    pub const ALL: [ObjectLayoutKind; 5] = [
        ObjectLayoutKind::Flat,
        ObjectLayoutKind::Chunked,
        ObjectLayoutKind::ChunkedHeaderLast,
        ObjectLayoutKind::ChunkedCountFirst,
        ObjectLayoutKind::ChunkedMaxFirst,
    ];

    pub fn layout(self) -> ObjectTableLayout {
        match self {
            ObjectLayoutKind::Flat => ObjectTableLayout::Flat {
                objects: 0x0,
                max: 0x8,
                num: 0xC,
            },
            ObjectLayoutKind::Chunked => ObjectTableLayout::Chunked {
                objects: 0x00,
                max_elements: 0x10,
                num_elements: 0x14,
                max_chunks: 0x18,
                num_chunks: 0x1C,
            },
            ObjectLayoutKind::ChunkedHeaderLast => ObjectTableLayout::Chunked {
                objects: 0x10,
                max_elements: 0x00,
                num_elements: 0x04,
                max_chunks: 0x08,
                num_chunks: 0x0C,
            },
            ObjectLayoutKind::ChunkedCountFirst => ObjectTableLayout::Chunked {
                objects: 0x18,
                max_elements: 0x10,
                num_elements: 0x00,
                max_chunks: 0x14,
                num_chunks: 0x20,
            },
            ObjectLayoutKind::ChunkedMaxFirst => ObjectTableLayout::Chunked {
                objects: 0x18,
                max_elements: 0x00,
                num_elements: 0x14,
                max_chunks: 0x10,
                num_chunks: 0x04,
            },
        }
    }
}

impl ObjectTableLayout {
    pub fn is_chunked(&self) -> bool {
        matches!(self, ObjectTableLayout::Chunked { .. })
    }

    pub fn objects_offset(&self) -> usize {
        match *self {
            ObjectTableLayout::Flat { objects, .. }
            | ObjectTableLayout::Chunked { objects, .. } => objects,
        }
    }

    pub fn num_offset(&self) -> usize {
        match *self {
            ObjectTableLayout::Flat { num, .. } => num,
            ObjectTableLayout::Chunked { num_elements, .. } => num_elements,
        }
    }

    pub fn max_offset(&self) -> usize {
        match *self {
            ObjectTableLayout::Flat { max, .. } => max,
            ObjectTableLayout::Chunked { max_elements, .. } => max_elements,
        }
    }

    /// Bytes of header the validators read
    pub fn header_size(&self) -> usize {
        match *self {
            ObjectTableLayout::Flat { objects, max, num } => {
                (objects + crate::POINTER_SIZE).max(max + 4).max(num + 4)
            }
            ObjectTableLayout::Chunked {
                objects,
                max_elements,
                num_elements,
                max_chunks,
                num_chunks,
            } => (objects + crate::POINTER_SIZE)
                .max(max_elements + 4)
                .max(num_elements + 4)
                .max(max_chunks + 4)
                .max(num_chunks + 4),
        }
    }
}
