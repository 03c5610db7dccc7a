//! Brute-force search for the global object array

use super::layout::{ObjectLayoutKind, ObjectTableLayout};
use super::ObjectTable;
use crate::codec::{CodecField, DecodeTable};
use crate::config::{DiscoveryConfig, SanityBounds};
use crate::error::{Error, Result};
use crate::probe::{MemoryProbe, Module};

use byteorder::{ByteOrder, LE};

/// Item stride assumed while validating flat candidates: object pointer plus 16 bytes
const FLAT_VALIDATION_ITEM_SIZE: usize = 24;
const CHUNKED_ITEM_SIZE: usize = 16;
/// Slot whose object must report its own index
const ANCHOR_SLOT: usize = 5;

/// Shape predicates for object array candidates
pub(crate) struct Validator<'a> {
    pub probe: &'a MemoryProbe,
    pub codec: &'a DecodeTable,
    pub bounds: &'a SanityBounds,
}

fn field_i32(header: &[u8], offset: usize) -> i32 {
    LE::read_i32(&header[offset..offset + 4])
}

fn field_ptr(header: &[u8], offset: usize) -> usize {
    LE::read_u64(&header[offset..offset + 8]) as usize
}

impl Validator<'_> {
    /// Test `header` (the bytes at `address`) against one layout
    pub fn check(&self, address: usize, header: &[u8], layout: ObjectTableLayout) -> bool {
        if header.len() < layout.header_size() {
            return false;
        }
        match layout {
            ObjectTableLayout::Flat { objects, max, num } => {
                self.check_flat(address, header, objects, max, num)
            }
            ObjectTableLayout::Chunked { .. } => self.check_chunked(header, layout),
        }
    }

    fn check_flat(
        &self,
        address: usize,
        header: &[u8],
        objects: usize,
        max: usize,
        num: usize,
    ) -> bool {
        let raw = field_ptr(header, objects);
        let max_elements = field_i32(header, max);
        let num_elements = field_i32(header, num);

        if num_elements > max_elements
            || max_elements > self.bounds.flat_max_max
            || num_elements < self.bounds.flat_min_num
        {
            return false;
        }

        let base = self.codec.decode_ptr(CodecField::ObjectTableBase, raw);
        if !self.probe.is_readable(base) {
            return false;
        }

        let Some(anchor) = self
            .probe
            .read_ptr(base + ANCHOR_SLOT * FLAT_VALIDATION_ITEM_SIZE)
            .filter(|&p| self.probe.is_readable(p))
        else {
            return false;
        };

        let index = self.probe.read_i32(anchor + self.bounds.flat_index_probe);
        if index != Some(ANCHOR_SLOT as i32) {
            tracing::debug!(
                "Flat candidate {:#x}: slot {} reports index {:?}",
                address,
                ANCHOR_SLOT,
                index
            );
            return false;
        }

        true
    }

    fn check_chunked(&self, header: &[u8], layout: ObjectTableLayout) -> bool {
        let ObjectTableLayout::Chunked {
            objects,
            max_elements,
            num_elements,
            max_chunks,
            num_chunks,
        } = layout
        else {
            return false;
        };

        let b = self.bounds;
        let raw = field_ptr(header, objects);
        let max_elements = field_i32(header, max_elements);
        let num_elements = field_i32(header, num_elements);
        let max_chunks = field_i32(header, max_chunks);
        let num_chunks = field_i32(header, num_chunks);

        if !(b.chunked_min_num_chunks..=b.chunked_max_num_chunks).contains(&num_chunks)
            || !(b.chunked_min_max_chunks..=b.chunked_max_max_chunks).contains(&max_chunks)
        {
            return false;
        }

        if num_elements <= b.chunked_min_num_elements
            || max_elements <= b.chunked_min_max_elements
        {
            return false;
        }

        if num_elements > max_elements || num_chunks > max_chunks || max_elements % 0x10 != 0 {
            return false;
        }

        // configured bounds may admit zero chunk counts
        let Some(per_chunk) = max_elements.checked_div(max_chunks) else {
            return false;
        };
        if per_chunk % 0x10 != 0
            || !(b.chunked_min_per_chunk..=b.chunked_max_per_chunk).contains(&per_chunk)
        {
            return false;
        }

        if max_elements.checked_rem(per_chunk) != Some(0)
            || max_elements / per_chunk != max_chunks
            || num_elements / per_chunk + 1 != num_chunks
        {
            return false;
        }

        let chunks = self.codec.decode_ptr(CodecField::ObjectTableBase, raw);
        if !self.probe.is_readable(chunks) {
            return false;
        }

        (0..num_chunks as usize).all(|i| {
            self.probe
                .read_ptr(chunks + i * crate::POINTER_SIZE)
                .is_some_and(|chunk| self.probe.is_readable(chunk))
        })
    }

    /// First layout `header` satisfies
    fn matching_kind(&self, address: usize, header: &[u8]) -> Option<ObjectLayoutKind> {
        ObjectLayoutKind::ALL
            .into_iter()
            .find(|kind| self.check(address, header, kind.layout()))
    }
}

/// Offset and stride of the object pointer inside an array item.
///
/// The offset is the first 4-aligned slot of item 0 holding a readable
/// pointer; the stride is the smallest step at which items 1 and 2 both hold
/// dereferenceable pointers.
pub(crate) fn detect_item_layout(probe: &MemoryProbe, first_item: usize) -> Option<(usize, usize)> {
    let offset = (0..0x20)
        .step_by(4)
        .find(|&i| probe.read_valid_ptr(first_item + i).is_some())?;

    let dereferences = |address: usize| {
        probe
            .read_valid_ptr(address)
            .and_then(|object| probe.read_valid_ptr(object))
            .is_some()
    };

    (offset + crate::POINTER_SIZE..=0x38)
        .step_by(4)
        .find(|&i| dereferences(first_item + i) && dereferences(first_item + i * 2 - offset))
        .map(|i| (offset, i - offset))
}

fn build_table(
    probe: &MemoryProbe,
    codec: &DecodeTable,
    address: usize,
    kind: ObjectLayoutKind,
) -> ObjectTable {
    let layout = kind.layout();
    let raw = probe.read_ptr(address + layout.objects_offset()).unwrap_or(0);
    let objects = codec.decode_ptr(CodecField::ObjectTableBase, raw);

    let (first_item, fallback, elements_per_chunk) = match layout {
        ObjectTableLayout::Flat { .. } => (objects, FLAT_VALIDATION_ITEM_SIZE, None),
        ObjectTableLayout::Chunked {
            max_elements,
            max_chunks,
            ..
        } => {
            let max = probe.read_i32(address + max_elements).unwrap_or(0);
            let chunks = probe.read_i32(address + max_chunks).unwrap_or(1).max(1);
            let first_chunk = probe.read_ptr(objects).unwrap_or(0);
            (first_chunk, CHUNKED_ITEM_SIZE, Some((max / chunks) as usize))
        }
    };

    let (item_offset, item_size) = detect_item_layout(probe, first_item).unwrap_or_else(|| {
        tracing::warn!(
            "Could not measure object array items, assuming {} byte items",
            fallback
        );
        (0, fallback)
    });

    ObjectTable {
        probe: probe.clone(),
        codec: codec.clone(),
        address,
        kind,
        layout,
        item_offset,
        item_size,
        elements_per_chunk,
    }
}

/// Scan the readable parts of `[start, start + len)` at `step` alignment for
/// the first valid candidate
fn scan(
    validator: &Validator<'_>,
    start: usize,
    len: usize,
    step: usize,
) -> Option<(usize, ObjectLayoutKind)> {
    let window = ObjectLayoutKind::ALL
        .iter()
        .map(|k| k.layout().header_size())
        .max()
        .unwrap_or(0);
    let step = step.max(1);

    let mut hit = None;
    validator.probe.for_each_readable(start, len, |base, data| {
        let Some(last) = data.len().checked_sub(window) else {
            return true;
        };
        // stay on the grid anchored at `start`
        let first = (step - (base - start) % step) % step;
        hit = (first..=last).step_by(step).find_map(|i| {
            validator
                .matching_kind(base + i, &data[i..i + window])
                .map(|kind| (base + i, kind))
        });
        hit.is_none()
    });
    hit
}

/// Locate the object array: override, then `.data`, then every section.
pub fn locate(
    probe: &MemoryProbe,
    codec: &DecodeTable,
    module: &Module,
    config: &DiscoveryConfig,
) -> Result<ObjectTable> {
    let validator = Validator {
        probe,
        codec,
        bounds: &config.bounds,
    };

    if let Some(table) = config.overrides.object_table {
        let layout = table.layout.layout();
        let valid = probe
            .read_bytes(table.address, layout.header_size())
            .is_some_and(|header| validator.check(table.address, &header, layout));
        if !valid {
            tracing::warn!(
                "Configured object array at {:#x} failed validation, using it anyway",
                table.address
            );
        }
        return Ok(build_table(probe, codec, table.address, table.layout));
    }

    let step = config.bounds.scan_step;
    let data = module.data_section();

    if let Some(section) = data {
        tracing::debug!("Scanning {} for the object array", section.name);
        if let Some((address, kind)) = scan(&validator, section.base, section.size, step) {
            return Ok(found(probe, codec, module, address, kind));
        }
    }

    tracing::warn!("Object array not in .data, scanning the whole module");
    for section in &module.sections {
        if data.is_some_and(|d| d.base == section.base) {
            continue;
        }
        if let Some((address, kind)) = scan(&validator, section.base, section.size, step) {
            return Ok(found(probe, codec, module, address, kind));
        }
    }

    Err(Error::Fatal(format!(
        "object array not found in module at {:#x}",
        module.base
    )))
}

fn found(
    probe: &MemoryProbe,
    codec: &DecodeTable,
    module: &Module,
    address: usize,
    kind: ObjectLayoutKind,
) -> ObjectTable {
    let table = build_table(probe, codec, address, kind);
    tracing::info!(
        "Found {:?} object array at {:#x} (module + {:#x}), {} objects, {} byte items",
        kind,
        address,
        address.wrapping_sub(module.base),
        table.num(),
        table.item_size
    );
    table
}
