//! UObject identity fields: flags, index, class, outer and name

use super::{find_offset, valid_pointer_offset, Discovery, PointerCheck, Window};
use crate::codec::CodecField;
use crate::error::{Error, Result};
use crate::offsets::FieldKey;
use crate::schema::DiscoveredSchema;
use crate::POINTER_SIZE;

/// Objects can't be assumed to extend past this without knowing their size
const MAX_NAME_PROBE: usize = 0x44;
const PAGE_SIZE: usize = 0x1000;

/// Addresses of the first `count` populated slots
fn first_objects(schema: &DiscoveredSchema, count: usize) -> Vec<usize> {
    schema
        .object_table()
        .iter()
        .map(|(_, address)| address)
        .take(count)
        .collect()
}

fn read_flags(schema: &DiscoveredSchema, address: usize) -> Option<u32> {
    let raw = schema.probe().read_u32(address)?;
    Some(schema.codec().decode(CodecField::ObjectFlags, raw as u64) as u32)
}

pub(super) fn read_name_index(schema: &DiscoveredSchema, address: usize) -> Option<u32> {
    let raw = schema.probe().read_u32(address)?;
    Some(schema.codec().decode(CodecField::NameComparisonIndex, raw as u64) as u32)
}

/// UObject::Flags: the offset at which a common flag value shows up in
/// most of the first objects
pub(super) fn object_flags(d: &mut Discovery<'_>) -> Result<()> {
    let found = {
        let s = &*d.schema;
        let h = &s.config().heuristics;
        let objects = first_objects(s, h.common_flag_samples);
        if objects.is_empty() {
            return Err(Error::Fatal("object array holds no objects".into()));
        }

        let mut found = None;
        'seeds: for &seed in objects.iter().take(h.common_flag_seeds) {
            let mut start = POINTER_SIZE;
            while let Some(offset) = find_offset(
                &[(seed, h.common_flag_value)],
                Window::new(start, 0x40, 4),
                |a| read_flags(s, a),
            ) {
                let count = objects
                    .iter()
                    .filter(|&&o| read_flags(s, o + offset) == Some(h.common_flag_value))
                    .count();
                if count > h.common_flag_threshold {
                    found = Some(offset);
                    break 'seeds;
                }
                start = offset + 4;
            }
        }
        found
    };

    d.settle(FieldKey::ObjectVft, Some(0), None);
    d.settle(FieldKey::ObjectFlags, found, Some(POINTER_SIZE));
    Ok(())
}

/// UObject::InternalIndex: the slot number stored in the object
pub(super) fn object_index(d: &mut Discovery<'_>) -> Result<()> {
    let found = {
        let s = &*d.schema;
        let h = &s.config().heuristics;
        let table = s.object_table();
        let num = table.num();

        let mut slots: Vec<usize> = h
            .index_anchor_slots
            .iter()
            .copied()
            .filter(|&slot| slot < num)
            .collect();
        if slots.len() < 2 {
            for extra in [5, num.saturating_sub(1)] {
                if extra < num && !slots.contains(&extra) {
                    slots.push(extra);
                }
            }
        }

        let samples: Vec<(usize, i32)> = slots
            .iter()
            .filter_map(|&slot| Some((table.get_by_index(slot)?, slot as i32)))
            .collect();
        if samples.is_empty() {
            return Err(Error::Fatal("no populated slot to anchor UObject::InternalIndex".into()));
        }

        find_offset(&samples, Window::new(POINTER_SIZE, h.find_offset_max, 4), |a| {
            s.probe().read_i32(a)
        })
    };

    let default = d.offset(FieldKey::ObjectFlags).map(|f| f + 4);
    d.settle(FieldKey::ObjectIndex, found, default);
    Ok(())
}

/// Whether following the pointer at `offset` from `start` ends on an
/// object that points at itself (the `Class` class)
fn reaches_fixed_point(schema: &DiscoveredSchema, start: usize, offset: usize) -> bool {
    let probe = schema.probe();
    let mut current = start;
    for _ in 0..0x10 {
        let Some(raw) = probe.read_ptr(current + offset) else {
            return false;
        };
        let next = schema.codec().decode_ptr(CodecField::ObjectClass, raw);
        if next == 0 || !probe.is_readable(next) {
            return false;
        }
        if next == current {
            return true;
        }
        current = next;
    }
    false
}

/// Two objects far enough apart to not share every field by accident
fn object_pair(schema: &DiscoveredSchema) -> Option<(usize, usize)> {
    let table = schema.object_table();
    let num = table.num();
    let a = table.get_by_index(1.min(num.saturating_sub(1)))?;
    let b = table.get_by_index(num / 2)?;
    Some((a, b))
}

/// UObject::Class: a pointer chain that ends in a self-referencing class
pub(super) fn object_class(d: &mut Discovery<'_>) -> Result<()> {
    let index = d.offset(FieldKey::ObjectIndex).unwrap_or(0xC);
    let found = {
        let s = &*d.schema;
        object_pair(s).and_then(|(a, b)| {
            let mut start = index + 4;
            loop {
                let check = PointerCheck::Object;
                let offset =
                    valid_pointer_offset(s, a, b, start, 0x50, check, CodecField::ObjectClass)?;
                if reaches_fixed_point(s, a, offset) && reaches_fixed_point(s, b, offset) {
                    return Some(offset);
                }
                start = offset + POINTER_SIZE;
            }
        })
    };

    d.settle(FieldKey::ObjectClass, found, Some((index + 4).next_multiple_of(POINTER_SIZE)));
    Ok(())
}

/// UObject::Outer: the lowest object pointer other than Class, over a few
/// pairs (packages have no outer, so single pairs can miss)
pub(super) fn object_outer(d: &mut Discovery<'_>) -> Result<()> {
    let class = d.offset(FieldKey::ObjectClass);
    let index = d.offset(FieldKey::ObjectIndex);

    let found = {
        let s = &*d.schema;
        let table = s.object_table();
        let n = table.num().min(0x400);
        let pairs = s.config().heuristics.outer_pairs;

        (0..pairs)
            .filter(|_| n > 0)
            .filter_map(|k| {
                let a = table.get_by_index((k * 7 + 1) % n)?;
                let b = table.get_by_index((k * 13 + 3) % n)?;
                let mut start = POINTER_SIZE;
                loop {
                    let offset = valid_pointer_offset(
                        s,
                        a,
                        b,
                        start,
                        0x50,
                        PointerCheck::Object,
                        CodecField::ObjectOuter,
                    )?;
                    if Some(offset) != class && Some(offset) != index {
                        return Some(offset);
                    }
                    start = offset + POINTER_SIZE;
                }
            })
            .min()
    };

    // settled with its default by the name step when missing
    if found.is_some() {
        d.settle(FieldKey::ObjectOuter, found, None);
    }
    Ok(())
}

/// Thresholds for telling FName comparison indices from other integers
pub(super) struct NameThresholds {
    pub max_value: u32,
    pub small_value: u32,
    pub max_small_count: usize,
    pub min_average: u64,
    pub max_average: u64,
}

impl NameThresholds {
    pub(super) fn from_schema(schema: &DiscoveredSchema) -> Self {
        let h = &schema.config().heuristics;
        Self {
            max_value: h.name_max_value,
            small_value: h.name_small_value,
            max_small_count: h.name_max_small_count,
            min_average: h.name_min_average,
            max_average: h.name_max_average,
        }
    }
}

/// First offset in `candidates` whose values over `items` look like name
/// table indices: all in range, few tiny ones, and a plausible average
pub(super) fn name_statistics(
    schema: &DiscoveredSchema,
    items: &[usize],
    candidates: &[usize],
    thresholds: &NameThresholds,
) -> Option<usize> {
    let items: Vec<usize> = items
        .iter()
        .copied()
        .filter(|&a| (a & (PAGE_SIZE - 1)) <= PAGE_SIZE - MAX_NAME_PROBE)
        .collect();
    if items.is_empty() {
        return None;
    }

    let mut first = None;
    for &offset in candidates {
        let mut total = 0u64;
        let mut small = 0usize;
        let mut in_range = true;
        for &item in &items {
            let Some(value) = read_name_index(schema, item + offset) else {
                in_range = false;
                break;
            };
            total += value as u64;
            in_range &= value < thresholds.max_value;
            small += (value <= thresholds.small_value) as usize;
        }

        let average = total / items.len() as u64;
        let valid = in_range
            && small <= thresholds.max_small_count
            && (thresholds.min_average..=thresholds.max_average).contains(&average);
        if !valid {
            continue;
        }

        match first {
            None => first = Some(offset),
            Some(chosen) => tracing::debug!(
                "Offset {:#x} also looks like a name (keeping {:#x})",
                offset,
                chosen
            ),
        }
    }
    first
}

/// UObject::Name: the integer that behaves like a name index
pub(super) fn object_name(d: &mut Discovery<'_>) -> Result<()> {
    let class = d.offset(FieldKey::ObjectClass);
    let outer = d.offset(FieldKey::ObjectOuter);
    let flags = d.offset(FieldKey::ObjectFlags);
    let index = d.offset(FieldKey::ObjectIndex);

    let found = {
        let s = &*d.schema;
        let excluded = |offset: usize| {
            [Some(0), class, outer]
                .into_iter()
                .flatten()
                .any(|p| offset == p || offset == p + 4)
                || Some(offset) == flags
                || Some(offset) == index
        };
        let candidates: Vec<usize> = (POINTER_SIZE..=0x40)
            .step_by(4)
            .filter(|&o| !excluded(o))
            .collect();
        let items = first_objects(s, s.config().heuristics.name_samples);
        name_statistics(s, &items, &candidates, &NameThresholds::from_schema(s))
    };

    let default = class.map(|c| c + POINTER_SIZE);
    let name = d.settle(FieldKey::ObjectName, found, default).offset();

    if outer.is_none() {
        d.settle(FieldKey::ObjectOuter, None, name.map(|n| n + POINTER_SIZE));
    }
    Ok(())
}
