//! FName layout

use super::Discovery;
use crate::codec::CodecField;
use crate::error::{Error, Result};
use crate::flags::CastFlags;
use crate::offsets::{FieldKey, NameLayout};
use crate::schema::DiscoveredSchema;
use crate::view::{Address, ObjectLookup};

/// Layout implied by the space an FName occupies and whether its first
/// two ints are equal (ComparisonIndex == DisplayIndex). `None` when only
/// the share of numbered names can tell plain from outlined.
fn classify(size: usize, first_ints_equal: bool) -> Option<NameLayout> {
    match size {
        8 if first_ints_equal => Some(NameLayout::CasePreservingOutlineNumber),
        s if s > 8 => Some(NameLayout::CasePreserving),
        4 => Some(NameLayout::OutlineNumber),
        _ => None,
    }
}

fn number_offset(layout: NameLayout, first_ints_equal: bool) -> Option<usize> {
    match layout {
        NameLayout::CasePreserving if !first_ints_equal => Some(4),
        other => other.number_offset(),
    }
}

fn first_ints_equal(schema: &DiscoveredSchema, name: usize) -> Option<bool> {
    let probe = schema.probe();
    Some(probe.read_u32(name)? == probe.read_u32(name + 4)?)
}

/// Objects whose would-be FName::Number is in 1..=4
fn count_small_numbers(schema: &DiscoveredSchema, name_offset: usize) -> usize {
    schema
        .object_table()
        .iter()
        .filter_map(|(_, address)| schema.probe().read_u32(address + name_offset + 4))
        .map(|raw| schema.codec().decode(CodecField::NameNumber, raw as u64))
        .filter(|n| (1..=4).contains(n))
        .count()
}

fn apply(d: &mut Discovery<'_>, layout: NameLayout, number: Option<usize>) {
    tracing::info!("FName layout: {:?} ({:#x} bytes)", layout, layout.size());
    d.schema.traits.name_layout = layout;
    d.settle(FieldKey::FNameComparisonIndex, Some(0), None);
    match number {
        Some(offset) => {
            d.settle(FieldKey::FNameNumber, Some(offset), None);
        }
        None => d.schema.offsets.remove(FieldKey::FNameNumber),
    }
}

/// Size and variant of FName, from the gap between UObject::Name and the
/// field after it
pub(super) fn name_layout(d: &mut Discovery<'_>) -> Result<()> {
    let Some(name) = d.offset(FieldKey::ObjectName) else {
        return Err(Error::not_found("UObject::Name"));
    };

    let (layout, equal) = {
        let s = &*d.schema;
        let size = [
            FieldKey::ObjectVft,
            FieldKey::ObjectFlags,
            FieldKey::ObjectIndex,
            FieldKey::ObjectClass,
            FieldKey::ObjectOuter,
        ]
        .into_iter()
        .filter_map(|key| s.offsets().get(key))
        .filter(|&offset| offset > name)
        .min()
        .map_or(8, |next| next - name);

        let first = s
            .object_table()
            .iter()
            .next()
            .map(|(_, address)| address)
            .ok_or_else(|| Error::Fatal("object array holds no objects".into()))?;
        let equal = first_ints_equal(s, first + name).unwrap_or(false);

        let layout = classify(size, equal).unwrap_or_else(|| {
            let threshold = (s.object_table().num() as f64
                * s.config().heuristics.outline_number_ratio) as usize;
            if count_small_numbers(s, name) < threshold {
                NameLayout::OutlineNumber
            } else {
                NameLayout::Plain
            }
        });
        (layout, equal)
    };

    apply(d, layout, number_offset(layout, equal));
    Ok(())
}

/// Cross-check the FName size against a known FNameProperty. Small games
/// have too few numbered names for the statistic in [`name_layout`].
pub(super) fn verify_layout(d: &mut Discovery<'_>) -> Result<()> {
    let Some(name) = d.offset(FieldKey::ObjectName) else {
        return Ok(());
    };

    let (size, equal) = {
        let s = &*d.schema;
        let Some(player_start) = s.find_class("PlayerStart") else {
            return Err(Error::not_found("class PlayerStart"));
        };
        let size = player_start
            .find_member("PlayerStartTag", CastFlags::empty())
            .and_then(|p| p.element_size())
            .filter(|&size| size > 0)
            .ok_or_else(|| Error::not_found("PlayerStart::PlayerStartTag"))? as usize;
        let equal = first_ints_equal(s, player_start.address() + name).unwrap_or(false);
        (size, equal)
    };

    let old = d.schema.traits.name_layout.size();
    if size == old {
        return Ok(());
    }

    let layout = classify(size, equal).unwrap_or(NameLayout::Plain);
    tracing::warn!(
        "FName is {:#x} bytes, not {:#x}; switching to {:?}",
        size,
        old,
        layout
    );

    if let Some(flags) = d.offset(FieldKey::FFieldFlags) {
        d.adjust(FieldKey::FFieldFlags, flags - old + layout.size());
    }
    apply(d, layout, number_offset(layout, equal));
    Ok(())
}
