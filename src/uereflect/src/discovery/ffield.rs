//! FField and FFieldClass offsets
//!
//! Only games with FProperty members have these. Anchors are the first
//! entries of `ChildProperties` on structs whose members never change
//! (Guid's A..D, Vector's X..Z).

use super::identity::{name_statistics, NameThresholds};
use super::structs::pointer_reader;
use super::{addr, find_offset, valid_pointer_offset, Discovery, PointerCheck, Window};
use crate::codec::CodecField;
use crate::error::{Error, Result};
use crate::flags::CastFlags;
use crate::offsets::{FieldKey, FieldModel, NameLayout, OwnerEncoding};
use crate::schema::DiscoveredSchema;
use crate::view::{Address, ObjectLookup};
use crate::POINTER_SIZE;

/// First FField of `name`'s ChildProperties
fn first_child(schema: &DiscoveredSchema, name: &str) -> Option<usize> {
    let owner = schema.find_struct(name)?;
    schema.read_ptr(
        owner.address(),
        FieldKey::StructChildProperties,
        CodecField::StructChildProperties,
    )
}

fn name_in(schema: &DiscoveredSchema, address: usize, expected: &[&str]) -> bool {
    schema
        .fname_at(address)
        .and_then(|name| schema.resolve_name(name))
        .is_some_and(|name| expected.contains(&name.as_str()))
}

/// Whether the owner is a tagged pointer: with a separate flag the word
/// after it is a bool, never a pointer
fn owner_is_masked(schema: &DiscoveredSchema, owner: usize) -> bool {
    let fields: Vec<usize> = ["Actor", "ActorComponent", "Pawn"]
        .into_iter()
        .filter_map(|name| first_child(schema, name))
        .collect();
    !fields.is_empty()
        && fields.iter().all(|&field| {
            schema
                .probe()
                .read_ptr(field + owner + POINTER_SIZE)
                .is_some_and(|p| schema.probe().is_readable(p))
        })
}

/// FField layout, then FFieldClass layout behind FField::ClassPrivate
pub(super) fn field_layout(d: &mut Discovery<'_>) -> Result<()> {
    if d.schema.traits.field_model != FieldModel::FProperty {
        tracing::debug!("UProperty members, no FField layout");
        return Ok(());
    }

    let (guid, vector) = {
        let s = &*d.schema;
        (first_child(s, "Guid"), first_child(s, "Vector"))
    };
    let (Some(guid), Some(vector)) = (guid, vector) else {
        return Err(Error::not_found("ChildProperties of Guid and Vector"));
    };

    d.settle(FieldKey::FFieldVft, Some(0), None);

    let class = {
        let s = &*d.schema;
        let check = PointerCheck::InModule;
        valid_pointer_offset(s, guid, vector, POINTER_SIZE, 0x30, check, CodecField::FFieldClass)
    };
    let class = d.settle(FieldKey::FFieldClass, class, Some(0x8)).offset().unwrap_or(0x8);

    let owner = {
        let s = &*d.schema;
        let samples = [
            (guid, addr(s.find_struct("Guid"))),
            (vector, addr(s.find_struct("Vector"))),
        ];
        let read = pointer_reader(s, CodecField::FFieldOwner);
        find_offset(&samples, Window::new(class + POINTER_SIZE, 0x40, POINTER_SIZE), |a| {
            read(a).map(|p| p & !1)
        })
    };
    let owner = d.settle(FieldKey::FFieldOwner, owner, Some(0x10)).offset().unwrap_or(0x10);

    let masked = owner_is_masked(d.schema, owner);
    if masked {
        d.schema.traits.owner_encoding = OwnerEncoding::MaskedPointer;
    }
    tracing::info!("FField::Owner is {:?}", d.schema.traits.owner_encoding);
    let after_owner = if masked { owner + POINTER_SIZE } else { owner + 2 * POINTER_SIZE };

    let next = {
        let s = &*d.schema;
        let check = PointerCheck::Object;
        valid_pointer_offset(s, guid, vector, after_owner, 0x48, check, CodecField::FFieldNext)
    };
    let next = d.settle(FieldKey::FFieldNext, next, Some(after_owner)).offset().unwrap_or(0x20);

    let name = {
        let s = &*d.schema;
        let candidates: Vec<usize> = (next + POINTER_SIZE..0x40).step_by(4).collect();
        candidates
            .iter()
            .copied()
            .find(|&o| name_in(s, guid + o, &["A", "D"]) && name_in(s, vector + o, &["X", "Z"]))
            .or_else(|| {
                let items = member_sample(s);
                name_statistics(s, &items, &candidates, &NameThresholds::from_schema(s))
            })
    };
    let name = d.settle(FieldKey::FFieldName, name, Some(next + POINTER_SIZE)).offset();

    if let Some(name) = name {
        let size = d.schema.traits.name_layout.size();
        d.derive(FieldKey::FFieldFlags, name + size, &[FieldKey::FFieldName]);
    }

    field_class_layout(d, guid);
    Ok(())
}

/// First members of every struct the scan has seen, for the name statistic
fn member_sample(schema: &DiscoveredSchema) -> Vec<usize> {
    schema
        .objects()
        .filter_map(|o| o.as_struct())
        .filter_map(|s| first_child(schema, &s.object().name()?))
        .take(0x400)
        .collect()
}

/// FFieldClass: Name first, then Id, CastFlags, ClassFlags and SuperClass
fn field_class_layout(d: &mut Discovery<'_>, sample: usize) {
    let Some(class_offset) = d.offset(FieldKey::FFieldClass) else {
        return;
    };

    let (named, cast_flags_ok) = {
        let s = &*d.schema;
        let class = s
            .probe()
            .read_ptr(sample + class_offset)
            .map(|raw| s.codec().decode_ptr(CodecField::FFieldClass, raw));
        let named = class.is_some_and(|c| {
            s.fname_at(c)
                .and_then(|n| s.resolve_name(n))
                .is_some_and(|n| n.ends_with("Property"))
        });
        let base = field_class_base(s.traits().name_layout);
        let cast_flags_ok = class
            .and_then(|c| s.probe().read_u64(c + base + POINTER_SIZE))
            .map(CastFlags::from_bits_retain)
            .is_some_and(|flags| flags.contains(CastFlags::INT_PROPERTY));
        (named, cast_flags_ok)
    };

    if named {
        d.settle(FieldKey::FFieldClassName, Some(0), None);
    } else {
        d.settle(FieldKey::FFieldClassName, None, Some(0));
    }

    let base = field_class_base(d.schema.traits.name_layout);
    d.derive(FieldKey::FFieldClassId, base, &[FieldKey::FFieldClassName]);
    if cast_flags_ok {
        d.settle(FieldKey::FFieldClassCastFlags, Some(base + POINTER_SIZE), None);
    } else {
        d.settle(FieldKey::FFieldClassCastFlags, None, Some(base + POINTER_SIZE));
    }
    let cast_flags = &[FieldKey::FFieldClassCastFlags];
    d.derive(FieldKey::FFieldClassClassFlags, base + 2 * POINTER_SIZE, cast_flags);
    d.derive(FieldKey::FFieldClassSuper, base + 3 * POINTER_SIZE, cast_flags);
}

/// Where FFieldClass::Id sits: right after the (pointer aligned) FName
fn field_class_base(layout: NameLayout) -> usize {
    layout.size().next_multiple_of(POINTER_SIZE)
}
