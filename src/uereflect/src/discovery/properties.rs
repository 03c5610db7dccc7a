//! Property offsets: the common FProperty/UProperty fields, then the
//! per-type payloads that start where the base property ends

use super::structs::pointer_reader;
use super::{addr, find_offset, Discovery, Window};
use crate::codec::CodecField;
use crate::error::{Error, Result};
use crate::flags::{CastFlags, PropertyFlags};
use crate::offsets::FieldKey;
use crate::schema::DiscoveredSchema;
use crate::view::{ObjectLookup, PropertyView};
use crate::POINTER_SIZE;

/// Base property to bool payload, in both member models
const BOOL_FROM_OFFSET: usize = 0x2C;
/// FieldMask is the last of the bool payload's four bytes
const FIELD_MASK_INDEX: usize = 3;

/// Address of member `name` declared on struct (or function) `owner`, 0
/// when missing
fn member(schema: &DiscoveredSchema, owner: &str, name: &str) -> usize {
    addr(find_member(schema, owner, name))
}

fn find_member<'s>(
    schema: &'s DiscoveredSchema,
    owner: &str,
    name: &str,
) -> Option<PropertyView<'s>> {
    schema
        .find_struct(owner)
        .and_then(|s| s.find_member(name, CastFlags::empty()))
}

/// Least offset in `window` at which each property's pointer decodes to
/// the expected object
fn pointer_samples(
    schema: &DiscoveredSchema,
    samples: &[(usize, usize)],
    window: Window,
    field: CodecField,
) -> Option<usize> {
    let samples: Vec<(usize, usize)> = samples
        .iter()
        .copied()
        .filter(|&(_, expected)| expected != 0)
        .collect();
    find_offset(&samples, window, pointer_reader(schema, field))
}

fn plain_flags() -> PropertyFlags {
    PropertyFlags::EDIT
        | PropertyFlags::ZERO_CONSTRUCTOR
        | PropertyFlags::SAVE_GAME
        | PropertyFlags::IS_PLAIN_OLD_DATA
        | PropertyFlags::NO_DESTRUCTOR
        | PropertyFlags::HAS_GET_VALUE_TYPE_HASH
}

/// ElementSize, ArrayDim, PropertyFlags and Offset_Internal
pub(super) fn fields(d: &mut Discovery<'_>) -> Result<()> {
    let guid: Vec<usize> = {
        let s = &*d.schema;
        ["A", "C", "D"].iter().map(|name| member(s, "Guid", name)).collect()
    };
    if guid.iter().all(|&a| a == 0) {
        return Err(Error::not_found("members of Guid"));
    }

    let element_size = {
        let s = &*d.schema;
        let samples: Vec<(usize, i32)> = guid.iter().map(|&a| (a, 4)).collect();
        find_offset(&samples, Window::standard(s, 4), |a| s.probe().read_i32(a))
    };
    let settled = d.settle(FieldKey::PropertyElementSize, element_size, None);
    let Some(element_size) = settled.offset() else {
        return Err(Error::not_found("Property::ElementSize"));
    };

    let array_dim = {
        let s = &*d.schema;
        let samples: Vec<(usize, i32)> = guid.iter().map(|&a| (a, 1)).collect();
        let window = Window::new(element_size.saturating_sub(0x10), element_size + 0x10, 4);
        find_offset(&samples, window, |a| s.probe().read_i32(a))
    };
    d.settle(FieldKey::PropertyArrayDim, array_dim, Some(element_size - 4));

    let flags = {
        let s = &*d.schema;
        let a = guid[0];
        let r = match member(s, "Color", "R") {
            0 => member(s, "Color", "r"),
            r => r,
        };
        let plain = plain_flags();
        let visible = plain | PropertyFlags::BLUEPRINT_VISIBLE;
        let read = |address: usize| s.probe().read_u64(address);

        let samples = [(a, plain.bits()), (r, visible.bits())];
        find_offset(&samples, Window::standard(s, 4), read).or_else(|| {
            let public = PropertyFlags::NATIVE_ACCESS_SPECIFIER_PUBLIC;
            find_offset(
                &[(a, (plain | public).bits()), (r, (visible | public).bits())],
                Window::standard(s, 4),
                read,
            )
        })
    };
    let flags = d
        .settle(FieldKey::PropertyFlags, flags, Some(element_size + 4))
        .offset()
        .unwrap_or(element_size + 4);

    let offset = {
        let s = &*d.schema;
        let samples = [
            (member(s, "Color", "B"), 0i32),
            (member(s, "Color", "G"), 1),
            (member(s, "Color", "R"), 2),
        ];
        find_offset(&samples, Window::standard(s, 4), |a| s.probe().read_i32(a))
    };
    d.settle(FieldKey::PropertyOffset, offset, Some(flags + 0xC));
    Ok(())
}

/// BoolProperty's FieldSize/ByteOffset/ByteMask/FieldMask, located by
/// the FieldMask of a native bool (0xFF) and of a bitfield
pub(super) fn bool_base(d: &mut Discovery<'_>) -> Result<()> {
    let Some(offset) = d.offset(FieldKey::PropertyOffset) else {
        return Err(Error::not_found("Property::Offset_Internal"));
    };

    let found = {
        let s = &*d.schema;
        let samples = [
            (member(s, "PlayerController", "bAutoManageActiveCameraTarget"), 0xFFu8),
            (member(s, "Engine", "bIsOverridingSelectedColor"), 0xFF),
            (member(s, "Engine", "bEnableOnScreenDebugMessagesDisplay"), 0x2),
        ];
        let window = Window::standard(s, 1).starting_at(offset + 4);
        find_offset(&samples, window, |a| s.probe().read_u8(a)).map(|o| o - FIELD_MASK_INDEX)
    };

    d.settle(FieldKey::BoolPropertyBase, found, Some(offset + BOOL_FROM_OFFSET));
    Ok(())
}

/// EnumProperty's UnderlyingProp and Enum. The enum pointer is matched;
/// the base is one pointer before it.
pub(super) fn enum_base(d: &mut Discovery<'_>) -> Result<()> {
    let Some(offset) = d.offset(FieldKey::PropertyOffset) else {
        return Err(Error::not_found("Property::Offset_Internal"));
    };

    let found = {
        let s = &*d.schema;
        let samples = [
            (
                member(s, "ActorComponent", "CreationMethod"),
                addr(s.find_enum("EComponentCreationMethod")),
            ),
            (member(s, "Pawn", "AutoPossessAI"), addr(s.find_enum("EAutoPossessAI"))),
        ];
        let window = Window::standard(s, POINTER_SIZE)
            .starting_at((offset + 4).next_multiple_of(POINTER_SIZE));
        pointer_samples(s, &samples, window, CodecField::EnumPropertyEnum).map(|o| o - POINTER_SIZE)
    };

    d.settle(FieldKey::EnumPropertyBase, found, Some(offset + BOOL_FROM_OFFSET));
    Ok(())
}

/// Size of the base property: where the first per-type payload begins
pub(super) fn property_size(d: &mut Discovery<'_>) -> Result<()> {
    let offsets = &d.schema.offsets;
    let source = [FieldKey::EnumPropertyBase, FieldKey::BoolPropertyBase]
        .into_iter()
        .find(|&key| offsets.is_verified(key))
        .or_else(|| {
            [FieldKey::EnumPropertyBase, FieldKey::BoolPropertyBase]
                .into_iter()
                .find(|&key| offsets.contains(key))
        });

    let Some(source) = source else {
        return Err(Error::not_found("a property payload offset"));
    };
    if let Some(size) = d.offset(source) {
        d.derive(FieldKey::PropertySize, size, &[source]);
    }
    Ok(())
}

/// Payloads that are a single object pointer at the start
pub(super) fn subtypes(d: &mut Discovery<'_>) -> Result<()> {
    let Some(size) = d.offset(FieldKey::PropertySize) else {
        return Err(Error::not_found("Property size"));
    };

    let [object_class, byte_enum, struct_struct, delegate] = {
        let s = &*d.schema;
        let window = Window::standard(s, POINTER_SIZE).starting_at(size);

        let object_class = pointer_samples(
            s,
            &[
                (member(s, "Controller", "PlayerState"), addr(s.find_class("PlayerState"))),
                (member(s, "Controller", "Pawn"), addr(s.find_class("Pawn"))),
                (member(s, "World", "PersistentLevel"), addr(s.find_class("Level"))),
            ],
            window,
            CodecField::ObjectPropertyClass,
        );
        let byte_enum = pointer_samples(
            s,
            &[
                (member(s, "Actor", "RemoteRole"), addr(s.find_enum("ENetRole"))),
                (
                    member(s, "CollisionResponseContainer", "GameTraceChannel1"),
                    addr(s.find_enum("ECollisionResponse")),
                ),
            ],
            window,
            CodecField::BytePropertyEnum,
        );
        let vector = addr(s.find_struct("Vector"));
        let struct_struct = pointer_samples(
            s,
            &[(member(s, "TwoVectors", "v1"), vector), (member(s, "TwoVectors", "v2"), vector)],
            window,
            CodecField::StructPropertyStruct,
        );
        let signature = addr(s.find_function("TimerDynamicDelegate__DelegateSignature"));
        let delegate = pointer_samples(
            s,
            &[
                (member(s, "K2_GetTimerElapsedTimeDelegate", "Delegate"), signature),
                (member(s, "K2_GetTimerRemainingTimeDelegate", "Delegate"), signature),
            ],
            window,
            CodecField::DelegatePropertySignature,
        );
        [object_class, byte_enum, struct_struct, delegate]
    };

    d.settle(FieldKey::ObjectPropertyClass, object_class, Some(size));
    d.settle(FieldKey::BytePropertyEnum, byte_enum, Some(size));
    d.settle(FieldKey::StructPropertyStruct, struct_struct, Some(size));
    d.settle(FieldKey::DelegatePropertySignature, delegate, Some(size));
    Ok(())
}

/// Whether the pointer at `offset` in `property` refers to another property
fn points_at_property(
    schema: &DiscoveredSchema,
    property: usize,
    offset: usize,
    field: CodecField,
) -> bool {
    let Some(inner) = pointer_reader(schema, field)(property + offset) else {
        return false;
    };
    PropertyView::at(schema, inner)
        .and_then(|p| p.type_name())
        .is_some_and(|name| name.ends_with("Property"))
}

/// Container payloads sit right after the base property. TArray's inner
/// is checked against a known array; the rest follow from the same size.
pub(super) fn containers(d: &mut Discovery<'_>) -> Result<()> {
    let Some(size) = d.offset(FieldKey::PropertySize) else {
        return Err(Error::not_found("Property size"));
    };

    let inner_ok = {
        let s = &*d.schema;
        let tags = member(s, "Actor", "Tags");
        tags != 0 && points_at_property(s, tags, size, CodecField::ArrayPropertyInner)
    };
    if inner_ok {
        d.settle(FieldKey::ArrayPropertyInner, Some(size), None);
    } else {
        d.derive(FieldKey::ArrayPropertyInner, size, &[FieldKey::PropertySize]);
    }

    for key in [
        FieldKey::SetPropertyElement,
        FieldKey::MapPropertyBase,
        FieldKey::FieldPathPropertyClass,
        FieldKey::OptionalPropertyValue,
    ] {
        d.derive(key, size, &[FieldKey::PropertySize]);
    }
    Ok(())
}

/// ClassProperty::MetaClass, after ObjectProperty::PropertyClass
pub(super) fn meta_class(d: &mut Discovery<'_>) -> Result<()> {
    let Some(class) = d.offset(FieldKey::ObjectPropertyClass) else {
        return Err(Error::not_found("ObjectProperty::PropertyClass"));
    };

    let found = {
        let s = &*d.schema;
        let samples = [(
            member(s, "PlayerController", "CheatClass"),
            addr(s.find_class("CheatManager")),
        )];
        let window = Window::standard(s, POINTER_SIZE).starting_at(class + POINTER_SIZE);
        pointer_samples(s, &samples, window, CodecField::ClassPropertyMeta)
    };

    d.settle(FieldKey::ClassPropertyMetaClass, found, Some(class + POINTER_SIZE));
    Ok(())
}
