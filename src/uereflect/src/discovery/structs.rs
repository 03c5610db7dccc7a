//! UField, UStruct, UClass, UFunction and UEnum offsets

use super::{addr, find_offset, valid_pointer_offset, Discovery, PointerCheck, Window};
use crate::codec::CodecField;
use crate::error::{Error, Result};
use crate::flags::{CastFlags, FunctionFlags};
use crate::offsets::{EnumNameStyle, FieldKey, FieldModel, LayoutTraits};
use crate::schema::DiscoveredSchema;
use crate::view::{Address, ObjectLookup};
use crate::POINTER_SIZE;

/// Upper bound on a plausible implemented-interface count
const MAX_INTERFACES: i32 = 0x1000;

/// Reads a pointer and decodes it as `field`
pub(super) fn pointer_reader(
    schema: &DiscoveredSchema,
    field: CodecField,
) -> impl Fn(usize) -> Option<usize> + '_ {
    move |address| {
        schema
            .probe()
            .read_ptr(address)
            .map(|raw| schema.codec().decode_ptr(field, raw))
    }
}

/// UClass::ClassCastFlags
pub(super) fn cast_flags(d: &mut Discovery<'_>) -> Result<()> {
    let found = {
        let s = &*d.schema;
        let samples = [
            (addr(s.find_class("Actor")), CastFlags::ACTOR.bits()),
            (
                addr(s.find_class("Class")),
                (CastFlags::FIELD | CastFlags::STRUCT | CastFlags::CLASS).bits(),
            ),
        ];
        find_offset(&samples, Window::standard(s, 4), |a| s.probe().read_u64(a))
    };
    d.settle(FieldKey::ClassCastFlags, found, None);
    Ok(())
}

/// Whether members are UProperty objects. Those show up in the object
/// array with their owning struct as outer.
fn uses_uproperty(schema: &DiscoveredSchema) -> bool {
    schema
        .find_object_in_outer("TransformComponent", "Controller")
        .and_then(|p| p.class())
        .is_some_and(|c| c.name_is("ObjectProperty"))
}

/// UStruct::Children, which also decides the member model
pub(super) fn children(d: &mut Discovery<'_>) -> Result<()> {
    let (model, found) = {
        let s = &*d.schema;
        let model = if uses_uproperty(s) {
            FieldModel::UProperty
        } else {
            FieldModel::FProperty
        };

        let pairs: &[(&str, &str)] = match model {
            FieldModel::UProperty => {
                &[("Vector", "X"), ("Vector4", "X"), ("Vector2D", "X"), ("Guid", "A")]
            }
            FieldModel::FProperty => &[
                ("PlayerController", "WasInputKeyJustReleased"),
                ("Controller", "UnPossess"),
            ],
        };
        let samples: Vec<(usize, usize)> = pairs
            .iter()
            .map(|&(owner, child)| {
                (
                    addr(s.find_object_fast(owner, CastFlags::empty())),
                    addr(s.find_object_in_outer(child, owner)),
                )
            })
            .collect();

        let found = find_offset(
            &samples,
            Window::standard(s, 4),
            pointer_reader(s, CodecField::StructChildren),
        );
        (model, found)
    };

    tracing::info!("Members are {:?}s", model);
    d.schema.traits.field_model = model;
    d.settle(FieldKey::StructChildren, found, None);
    Ok(())
}

/// UField::Next, from the first two functions of library classes
pub(super) fn field_next(d: &mut Discovery<'_>) -> Result<()> {
    let highest = [
        FieldKey::ObjectIndex,
        FieldKey::ObjectName,
        FieldKey::ObjectFlags,
        FieldKey::ObjectOuter,
        FieldKey::ObjectClass,
    ]
    .into_iter()
    .filter_map(|key| d.offset(key))
    .max()
    .unwrap_or(0);

    let found = {
        let s = &*d.schema;
        let firsts: Vec<usize> = s
            .config()
            .anchors
            .library_classes
            .iter()
            .filter_map(|name| s.find_struct(name))
            .filter_map(|library| {
                s.read_ptr(library.address(), FieldKey::StructChildren, CodecField::StructChildren)
            })
            .collect();

        match firsts.as_slice() {
            [a, b, ..] => valid_pointer_offset(
                s,
                *a,
                *b,
                (highest + 4).next_multiple_of(POINTER_SIZE),
                0x60,
                PointerCheck::Object,
                CodecField::FieldNext,
            ),
            _ => None,
        }
    };

    d.settle(FieldKey::FieldNext, found, None);
    Ok(())
}

/// UStruct::SuperStruct
pub(super) fn super_struct(d: &mut Discovery<'_>) -> Result<()> {
    let found = {
        let s = &*d.schema;
        let object = |name: &str| addr(s.find_object_fast(name, CastFlags::empty()));

        let mut samples =
            [(object("Struct"), object("Field")), (object("Class"), object("Struct"))];
        if samples[0].0 == 0 {
            let lowercase = object("struct");
            samples[0].0 = lowercase;
            samples[1].1 = lowercase;
        }

        find_offset(
            &samples,
            Window::standard(s, 4),
            pointer_reader(s, CodecField::StructSuper),
        )
    };

    d.settle(FieldKey::StructSuper, found, None);
    Ok(())
}

/// UStruct::ChildProperties. Only exists with FProperty members.
pub(super) fn child_properties(d: &mut Discovery<'_>) -> Result<()> {
    if d.schema.traits.field_model != FieldModel::FProperty {
        tracing::debug!("UProperty members, no UStruct::ChildProperties");
        return Ok(());
    }
    let Some(children) = d.offset(FieldKey::StructChildren) else {
        return Err(Error::not_found("UStruct::Children"));
    };

    let found = {
        let s = &*d.schema;
        valid_pointer_offset(
            s,
            addr(s.find_struct("Color")),
            addr(s.find_struct("Guid")),
            children + POINTER_SIZE,
            0x80,
            PointerCheck::Object,
            CodecField::StructChildProperties,
        )
    };

    d.settle(FieldKey::StructChildProperties, found, Some(children + POINTER_SIZE));
    Ok(())
}

fn find_i32(d: &Discovery<'_>, samples: &[(&str, i32)], window: Window) -> Option<usize> {
    let s = &*d.schema;
    let samples: Vec<(usize, i32)> = samples
        .iter()
        .map(|&(name, value)| (addr(s.find_object_fast(name, CastFlags::empty())), value))
        .collect();
    find_offset(&samples, window, |a| s.probe().read_i32(a))
}

/// UStruct::PropertiesSize
pub(super) fn size(d: &mut Discovery<'_>) -> Result<()> {
    let window = Window::standard(d.schema, 4);
    let found = find_i32(d, &[("Color", 4), ("Guid", 0x10)], window);
    d.settle(FieldKey::StructSize, found, None);
    Ok(())
}

/// UStruct::MinAlignment
pub(super) fn min_alignment(d: &mut Discovery<'_>) -> Result<()> {
    let window = Window::standard(d.schema, 4);
    let found = find_i32(d, &[("Transform", 0x10), ("PlayerController", 8)], window);
    d.settle(FieldKey::StructMinAlignment, found, None);
    Ok(())
}

/// UClass::ClassDefaultObject
pub(super) fn default_object(d: &mut Discovery<'_>) -> Result<()> {
    let found = {
        let s = &*d.schema;
        let object = |name: &str| addr(s.find_object_fast(name, CastFlags::empty()));
        let samples = [
            (addr(s.find_class("Object")), object("Default__Object")),
            (addr(s.find_class("Field")), object("Default__Field")),
        ];
        find_offset(
            &samples,
            Window::new(0x28, 0x200, 4),
            pointer_reader(s, CodecField::ClassDefaultObject),
        )
    };
    d.settle(FieldKey::ClassDefaultObject, found, None);
    Ok(())
}

/// Whether `array` holds a TArray whose first element's class is `interface`
fn is_interface_array(schema: &DiscoveredSchema, array: usize, interface: usize) -> bool {
    let probe = schema.probe();
    let Some(max_at) = array.checked_add(12) else {
        return false;
    };
    let (Some(data), Some(num), Some(max)) = (
        probe.read_ptr(array),
        probe.read_i32(array + 8),
        probe.read_i32(max_at),
    ) else {
        return false;
    };
    data != 0
        && probe.is_readable(data)
        && 0 < num
        && num <= max
        && max <= MAX_INTERFACES
        && probe.read_ptr(data) == Some(interface)
}

/// UClass::Interfaces, from ActorComponent implementing
/// Interface_AssetUserData
pub(super) fn implemented_interfaces(d: &mut Discovery<'_>) -> Result<()> {
    let start = d
        .offset(FieldKey::ClassDefaultObject)
        .unwrap_or(d.schema.config().heuristics.find_offset_min);

    let found = {
        let s = &*d.schema;
        let component = addr(s.find_class("ActorComponent"));
        let interface = addr(s.find_class("Interface_AssetUserData"));
        if component == 0 || interface == 0 {
            None
        } else {
            (start.next_multiple_of(POINTER_SIZE)..0x340)
                .step_by(POINTER_SIZE)
                .find(|&offset| is_interface_array(s, component + offset, interface))
        }
    };

    d.settle(FieldKey::ClassImplementedInterfaces, found, None);
    Ok(())
}

/// UEnum::Names, located through its element count
pub(super) fn enum_names(d: &mut Discovery<'_>) -> Result<()> {
    let (found, style) = {
        let s = &*d.schema;
        let window = Window::standard(s, 4);
        let count_offset = |samples: &[(&str, i32)]| {
            let samples: Vec<(usize, i32)> = samples
                .iter()
                .map(|&(name, count)| (addr(s.find_enum(name)), count))
                .collect();
            find_offset(&samples, window, |a| s.probe().read_i32(a))
                .map(|offset| (offset - 8, samples[0].0))
        };

        let located = count_offset(&[("ENetRole", 5), ("ETraceTypeQuery", 0x22)])
            .or_else(|| {
                count_offset(&[("EAlphaBlendOption", 0x10), ("EUpdateRateShiftBucket", 8)])
            });

        match located {
            Some((offset, anchor)) => {
                // the second enumerator of any of these is worth 1
                let traits = LayoutTraits {
                    enum_names: EnumNameStyle::Pairs,
                    ..s.traits
                };
                let stride = traits.enum_entry_size();
                let second_value = anchor
                    .checked_add(offset)
                    .and_then(|names| s.probe().read_ptr(names))
                    .and_then(|data| data.checked_add(2 * stride - 8))
                    .and_then(|value| s.probe().read_u64(value));
                let style = if second_value == Some(1) {
                    EnumNameStyle::Pairs
                } else {
                    EnumNameStyle::NamesOnly
                };
                (Some(offset), style)
            }
            None => (None, EnumNameStyle::Pairs),
        }
    };

    if found.is_some() {
        tracing::info!("Enum names stored as {:?}", style);
        d.schema.traits.enum_names = style;
    }
    d.settle(FieldKey::EnumNames, found, None);
    Ok(())
}

/// Functions with well-known flags on every engine build
fn anchor_functions(schema: &DiscoveredSchema) -> [(usize, FunctionFlags); 3] {
    let function = |name: &str| addr(schema.find_function(name));
    let exec_native = FunctionFlags::EXEC | FunctionFlags::NATIVE | FunctionFlags::PUBLIC;

    let mut switch_level = function("SwitchLevel");
    if switch_level == 0 {
        switch_level = function("FOV");
    }

    [
        (
            function("WasInputKeyJustPressed"),
            FunctionFlags::FINAL
                | FunctionFlags::NATIVE
                | FunctionFlags::PUBLIC
                | FunctionFlags::BLUEPRINT_CALLABLE
                | FunctionFlags::BLUEPRINT_PURE
                | FunctionFlags::CONST,
        ),
        (function("ToggleSpeaking"), exec_native),
        (switch_level, exec_native),
    ]
}

/// UFunction::FunctionFlags
pub(super) fn function_flags(d: &mut Discovery<'_>) -> Result<()> {
    let found = {
        let s = &*d.schema;
        let window = Window::standard(s, 4);
        let anchors = anchor_functions(s);
        let search = |extra: FunctionFlags| {
            let samples: Vec<(usize, u32)> = anchors
                .iter()
                .map(|&(function, flags)| (function, (flags | extra).bits()))
                .collect();
            find_offset(&samples, window, |a| s.probe().read_u32(a))
        };
        search(FunctionFlags::empty()).or_else(|| search(FunctionFlags::REQUIRED_API))
    };
    d.settle(FieldKey::FunctionFlags, found, None);
    Ok(())
}

/// UFunction::Func: the first slot holding a code pointer in every anchor
pub(super) fn function_exec(d: &mut Discovery<'_>) -> Result<()> {
    let found = {
        let s = &*d.schema;
        let functions: Vec<usize> = anchor_functions(s)
            .iter()
            .map(|&(function, _)| function)
            .filter(|&function| function != 0)
            .collect();
        let read = pointer_reader(s, CodecField::FunctionExec);

        if functions.is_empty() {
            None
        } else {
            (0x30..0x140).step_by(POINTER_SIZE).find(|&offset| {
                functions.iter().all(|&function| {
                    read(function + offset).is_some_and(|p| s.module().contains(p))
                })
            })
        }
    };
    d.settle(FieldKey::FunctionExec, found, None);
    Ok(())
}
