//! Properties under either reflection model

use super::{
    Address, ClassView, EnumView, FFieldClassView, FFieldView, FunctionView, ObjectView, StructView,
};
use crate::codec::CodecField;
use crate::flags::{CastFlags, PropertyFlags};
use crate::offsets::{FieldKey, FieldModel};
use crate::schema::DiscoveredSchema;

use serde::Serialize;
use std::fmt;

/// Deepest container nesting spelled out by [`PropertyView::type_string`]
const MAX_TYPE_DEPTH: usize = 16;

/// A property: a UProperty object or an FProperty field
#[derive(Clone, Copy)]
pub struct PropertyView<'a> {
    schema: &'a DiscoveredSchema,
    address: usize,
    model: FieldModel,
}

impl PartialEq for PropertyView<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PropertyView<'_> {}

impl fmt::Debug for PropertyView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyView({:#x}, {:?})", self.address, self.model)
    }
}

impl Address for PropertyView<'_> {
    fn address(&self) -> usize {
        self.address
    }
}

/// Packing of a bool property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoolInfo {
    pub field_size: u8,
    pub byte_offset: u8,
    pub byte_mask: u8,
    pub field_mask: u8,
}

impl BoolInfo {
    /// Native `bool` rather than a bitfield
    pub fn is_native(&self) -> bool {
        self.field_mask == 0xFF
    }

    pub fn bit_index(&self) -> Option<u32> {
        (!self.is_native() && self.byte_mask != 0).then(|| self.byte_mask.trailing_zeros())
    }
}

/// Type of a property with whatever it references
#[derive(Debug, Clone, Copy)]
pub enum PropertyKind<'a> {
    Bool(BoolInfo),
    Byte { enumeration: Option<EnumView<'a>> },
    Int8,
    Int16,
    Int,
    Int64,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Name,
    Str,
    Text,
    Object { class: Option<ClassView<'a>> },
    Class { class: Option<ClassView<'a>>, meta_class: Option<ClassView<'a>> },
    WeakObject { class: Option<ClassView<'a>> },
    LazyObject { class: Option<ClassView<'a>> },
    SoftObject { class: Option<ClassView<'a>> },
    SoftClass { class: Option<ClassView<'a>>, meta_class: Option<ClassView<'a>> },
    Interface { class: Option<ClassView<'a>> },
    Struct { structure: Option<StructView<'a>> },
    Array { inner: Option<PropertyView<'a>> },
    Set { element: Option<PropertyView<'a>> },
    Map { key: Option<PropertyView<'a>>, value: Option<PropertyView<'a>> },
    Enum { underlying: Option<PropertyView<'a>>, enumeration: Option<EnumView<'a>> },
    Delegate { signature: Option<FunctionView<'a>> },
    MulticastDelegate { signature: Option<FunctionView<'a>> },
    FieldPath { class: Option<FFieldClassView<'a>> },
    Optional { value: Option<PropertyView<'a>> },
    Unknown(CastFlags),
}

impl<'a> PropertyView<'a> {
    pub(crate) fn object(object: ObjectView<'a>) -> Self {
        Self {
            schema: object.schema(),
            address: object.address(),
            model: FieldModel::UProperty,
        }
    }

    pub(crate) fn field(field: FFieldView<'a>) -> Self {
        Self {
            schema: field.schema(),
            address: field.address(),
            model: FieldModel::FProperty,
        }
    }

    /// The property a pointer refers to, in the schema's member model
    pub(crate) fn at(schema: &'a DiscoveredSchema, address: usize) -> Option<Self> {
        match schema.traits().field_model {
            FieldModel::UProperty => ObjectView::new(schema, address).map(Self::object),
            FieldModel::FProperty => FFieldView::new(schema, address).map(Self::field),
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn model(&self) -> FieldModel {
        self.model
    }

    pub fn as_object(&self) -> Option<ObjectView<'a>> {
        match self.model {
            FieldModel::UProperty => ObjectView::new(self.schema, self.address),
            FieldModel::FProperty => None,
        }
    }

    pub fn as_field(&self) -> Option<FFieldView<'a>> {
        match self.model {
            FieldModel::UProperty => None,
            FieldModel::FProperty => FFieldView::new(self.schema, self.address),
        }
    }

    pub fn name(&self) -> Option<String> {
        match self.model {
            FieldModel::UProperty => self.as_object()?.name(),
            FieldModel::FProperty => self.as_field()?.name(),
        }
    }

    pub fn name_is(&self, name: &str) -> bool {
        self.name().is_some_and(|n| n == name)
    }

    pub fn cast_flags(&self) -> Option<CastFlags> {
        match self.model {
            FieldModel::UProperty => self.as_object()?.class()?.cast_flags(),
            FieldModel::FProperty => self.as_field()?.cast_flags(),
        }
    }

    pub fn is_a(&self, flags: CastFlags) -> bool {
        flags.is_empty() || self.cast_flags().is_some_and(|own| own.intersects(flags))
    }

    /// Name of the property's class, e.g. `IntProperty`
    pub fn type_name(&self) -> Option<String> {
        match self.model {
            FieldModel::UProperty => self.as_object()?.class()?.name(),
            FieldModel::FProperty => self.as_field()?.class()?.name(),
        }
    }

    pub fn array_dim(&self) -> Option<i32> {
        self.schema.read_i32(self.address, FieldKey::PropertyArrayDim)
    }

    pub fn element_size(&self) -> Option<i32> {
        self.schema.read_i32(self.address, FieldKey::PropertyElementSize)
    }

    /// Offset of the value inside its owning struct
    pub fn offset(&self) -> Option<i32> {
        self.schema.read_i32(self.address, FieldKey::PropertyOffset)
    }

    pub fn flags(&self) -> PropertyFlags {
        self.schema
            .read_u64(self.address, FieldKey::PropertyFlags)
            .map_or(PropertyFlags::empty(), PropertyFlags::from_bits_retain)
    }

    pub fn has_flags(&self, flags: PropertyFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Decoded pointer `extra` bytes past the field at `key`
    fn pointer_at(&self, key: FieldKey, extra: usize, codec: CodecField) -> Option<usize> {
        let address = self.schema.field_address(self.address, key)?.checked_add(extra)?;
        let raw = self.schema.probe().read_ptr(address)?;
        Some(self.schema.codec().decode_ptr(codec, raw))
    }

    fn object_at(&self, key: FieldKey, extra: usize, codec: CodecField) -> Option<ObjectView<'a>> {
        ObjectView::new(self.schema, self.pointer_at(key, extra, codec)?)
    }

    fn property_at(
        &self,
        key: FieldKey,
        extra: usize,
        codec: CodecField,
    ) -> Option<PropertyView<'a>> {
        Self::at(self.schema, self.pointer_at(key, extra, codec)?)
    }

    fn class_at(&self, key: FieldKey, codec: CodecField) -> Option<ClassView<'a>> {
        self.object_at(key, 0, codec).map(ClassView::wrap)
    }

    pub fn bool_info(&self) -> Option<BoolInfo> {
        let address = self.schema.field_address(self.address, FieldKey::BoolPropertyBase)?;
        let bytes = self.schema.probe().read_bytes(address, 4)?;
        Some(BoolInfo {
            field_size: bytes[0],
            byte_offset: bytes[1],
            byte_mask: bytes[2],
            field_mask: bytes[3],
        })
    }

    pub fn kind(&self) -> PropertyKind<'a> {
        let Some(flags) = self.cast_flags() else {
            return PropertyKind::Unknown(CastFlags::empty());
        };

        let class =
            || self.class_at(FieldKey::ObjectPropertyClass, CodecField::ObjectPropertyClass);
        let meta_class =
            || self.class_at(FieldKey::ClassPropertyMetaClass, CodecField::ClassPropertyMeta);
        let function = || {
            self.object_at(
                FieldKey::DelegatePropertySignature,
                0,
                CodecField::DelegatePropertySignature,
            )
            .map(FunctionView::wrap)
        };

        if flags.contains(CastFlags::BOOL_PROPERTY) {
            match self.bool_info() {
                Some(info) => PropertyKind::Bool(info),
                None => PropertyKind::Unknown(flags),
            }
        } else if flags.contains(CastFlags::ENUM_PROPERTY) {
            PropertyKind::Enum {
                underlying: self.property_at(
                    FieldKey::EnumPropertyBase,
                    0,
                    CodecField::EnumPropertyUnderlying,
                ),
                enumeration: self
                    .object_at(FieldKey::EnumPropertyBase, 8, CodecField::EnumPropertyEnum)
                    .map(EnumView::wrap),
            }
        } else if flags.contains(CastFlags::BYTE_PROPERTY) {
            PropertyKind::Byte {
                enumeration: self
                    .object_at(FieldKey::BytePropertyEnum, 0, CodecField::BytePropertyEnum)
                    .map(EnumView::wrap),
            }
        } else if flags.contains(CastFlags::CLASS_PROPERTY) {
            PropertyKind::Class { class: class(), meta_class: meta_class() }
        } else if flags.contains(CastFlags::SOFT_CLASS_PROPERTY) {
            PropertyKind::SoftClass { class: class(), meta_class: meta_class() }
        } else if flags.contains(CastFlags::WEAK_OBJECT_PROPERTY) {
            PropertyKind::WeakObject { class: class() }
        } else if flags.contains(CastFlags::LAZY_OBJECT_PROPERTY) {
            PropertyKind::LazyObject { class: class() }
        } else if flags.contains(CastFlags::SOFT_OBJECT_PROPERTY) {
            PropertyKind::SoftObject { class: class() }
        } else if flags.contains(CastFlags::INTERFACE_PROPERTY) {
            PropertyKind::Interface { class: class() }
        } else if flags.contains(CastFlags::OBJECT_PROPERTY) {
            PropertyKind::Object { class: class() }
        } else if flags.contains(CastFlags::STRUCT_PROPERTY) {
            PropertyKind::Struct {
                structure: self
                    .object_at(FieldKey::StructPropertyStruct, 0, CodecField::StructPropertyStruct)
                    .map(StructView::wrap),
            }
        } else if flags.contains(CastFlags::ARRAY_PROPERTY) {
            PropertyKind::Array {
                inner: self.property_at(
                    FieldKey::ArrayPropertyInner,
                    0,
                    CodecField::ArrayPropertyInner,
                ),
            }
        } else if flags.contains(CastFlags::SET_PROPERTY) {
            PropertyKind::Set {
                element: self.property_at(
                    FieldKey::SetPropertyElement,
                    0,
                    CodecField::SetPropertyElement,
                ),
            }
        } else if flags.contains(CastFlags::MAP_PROPERTY) {
            PropertyKind::Map {
                key: self.property_at(FieldKey::MapPropertyBase, 0, CodecField::MapPropertyKey),
                value: self.property_at(FieldKey::MapPropertyBase, 8, CodecField::MapPropertyValue),
            }
        } else if flags.contains(CastFlags::DELEGATE_PROPERTY) {
            PropertyKind::Delegate { signature: function() }
        } else if flags.intersects(
            CastFlags::MULTICAST_DELEGATE_PROPERTY
                | CastFlags::MULTICAST_INLINE_DELEGATE_PROPERTY
                | CastFlags::MULTICAST_SPARSE_DELEGATE_PROPERTY,
        ) {
            PropertyKind::MulticastDelegate { signature: function() }
        } else if flags.contains(CastFlags::FIELD_PATH_PROPERTY) {
            let class = self
                .pointer_at(FieldKey::FieldPathPropertyClass, 0, CodecField::FieldPathPropertyClass)
                .and_then(|address| FFieldClassView::at(self.schema, address));
            PropertyKind::FieldPath { class }
        } else if flags.contains(CastFlags::OPTIONAL_PROPERTY) {
            PropertyKind::Optional {
                value: self.property_at(
                    FieldKey::OptionalPropertyValue,
                    0,
                    CodecField::OptionalPropertyValue,
                ),
            }
        } else if flags.contains(CastFlags::NAME_PROPERTY) {
            PropertyKind::Name
        } else if flags.contains(CastFlags::STR_PROPERTY) {
            PropertyKind::Str
        } else if flags.contains(CastFlags::TEXT_PROPERTY) {
            PropertyKind::Text
        } else if flags.contains(CastFlags::INT8_PROPERTY) {
            PropertyKind::Int8
        } else if flags.contains(CastFlags::INT16_PROPERTY) {
            PropertyKind::Int16
        } else if flags.contains(CastFlags::INT_PROPERTY) {
            PropertyKind::Int
        } else if flags.contains(CastFlags::INT64_PROPERTY) {
            PropertyKind::Int64
        } else if flags.contains(CastFlags::UINT16_PROPERTY) {
            PropertyKind::UInt16
        } else if flags.contains(CastFlags::UINT32_PROPERTY) {
            PropertyKind::UInt32
        } else if flags.contains(CastFlags::UINT64_PROPERTY) {
            PropertyKind::UInt64
        } else if flags.contains(CastFlags::FLOAT_PROPERTY) {
            PropertyKind::Float
        } else if flags.intersects(
            CastFlags::DOUBLE_PROPERTY | CastFlags::LARGE_WORLD_COORDINATES_REAL_PROPERTY,
        ) {
            PropertyKind::Double
        } else {
            PropertyKind::Unknown(flags)
        }
    }

    /// C++-ish spelling of the property's type
    pub fn type_string(&self) -> String {
        self.type_string_at(0)
    }

    /// Container nesting stops at `MAX_TYPE_DEPTH`; a cyclic inner reads as `?`
    fn type_string_at(&self, depth: usize) -> String {
        if depth >= MAX_TYPE_DEPTH {
            return "?".into();
        }
        let inner_name = |property: Option<PropertyView<'_>>| {
            property.map_or_else(|| "?".into(), |p| p.type_string_at(depth + 1))
        };

        match self.kind() {
            PropertyKind::Bool(_) => "bool".into(),
            PropertyKind::Byte { enumeration: Some(e) } => object_name(Some(*e)),
            PropertyKind::Byte { enumeration: None } => "uint8".into(),
            PropertyKind::Int8 => "int8".into(),
            PropertyKind::Int16 => "int16".into(),
            PropertyKind::Int => "int32".into(),
            PropertyKind::Int64 => "int64".into(),
            PropertyKind::UInt16 => "uint16".into(),
            PropertyKind::UInt32 => "uint32".into(),
            PropertyKind::UInt64 => "uint64".into(),
            PropertyKind::Float => "float".into(),
            PropertyKind::Double => "double".into(),
            PropertyKind::Name => "FName".into(),
            PropertyKind::Str => "FString".into(),
            PropertyKind::Text => "FText".into(),
            PropertyKind::Object { class } => {
                format!("{}*", object_name(class.map(|c| c.object())))
            }
            PropertyKind::Class { meta_class, .. } => {
                format!("TSubclassOf<{}>", object_name(meta_class.map(|c| c.object())))
            }
            PropertyKind::WeakObject { class } => {
                format!("TWeakObjectPtr<{}>", object_name(class.map(|c| c.object())))
            }
            PropertyKind::LazyObject { class } => {
                format!("TLazyObjectPtr<{}>", object_name(class.map(|c| c.object())))
            }
            PropertyKind::SoftObject { class } => {
                format!("TSoftObjectPtr<{}>", object_name(class.map(|c| c.object())))
            }
            PropertyKind::SoftClass { meta_class, .. } => {
                format!("TSoftClassPtr<{}>", object_name(meta_class.map(|c| c.object())))
            }
            PropertyKind::Interface { class } => {
                format!("TScriptInterface<{}>", object_name(class.map(|c| c.object())))
            }
            PropertyKind::Struct { structure } => object_name(structure.map(|s| s.object())),
            PropertyKind::Array { inner } => format!("TArray<{}>", inner_name(inner)),
            PropertyKind::Set { element } => format!("TSet<{}>", inner_name(element)),
            PropertyKind::Map { key, value } => {
                format!("TMap<{}, {}>", inner_name(key), inner_name(value))
            }
            PropertyKind::Enum { enumeration, .. } => object_name(enumeration.map(|e| *e)),
            PropertyKind::Delegate { .. } => "FScriptDelegate".into(),
            PropertyKind::MulticastDelegate { .. } => "FMulticastScriptDelegate".into(),
            PropertyKind::FieldPath { .. } => "FFieldPath".into(),
            PropertyKind::Optional { value } => format!("TOptional<{}>", inner_name(value)),
            PropertyKind::Unknown(_) => self.type_name().unwrap_or_else(|| "?".into()),
        }
    }
}

fn object_name(object: Option<ObjectView<'_>>) -> String {
    object.and_then(|o| o.name()).unwrap_or_else(|| "?".into())
}
