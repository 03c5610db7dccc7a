//! UStruct, UClass, UFunction and UEnum

use super::{Address, FFieldView, ObjectView, PropertyView, MAX_CHAIN};
use crate::codec::CodecField;
use crate::flags::{CastFlags, FunctionFlags, PropertyFlags};
use crate::offsets::{EnumNameStyle, FieldKey, FieldModel};
use crate::schema::DiscoveredSchema;

use std::ops::Deref;

/// Upper bound on enumerator and interface counts
const MAX_ENTRIES: usize = 0x10000;

/// A UStruct: script struct, class or function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructView<'a>(ObjectView<'a>);

impl<'a> Deref for StructView<'a> {
    type Target = ObjectView<'a>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Address for StructView<'_> {
    fn address(&self) -> usize {
        self.0.address()
    }
}

impl<'a> StructView<'a> {
    pub(crate) fn wrap(object: ObjectView<'a>) -> Self {
        Self(object)
    }

    pub fn object(&self) -> ObjectView<'a> {
        self.0
    }

    pub fn super_struct(&self) -> Option<StructView<'a>> {
        let schema = self.0.schema();
        let address =
            schema.read_ptr(self.address(), FieldKey::StructSuper, CodecField::StructSuper)?;
        ObjectView::new(schema, address).map(StructView::wrap)
    }

    /// This struct followed by its supers
    pub fn hierarchy(&self) -> impl Iterator<Item = StructView<'a>> {
        std::iter::successors(Some(*self), |s| s.super_struct()).take(MAX_CHAIN)
    }

    /// UField children: properties (old model) and functions
    pub fn children(&self) -> impl Iterator<Item = ObjectView<'a>> {
        let schema = self.0.schema();
        let first = schema
            .read_ptr(self.address(), FieldKey::StructChildren, CodecField::StructChildren)
            .and_then(|address| ObjectView::new(schema, address));
        std::iter::successors(first, |c| c.next_field()).take(MAX_CHAIN)
    }

    /// FField children
    pub fn child_properties(&self) -> impl Iterator<Item = FFieldView<'a>> {
        let schema = self.0.schema();
        let first = schema
            .read_ptr(
                self.address(),
                FieldKey::StructChildProperties,
                CodecField::StructChildProperties,
            )
            .and_then(|address| FFieldView::new(schema, address));
        std::iter::successors(first, |f| f.next()).take(MAX_CHAIN)
    }

    pub fn size(&self) -> Option<i32> {
        self.0.schema().read_i32(self.address(), FieldKey::StructSize)
    }

    pub fn min_alignment(&self) -> Option<i32> {
        self.0.schema().read_i32(self.address(), FieldKey::StructMinAlignment)
    }

    /// Properties declared on this struct (not its supers)
    pub fn properties(&self) -> Vec<PropertyView<'a>> {
        match self.0.schema().traits().field_model {
            FieldModel::UProperty => self
                .children()
                .filter(|c| c.is_a(CastFlags::PROPERTY))
                .map(PropertyView::object)
                .collect(),
            FieldModel::FProperty => self.child_properties().map(PropertyView::field).collect(),
        }
    }

    pub fn functions(&self) -> Vec<FunctionView<'a>> {
        self.children()
            .filter_map(|c| c.as_function())
            .collect()
    }

    /// Declared member named `name` whose type carries any of `flags`
    /// (empty flags accept any type)
    pub fn find_member(&self, name: &str, flags: CastFlags) -> Option<PropertyView<'a>> {
        match self.0.schema().traits().field_model {
            FieldModel::UProperty => self
                .children()
                .find(|c| c.is_a(flags) && c.name_is(name))
                .map(PropertyView::object),
            FieldModel::FProperty => self
                .child_properties()
                .find(|f| f.is_a(flags) && f.name_is(name))
                .map(PropertyView::field),
        }
    }

    /// Whether `other` is this struct or one of its supers
    pub fn inherits(&self, other: &StructView<'_>) -> bool {
        self.hierarchy().any(|s| s.address() == other.address())
    }
}

/// A UClass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassView<'a>(StructView<'a>);

impl<'a> Deref for ClassView<'a> {
    type Target = StructView<'a>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Address for ClassView<'_> {
    fn address(&self) -> usize {
        self.0.address()
    }
}

impl<'a> ClassView<'a> {
    pub(crate) fn wrap(object: ObjectView<'a>) -> Self {
        Self(StructView::wrap(object))
    }

    pub fn as_struct(&self) -> StructView<'a> {
        self.0
    }

    pub fn cast_flags(&self) -> Option<CastFlags> {
        self.schema()
            .read_u64(self.address(), FieldKey::ClassCastFlags)
            .map(CastFlags::from_bits_retain)
    }

    pub fn default_object(&self) -> Option<ObjectView<'a>> {
        let schema = self.schema();
        let address = schema.read_ptr(
            self.address(),
            FieldKey::ClassDefaultObject,
            CodecField::ClassDefaultObject,
        )?;
        ObjectView::new(schema, address)
    }

    /// Interfaces this class declares, from the `{Class, VTableOffset,
    /// bImplementedByK2}` array
    pub fn implemented_interfaces(&self) -> Vec<ClassView<'a>> {
        let schema = self.schema();
        let key = FieldKey::ClassImplementedInterfaces;
        let Some((data, num)) = array_at(schema, self.address(), key, INTERFACE_ENTRY_SIZE) else {
            return Vec::new();
        };

        let probe = schema.probe();
        (0..num)
            .filter_map(|i| probe.read_ptr(data + i * INTERFACE_ENTRY_SIZE))
            .filter_map(|address| ObjectView::new(schema, address))
            .map(ClassView::wrap)
            .collect()
    }

    /// Function named `name` on this class or a super
    pub fn find_function(&self, name: &str) -> Option<FunctionView<'a>> {
        self.hierarchy()
            .flat_map(|s| s.functions())
            .find(|f| f.name_is(name))
    }
}

/// Data pointer and capped count of the TArray at `base + offset(key)`.
/// `None` for empty arrays and for data that would run off the address space.
fn array_at(
    schema: &DiscoveredSchema,
    base: usize,
    key: FieldKey,
    stride: usize,
) -> Option<(usize, usize)> {
    let array = schema.field_address(base, key)?;
    let probe = schema.probe();
    let data = probe.read_ptr(array)?;
    let num = probe.read_i32(array.checked_add(8)?)?;
    if data == 0 || num <= 0 {
        return None;
    }

    let num = (num as usize).min(MAX_ENTRIES);
    data.checked_add(num * stride)?;
    Some((data, num))
}

/// Size of one implemented-interface entry
pub(crate) const INTERFACE_ENTRY_SIZE: usize = 0x10;

/// A UFunction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionView<'a>(StructView<'a>);

impl<'a> Deref for FunctionView<'a> {
    type Target = StructView<'a>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Address for FunctionView<'_> {
    fn address(&self) -> usize {
        self.0.address()
    }
}

impl<'a> FunctionView<'a> {
    pub(crate) fn wrap(object: ObjectView<'a>) -> Self {
        Self(StructView::wrap(object))
    }

    pub fn function_flags(&self) -> Option<FunctionFlags> {
        self.schema()
            .read_u32(self.address(), FieldKey::FunctionFlags)
            .map(FunctionFlags::from_bits_retain)
    }

    /// Native thunk
    pub fn exec_function(&self) -> Option<usize> {
        self.schema()
            .read_ptr(self.address(), FieldKey::FunctionExec, CodecField::FunctionExec)
    }

    pub fn params(&self) -> Vec<PropertyView<'a>> {
        self.properties()
            .into_iter()
            .filter(|p| p.has_flags(PropertyFlags::PARM))
            .collect()
    }

    pub fn return_property(&self) -> Option<PropertyView<'a>> {
        self.properties()
            .into_iter()
            .find(|p| p.has_flags(PropertyFlags::RETURN_PARM))
    }
}

/// A UEnum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumView<'a>(ObjectView<'a>);

impl<'a> Deref for EnumView<'a> {
    type Target = ObjectView<'a>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Address for EnumView<'_> {
    fn address(&self) -> usize {
        self.0.address()
    }
}

impl<'a> EnumView<'a> {
    pub(crate) fn wrap(object: ObjectView<'a>) -> Self {
        Self(object)
    }

    /// Enumerators as `(name, value)`. Enums that store names only get
    /// their position as value.
    pub fn names(&self) -> Vec<(String, i64)> {
        let schema = self.0.schema();
        let traits = schema.traits();
        let stride = traits.enum_entry_size();
        let Some((data, num)) = array_at(schema, self.address(), FieldKey::EnumNames, stride) else {
            return Vec::new();
        };

        let probe = schema.probe();
        let mut names = Vec::new();
        for i in 0..num {
            let entry = data + i * stride;
            let Some(name) = schema.fname_at(entry).and_then(|n| schema.resolve_name(n)) else {
                break;
            };
            let value = match traits.enum_names {
                EnumNameStyle::Pairs => match probe.read_u64(entry + stride - 8) {
                    Some(value) => value as i64,
                    None => break,
                },
                EnumNameStyle::NamesOnly => i as i64,
            };
            names.push((name, value));
        }
        names
    }
}
