//! UObject

use super::{Address, ClassView, EnumView, FunctionView, StructView, MAX_CHAIN};
use crate::codec::CodecField;
use crate::flags::{CastFlags, ObjectFlags};
use crate::names::FName;
use crate::offsets::FieldKey;
use crate::schema::DiscoveredSchema;

use serde::Serialize;
use std::fmt;

/// What an object is, by the cast flags of its class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Package,
    Class,
    ScriptStruct,
    Function,
    Enum,
    Property,
    Object,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Package => "package",
            EntityKind::Class => "class",
            EntityKind::ScriptStruct => "struct",
            EntityKind::Function => "function",
            EntityKind::Enum => "enum",
            EntityKind::Property => "property",
            EntityKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// A UObject in the target
#[derive(Clone, Copy)]
pub struct ObjectView<'a> {
    schema: &'a DiscoveredSchema,
    address: usize,
}

impl PartialEq for ObjectView<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for ObjectView<'_> {}

impl fmt::Debug for ObjectView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectView({:#x})", self.address)
    }
}

impl Address for ObjectView<'_> {
    fn address(&self) -> usize {
        self.address
    }
}

impl<'a> ObjectView<'a> {
    /// A view of the object at `address`, if it has a class
    pub fn new(schema: &'a DiscoveredSchema, address: usize) -> Option<Self> {
        if address == 0 {
            return None;
        }
        schema.read_ptr(address, FieldKey::ObjectClass, CodecField::ObjectClass)?;
        Some(Self { schema, address })
    }

    pub(crate) fn schema(&self) -> &'a DiscoveredSchema {
        self.schema
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn vft(&self) -> Option<usize> {
        self.schema
            .read_ptr(self.address, FieldKey::ObjectVft, CodecField::ObjectVft)
    }

    pub fn flags(&self) -> ObjectFlags {
        self.schema
            .read_value(self.address, FieldKey::ObjectFlags, CodecField::ObjectFlags)
            .map_or(ObjectFlags::empty(), ObjectFlags::from_bits_retain)
    }

    pub fn has_any_flags(&self, flags: ObjectFlags) -> bool {
        self.flags().intersects(flags)
    }

    pub fn index(&self) -> Option<i32> {
        self.schema.read_i32(self.address, FieldKey::ObjectIndex)
    }

    pub fn class(&self) -> Option<ClassView<'a>> {
        let class = self
            .schema
            .read_ptr(self.address, FieldKey::ObjectClass, CodecField::ObjectClass)?;
        ObjectView::new(self.schema, class).map(ClassView::wrap)
    }

    pub fn outer(&self) -> Option<ObjectView<'a>> {
        let outer = self
            .schema
            .read_ptr(self.address, FieldKey::ObjectOuter, CodecField::ObjectOuter)?;
        ObjectView::new(self.schema, outer)
    }

    /// Outer chain, nearest first
    pub fn outers(&self) -> impl Iterator<Item = ObjectView<'a>> {
        std::iter::successors(self.outer(), |o| o.outer()).take(MAX_CHAIN)
    }

    /// The package at the end of the outer chain, or the object itself
    pub fn outermost(&self) -> ObjectView<'a> {
        self.outers().last().unwrap_or(*self)
    }

    /// UField::Next
    pub fn next_field(&self) -> Option<ObjectView<'a>> {
        let next = self
            .schema
            .read_ptr(self.address, FieldKey::FieldNext, CodecField::FieldNext)?;
        ObjectView::new(self.schema, next)
    }

    pub fn fname(&self) -> Option<FName> {
        let address = self.schema.field_address(self.address, FieldKey::ObjectName)?;
        self.schema.fname_at(address)
    }

    pub fn name(&self) -> Option<String> {
        self.schema.resolve_name(self.fname()?)
    }

    pub fn name_is(&self, name: &str) -> bool {
        self.name().is_some_and(|n| n == name)
    }

    /// `Outermost.Outer.Name`
    pub fn path_name(&self) -> Option<String> {
        let mut parts = vec![self.name()?];
        for outer in self.outers() {
            parts.push(outer.name()?);
        }
        parts.reverse();
        Some(parts.join("."))
    }

    /// `ClassName Outermost.Outer.Name`
    pub fn full_name(&self) -> Option<String> {
        let class = self.class()?.name()?;
        Some(format!("{} {}", class, self.path_name()?))
    }

    /// Whether the object's class carries any of `flags`. Empty flags match
    /// everything; unknown cast flags match nothing else.
    pub fn is_a(&self, flags: CastFlags) -> bool {
        if flags.is_empty() {
            return true;
        }
        self.class()
            .and_then(|c| c.cast_flags())
            .is_some_and(|own| own.intersects(flags))
    }

    /// Whether `class` is the object's class or one of its supers
    pub fn is_a_class(&self, class: &ClassView<'_>) -> bool {
        self.class()
            .is_some_and(|own| own.hierarchy().any(|s| s.address() == class.address()))
    }

    pub fn kind(&self) -> EntityKind {
        let Some(flags) = self.class().and_then(|c| c.cast_flags()) else {
            return EntityKind::Object;
        };
        if flags.contains(CastFlags::PACKAGE) {
            EntityKind::Package
        } else if flags.contains(CastFlags::CLASS) {
            EntityKind::Class
        } else if flags.contains(CastFlags::FUNCTION) {
            EntityKind::Function
        } else if flags.contains(CastFlags::SCRIPT_STRUCT) {
            EntityKind::ScriptStruct
        } else if flags.contains(CastFlags::ENUM) {
            EntityKind::Enum
        } else if flags.is_property() {
            EntityKind::Property
        } else {
            EntityKind::Object
        }
    }

    pub fn as_struct(&self) -> Option<StructView<'a>> {
        self.is_a(CastFlags::STRUCT).then(|| StructView::wrap(*self))
    }

    pub fn as_class(&self) -> Option<ClassView<'a>> {
        self.is_a(CastFlags::CLASS).then(|| ClassView::wrap(*self))
    }

    pub fn as_function(&self) -> Option<FunctionView<'a>> {
        self.is_a(CastFlags::FUNCTION).then(|| FunctionView::wrap(*self))
    }

    pub fn as_enum(&self) -> Option<EnumView<'a>> {
        self.is_a(CastFlags::ENUM).then(|| EnumView::wrap(*self))
    }
}
