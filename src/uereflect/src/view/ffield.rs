//! FField and FFieldClass

use super::{Address, ObjectView, MAX_CHAIN};
use crate::codec::CodecField;
use crate::flags::CastFlags;
use crate::names::FName;
use crate::offsets::{FieldKey, OwnerEncoding};
use crate::schema::DiscoveredSchema;

use std::fmt;

/// An FField (FProperty and friends)
#[derive(Clone, Copy)]
pub struct FFieldView<'a> {
    schema: &'a DiscoveredSchema,
    address: usize,
}

impl PartialEq for FFieldView<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for FFieldView<'_> {}

impl fmt::Debug for FFieldView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FFieldView({:#x})", self.address)
    }
}

impl Address for FFieldView<'_> {
    fn address(&self) -> usize {
        self.address
    }
}

/// What an FField hangs off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOwner<'a> {
    Object(ObjectView<'a>),
    Field(FFieldView<'a>),
}

impl<'a> FFieldView<'a> {
    /// A view of the field at `address`, if it has a field class
    pub fn new(schema: &'a DiscoveredSchema, address: usize) -> Option<Self> {
        if address == 0 {
            return None;
        }
        schema.read_ptr(address, FieldKey::FFieldClass, CodecField::FFieldClass)?;
        Some(Self { schema, address })
    }

    pub(crate) fn schema(&self) -> &'a DiscoveredSchema {
        self.schema
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn class(&self) -> Option<FFieldClassView<'a>> {
        let class = self
            .schema
            .read_ptr(self.address, FieldKey::FFieldClass, CodecField::FFieldClass)?;
        Some(FFieldClassView {
            schema: self.schema,
            address: class,
        })
    }

    pub fn next(&self) -> Option<FFieldView<'a>> {
        let next = self
            .schema
            .read_ptr(self.address, FieldKey::FFieldNext, CodecField::FFieldNext)?;
        FFieldView::new(self.schema, next)
    }

    pub fn owner(&self) -> Option<FieldOwner<'a>> {
        let owner = self.schema.field_address(self.address, FieldKey::FFieldOwner)?;
        let probe = self.schema.probe();
        let raw = probe.read_ptr(owner)?;
        let raw = self.schema.codec().decode_ptr(CodecField::FFieldOwner, raw);

        let (pointer, is_object) = match self.schema.traits().owner_encoding {
            OwnerEncoding::MaskedPointer => (raw & !1, raw & 1 != 0),
            OwnerEncoding::PointerAndFlag => {
                (raw, probe.read_u8(owner.checked_add(8)?)? != 0)
            }
        };

        if is_object {
            ObjectView::new(self.schema, pointer).map(FieldOwner::Object)
        } else {
            FFieldView::new(self.schema, pointer).map(FieldOwner::Field)
        }
    }

    /// The UObject at the end of the owner chain
    pub fn owner_object(&self) -> Option<ObjectView<'a>> {
        let mut current = *self;
        for _ in 0..MAX_CHAIN {
            match current.owner()? {
                FieldOwner::Object(object) => return Some(object),
                FieldOwner::Field(field) => current = field,
            }
        }
        None
    }

    pub fn flags(&self) -> Option<u32> {
        self.schema
            .read_value(self.address, FieldKey::FFieldFlags, CodecField::FFieldFlags)
    }

    pub fn fname(&self) -> Option<FName> {
        let address = self.schema.field_address(self.address, FieldKey::FFieldName)?;
        self.schema.fname_at(address)
    }

    pub fn name(&self) -> Option<String> {
        self.schema.resolve_name(self.fname()?)
    }

    pub fn name_is(&self, name: &str) -> bool {
        self.name().is_some_and(|n| n == name)
    }

    pub fn cast_flags(&self) -> Option<CastFlags> {
        self.class()?.cast_flags()
    }

    /// Same contract as [`ObjectView::is_a`]
    pub fn is_a(&self, flags: CastFlags) -> bool {
        if flags.is_empty() {
            return true;
        }
        self.cast_flags().is_some_and(|own| own.intersects(flags))
    }
}

/// An FFieldClass: the static type descriptor of an FField
#[derive(Clone, Copy)]
pub struct FFieldClassView<'a> {
    schema: &'a DiscoveredSchema,
    address: usize,
}

impl fmt::Debug for FFieldClassView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FFieldClassView({:#x})", self.address)
    }
}

impl Address for FFieldClassView<'_> {
    fn address(&self) -> usize {
        self.address
    }
}

impl<'a> FFieldClassView<'a> {
    pub(crate) fn at(schema: &'a DiscoveredSchema, address: usize) -> Option<Self> {
        (address != 0).then_some(Self { schema, address })
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn name(&self) -> Option<String> {
        let address = self.schema.field_address(self.address, FieldKey::FFieldClassName)?;
        self.schema.resolve_name(self.schema.fname_at(address)?)
    }

    pub fn id(&self) -> Option<u64> {
        self.schema.read_u64(self.address, FieldKey::FFieldClassId)
    }

    pub fn cast_flags(&self) -> Option<CastFlags> {
        self.schema
            .read_u64(self.address, FieldKey::FFieldClassCastFlags)
            .map(CastFlags::from_bits_retain)
    }

    pub fn class_flags(&self) -> Option<u64> {
        self.schema
            .read_u64(self.address, FieldKey::FFieldClassClassFlags)
    }

    pub fn super_class(&self) -> Option<FFieldClassView<'a>> {
        let address = self.schema.read_ptr(
            self.address,
            FieldKey::FFieldClassSuper,
            CodecField::FFieldClassSuper,
        )?;
        Self::at(self.schema, address)
    }
}
