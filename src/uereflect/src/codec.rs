//! Field decoding
//!
//! Some targets store reflection pointers (and a few small integers)
//! obfuscated. Every such read goes through a [`DecodeTable`], which maps a
//! [`CodecField`] to a [`FieldDecoder`]. Fields without an entry decode as
//! identity, so a default table is a no-op.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Every field read through the decode table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecField {
    ObjectVft,
    ObjectClass,
    ObjectOuter,
    FieldNext,
    StructSuper,
    StructChildren,
    StructChildProperties,
    ClassDefaultObject,
    FunctionExec,
    FFieldOwner,
    FFieldClass,
    FFieldNext,
    FFieldClassSuper,
    BytePropertyEnum,
    ObjectPropertyClass,
    ClassPropertyMeta,
    StructPropertyStruct,
    ArrayPropertyInner,
    DelegatePropertySignature,
    MapPropertyKey,
    MapPropertyValue,
    SetPropertyElement,
    EnumPropertyUnderlying,
    EnumPropertyEnum,
    FieldPathPropertyClass,
    OptionalPropertyValue,
    PropertySizeProbe,
    ObjectTableBase,
    ObjectFlags,
    FFieldFlags,
    NameComparisonIndex,
    NameNumber,
}

impl CodecField {
    /// Fields holding pointers, as opposed to flags or indices
    pub const POINTERS: &'static [CodecField] = &[
        CodecField::ObjectVft,
        CodecField::ObjectClass,
        CodecField::ObjectOuter,
        CodecField::FieldNext,
        CodecField::StructSuper,
        CodecField::StructChildren,
        CodecField::StructChildProperties,
        CodecField::ClassDefaultObject,
        CodecField::FunctionExec,
        CodecField::FFieldOwner,
        CodecField::FFieldClass,
        CodecField::FFieldNext,
        CodecField::FFieldClassSuper,
        CodecField::BytePropertyEnum,
        CodecField::ObjectPropertyClass,
        CodecField::ClassPropertyMeta,
        CodecField::StructPropertyStruct,
        CodecField::ArrayPropertyInner,
        CodecField::DelegatePropertySignature,
        CodecField::MapPropertyKey,
        CodecField::MapPropertyValue,
        CodecField::SetPropertyElement,
        CodecField::EnumPropertyUnderlying,
        CodecField::EnumPropertyEnum,
        CodecField::FieldPathPropertyClass,
        CodecField::OptionalPropertyValue,
        CodecField::PropertySizeProbe,
        CodecField::ObjectTableBase,
    ];

    pub const VALUES: &'static [CodecField] = &[
        CodecField::ObjectFlags,
        CodecField::FFieldFlags,
        CodecField::NameComparisonIndex,
        CodecField::NameNumber,
    ];

    pub fn is_pointer(self) -> bool {
        Self::POINTERS.contains(&self)
    }

    pub fn all() -> impl Iterator<Item = CodecField> {
        Self::POINTERS.iter().chain(Self::VALUES).copied()
    }
}

impl fmt::Display for CodecField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::str::FromStr for CodecField {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::all()
            .find(|field| field.to_string() == s)
            .ok_or_else(|| crate::Error::Config(format!("unknown codec field '{}'", s)))
    }
}

/// Converts a raw stored value into its logical value
pub trait FieldDecoder: Send + Sync {
    fn decode(&self, raw: u64) -> u64;
}

impl<F> FieldDecoder for F
where
    F: Fn(u64) -> u64 + Send + Sync,
{
    fn decode(&self, raw: u64) -> u64 {
        self(raw)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl FieldDecoder for Identity {
    fn decode(&self, raw: u64) -> u64 {
        raw
    }
}

/// XOR with a fixed key. Null stays null so absent links remain absent.
#[derive(Debug, Clone, Copy)]
pub struct XorKey(pub u64);

impl FieldDecoder for XorKey {
    fn decode(&self, raw: u64) -> u64 {
        if raw == 0 {
            0
        } else {
            raw ^ self.0
        }
    }
}

/// Per-field decoders; missing entries are identity
#[derive(Clone, Default)]
pub struct DecodeTable {
    decoders: HashMap<CodecField, Arc<dyn FieldDecoder>>,
}

impl fmt::Debug for DecodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<_> = self.decoders.keys().collect();
        fields.sort_by_key(|field| field.to_string());
        f.debug_struct("DecodeTable").field("overridden", &fields).finish()
    }
}

impl DecodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// One decoder for every pointer field
    pub fn uniform(decoder: impl FieldDecoder + 'static) -> Self {
        let decoder: Arc<dyn FieldDecoder> = Arc::new(decoder);
        Self {
            decoders: CodecField::POINTERS
                .iter()
                .map(|&field| (field, Arc::clone(&decoder)))
                .collect(),
        }
    }

    pub fn install(&mut self, field: CodecField, decoder: impl FieldDecoder + 'static) {
        self.decoders.insert(field, Arc::new(decoder));
    }

    pub fn with(mut self, field: CodecField, decoder: impl FieldDecoder + 'static) -> Self {
        self.install(field, decoder);
        self
    }

    pub fn is_identity(&self) -> bool {
        self.decoders.is_empty()
    }

    #[inline]
    pub fn decode(&self, field: CodecField, raw: u64) -> u64 {
        match self.decoders.get(&field) {
            Some(decoder) => decoder.decode(raw),
            None => raw,
        }
    }

    #[inline]
    pub fn decode_ptr(&self, field: CodecField, raw: usize) -> usize {
        self.decode(field, raw as u64) as usize
    }
}
