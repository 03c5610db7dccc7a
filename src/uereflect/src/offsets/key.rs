//! Field identifiers

use crate::error::{Error, Result};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One (record kind, field) pair whose offset is discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKey {
    ObjectVft,
    ObjectFlags,
    ObjectIndex,
    ObjectClass,
    ObjectName,
    ObjectOuter,

    FieldNext,

    EnumNames,

    StructSuper,
    StructChildren,
    StructChildProperties,
    StructSize,
    StructMinAlignment,

    FunctionFlags,
    FunctionExec,

    ClassCastFlags,
    ClassDefaultObject,
    ClassImplementedInterfaces,

    FFieldVft,
    FFieldClass,
    FFieldOwner,
    FFieldNext,
    FFieldName,
    FFieldFlags,

    FFieldClassName,
    FFieldClassId,
    FFieldClassCastFlags,
    FFieldClassClassFlags,
    FFieldClassSuper,

    FNameComparisonIndex,
    FNameNumber,

    PropertyArrayDim,
    PropertyElementSize,
    PropertyFlags,
    PropertyOffset,
    PropertySize,

    BoolPropertyBase,
    BytePropertyEnum,
    ObjectPropertyClass,
    ClassPropertyMetaClass,
    StructPropertyStruct,
    ArrayPropertyInner,
    DelegatePropertySignature,
    MapPropertyBase,
    SetPropertyElement,
    EnumPropertyBase,
    FieldPathPropertyClass,
    OptionalPropertyValue,

    TextData,
    TextString,
    TextSize,
}

use FieldKey::*;

impl FieldKey {
    pub const ALL: &'static [FieldKey] = &[
        ObjectVft,
        ObjectFlags,
        ObjectIndex,
        ObjectClass,
        ObjectName,
        ObjectOuter,
        FieldNext,
        EnumNames,
        StructSuper,
        StructChildren,
        StructChildProperties,
        StructSize,
        StructMinAlignment,
        FunctionFlags,
        FunctionExec,
        ClassCastFlags,
        ClassDefaultObject,
        ClassImplementedInterfaces,
        FFieldVft,
        FFieldClass,
        FFieldOwner,
        FFieldNext,
        FFieldName,
        FFieldFlags,
        FFieldClassName,
        FFieldClassId,
        FFieldClassCastFlags,
        FFieldClassClassFlags,
        FFieldClassSuper,
        FNameComparisonIndex,
        FNameNumber,
        PropertyArrayDim,
        PropertyElementSize,
        PropertyFlags,
        PropertyOffset,
        PropertySize,
        BoolPropertyBase,
        BytePropertyEnum,
        ObjectPropertyClass,
        ClassPropertyMetaClass,
        StructPropertyStruct,
        ArrayPropertyInner,
        DelegatePropertySignature,
        MapPropertyBase,
        SetPropertyElement,
        EnumPropertyBase,
        FieldPathPropertyClass,
        OptionalPropertyValue,
        TextData,
        TextString,
        TextSize,
    ];

    /// Engine type the field belongs to
    pub fn record(self) -> &'static str {
        match self {
            ObjectVft | ObjectFlags | ObjectIndex | ObjectClass | ObjectName | ObjectOuter => {
                "UObject"
            }
            FieldNext => "UField",
            EnumNames => "UEnum",
            StructSuper | StructChildren | StructChildProperties | StructSize
            | StructMinAlignment => "UStruct",
            FunctionFlags | FunctionExec => "UFunction",
            ClassCastFlags | ClassDefaultObject | ClassImplementedInterfaces => "UClass",
            FFieldVft | FFieldClass | FFieldOwner | FFieldNext | FFieldName | FFieldFlags => {
                "FField"
            }
            FFieldClassName | FFieldClassId | FFieldClassCastFlags | FFieldClassClassFlags
            | FFieldClassSuper => "FFieldClass",
            FNameComparisonIndex | FNameNumber => "FName",
            PropertyArrayDim | PropertyElementSize | PropertyFlags | PropertyOffset
            | PropertySize => "Property",
            BoolPropertyBase => "BoolProperty",
            BytePropertyEnum => "ByteProperty",
            ObjectPropertyClass => "ObjectProperty",
            ClassPropertyMetaClass => "ClassProperty",
            StructPropertyStruct => "StructProperty",
            ArrayPropertyInner => "ArrayProperty",
            DelegatePropertySignature => "DelegateProperty",
            MapPropertyBase => "MapProperty",
            SetPropertyElement => "SetProperty",
            EnumPropertyBase => "EnumProperty",
            FieldPathPropertyClass => "FieldPathProperty",
            OptionalPropertyValue => "OptionalProperty",
            TextData | TextString | TextSize => "FText",
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            ObjectVft | FFieldVft => "Vft",
            ObjectFlags | FFieldFlags | FunctionFlags | PropertyFlags => "Flags",
            ObjectIndex => "Index",
            ObjectClass | FFieldClass => "Class",
            ObjectName | FFieldName | FFieldClassName => "Name",
            ObjectOuter => "Outer",
            FieldNext | FFieldNext => "Next",
            EnumNames => "Names",
            StructSuper => "Super",
            StructChildren => "Children",
            StructChildProperties => "ChildProperties",
            StructSize | PropertySize | TextSize => "Size",
            StructMinAlignment => "MinAlignment",
            FunctionExec => "ExecFunction",
            ClassCastFlags | FFieldClassCastFlags => "CastFlags",
            ClassDefaultObject => "DefaultObject",
            ClassImplementedInterfaces => "ImplementedInterfaces",
            FFieldOwner => "Owner",
            FFieldClassId => "Id",
            FFieldClassClassFlags => "ClassFlags",
            FFieldClassSuper => "SuperClass",
            FNameComparisonIndex => "ComparisonIndex",
            FNameNumber => "Number",
            PropertyArrayDim => "ArrayDim",
            PropertyElementSize => "ElementSize",
            PropertyOffset => "Offset",
            BoolPropertyBase | MapPropertyBase | EnumPropertyBase => "Base",
            BytePropertyEnum => "Enum",
            ObjectPropertyClass => "PropertyClass",
            ClassPropertyMetaClass => "MetaClass",
            StructPropertyStruct => "Struct",
            ArrayPropertyInner => "Inner",
            DelegatePropertySignature => "SignatureFunction",
            SetPropertyElement => "ElementProp",
            FieldPathPropertyClass => "FieldClass",
            OptionalPropertyValue => "ValueProperty",
            TextData => "DataOffset",
            TextString => "StringOffset",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.record(), self.field())
    }
}

impl FromStr for FieldKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (record, field) = s
            .split_once("::")
            .ok_or_else(|| Error::Config(format!("expected 'Record::Field', got '{}'", s)))?;

        Self::ALL
            .iter()
            .copied()
            .find(|key| key.record() == record && key.field() == field)
            .ok_or_else(|| Error::Config(format!("unknown field '{}'", s)))
    }
}

impl Serialize for FieldKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
