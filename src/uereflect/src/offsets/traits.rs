//! Layout variants that change how fields are read

use serde::{Deserialize, Serialize};

/// How an FName is laid out inside objects and fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NameLayout {
    /// ComparisonIndex, Number
    #[default]
    Plain,
    /// ComparisonIndex only; the number lives in the name entry
    OutlineNumber,
    /// ComparisonIndex, DisplayIndex, Number
    CasePreserving,
    /// ComparisonIndex, DisplayIndex
    CasePreservingOutlineNumber,
}

impl NameLayout {
    /// Size of an FName in bytes
    pub fn size(self) -> usize {
        match self {
            NameLayout::Plain => 8,
            NameLayout::OutlineNumber => 4,
            NameLayout::CasePreserving => 0xC,
            NameLayout::CasePreservingOutlineNumber => 8,
        }
    }

    /// Offset of Number within the FName, when stored inline
    pub fn number_offset(self) -> Option<usize> {
        match self {
            NameLayout::Plain => Some(4),
            NameLayout::CasePreserving => Some(8),
            NameLayout::OutlineNumber | NameLayout::CasePreservingOutlineNumber => None,
        }
    }

    pub fn is_outline(self) -> bool {
        self.number_offset().is_none()
    }
}

/// Which reflection model describes struct members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldModel {
    /// Members are UObjects chained through UField::Next
    #[default]
    UProperty,
    /// Members are FFields under UStruct::ChildProperties
    FProperty,
}

/// How FField::Owner tells an object owner from a field owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OwnerEncoding {
    /// Pointer followed by an `is UObject` bool
    #[default]
    PointerAndFlag,
    /// Single pointer with the low bit set for UObject owners
    MaskedPointer,
}

/// Element shape of UEnum::Names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnumNameStyle {
    /// TPair<FName, int64>
    #[default]
    Pairs,
    /// Bare FName
    NamesOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayoutTraits {
    pub name_layout: NameLayout,
    pub field_model: FieldModel,
    pub owner_encoding: OwnerEncoding,
    pub enum_names: EnumNameStyle,
}

impl LayoutTraits {
    /// Stride of one UEnum::Names element
    pub fn enum_entry_size(&self) -> usize {
        match self.enum_names {
            EnumNameStyle::Pairs => (self.name_layout.size() + 8).next_multiple_of(8),
            EnumNameStyle::NamesOnly => self.name_layout.size(),
        }
    }
}
