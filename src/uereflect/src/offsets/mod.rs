//! Discovered offsets and layout variants
//!
//! A [`FieldOffsetTable`] is filled in dependency order while discovery runs
//! and is read-only afterwards. Entries remember how they were obtained, so
//! consumers can tell a verified offset from a fallback.

mod key;
mod traits;

pub use key::FieldKey;
pub use traits::{EnumNameStyle, FieldModel, LayoutTraits, NameLayout, OwnerEncoding};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Confirmed by a heuristic
    Discovered,
    /// Structural fallback after the heuristic came up empty; unverified
    Default,
    /// Supplied by configuration
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetEntry {
    pub offset: usize,
    pub provenance: Provenance,
}

/// Offset of every discovered field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldOffsetTable {
    entries: BTreeMap<FieldKey, OffsetEntry>,
}

impl FieldOffsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, key: FieldKey) -> Option<usize> {
        self.entries.get(&key).map(|e| e.offset)
    }

    pub fn entry(&self, key: FieldKey) -> Option<OffsetEntry> {
        self.entries.get(&key).copied()
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn is_verified(&self, key: FieldKey) -> bool {
        self.entry(key)
            .is_some_and(|e| e.provenance != Provenance::Default)
    }

    /// Record an offset. Manual entries are never replaced.
    pub(crate) fn set(&mut self, key: FieldKey, offset: usize, provenance: Provenance) {
        if let Some(existing) = self.entries.get(&key) {
            if existing.provenance == Provenance::Manual && provenance != Provenance::Manual {
                tracing::debug!(
                    "Keeping manual {} = {:#x} over {:?} {:#x}",
                    key,
                    existing.offset,
                    provenance,
                    offset
                );
                return;
            }
        }
        self.entries.insert(key, OffsetEntry { offset, provenance });
    }

    /// Drop a non-manual entry
    pub(crate) fn remove(&mut self, key: FieldKey) {
        if self.entry(key).is_some_and(|e| e.provenance != Provenance::Manual) {
            self.entries.remove(&key);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, OffsetEntry)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_entries_win() {
        let mut table = FieldOffsetTable::new();
        table.set(FieldKey::ObjectName, 0x18, Provenance::Manual);
        table.set(FieldKey::ObjectName, 0x20, Provenance::Discovered);
        assert_eq!(table.get(FieldKey::ObjectName), Some(0x18));
        assert!(table.is_verified(FieldKey::ObjectName));
    }

    #[test]
    fn test_default_entries_are_unverified() {
        let mut table = FieldOffsetTable::new();
        table.set(FieldKey::ObjectOuter, 0x28, Provenance::Default);
        assert_eq!(table.get(FieldKey::ObjectOuter), Some(0x28));
        assert!(!table.is_verified(FieldKey::ObjectOuter));
        assert!(!table.is_verified(FieldKey::ObjectClass));
    }

    #[test]
    fn test_json_uses_display_names() {
        let mut table = FieldOffsetTable::new();
        table.set(FieldKey::ObjectFlags, 8, Provenance::Discovered);
        table.set(FieldKey::StructSuper, 0x40, Provenance::Default);

        let json: serde_json::Value = serde_json::from_str(&table.to_json().unwrap()).unwrap();
        assert_eq!(json["UObject::Flags"]["offset"], 8);
        assert_eq!(json["UObject::Flags"]["provenance"], "discovered");
        assert_eq!(json["UStruct::Super"]["provenance"], "default");

        let back: FieldOffsetTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }
}
