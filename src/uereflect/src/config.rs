//! Discovery configuration
//!
//! Every sanity bound and heuristic threshold used during discovery lives
//! here. The defaults are the values that hold across shipped engine
//! builds; tests and unusual targets override them, usually from TOML.

use crate::codec::{CodecField, DecodeTable, Identity, XorKey};
use crate::error::{Error, Result};
use crate::names::NameLayoutKind;
use crate::objects::ObjectLayoutKind;
use crate::offsets::FieldKey;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Image base of the main module, if known
    pub module_base: Option<usize>,
    pub bounds: SanityBounds,
    pub heuristics: HeuristicBounds,
    pub anchors: Anchors,
    pub overrides: Overrides,
}

impl DiscoveryConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Build the decode table named by the overrides
    pub fn decode_table(&self) -> Result<DecodeTable> {
        let mut table = match self.overrides.decode {
            Some(preset) => preset.uniform(),
            None => DecodeTable::default(),
        };

        for (name, preset) in &self.overrides.decode_fields {
            let field: CodecField = name.parse()?;
            preset.install(&mut table, field);
        }

        Ok(table)
    }

    /// Parse the `"Record::Field"` keys of the offset overrides
    pub fn offset_overrides(&self) -> Result<Vec<(FieldKey, usize)>> {
        self.overrides
            .offsets
            .iter()
            .map(|(name, &offset)| Ok((name.parse::<FieldKey>()?, offset)))
            .collect()
    }
}

/// Shape checks applied to object and name table candidates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanityBounds {
    pub flat_min_num: i32,
    pub flat_max_max: i32,
    /// Where the slot-5 object keeps its own index during table validation
    pub flat_index_probe: usize,

    pub chunked_min_num_chunks: i32,
    pub chunked_max_num_chunks: i32,
    pub chunked_min_max_chunks: i32,
    pub chunked_max_max_chunks: i32,
    pub chunked_min_num_elements: i32,
    pub chunked_min_max_elements: i32,
    pub chunked_min_per_chunk: i32,
    pub chunked_max_per_chunk: i32,

    pub name_pool_max_blocks: u32,
    pub name_pool_max_cursor: u32,
    /// Bytes scanned for the chunk pointer run of a name array
    pub name_array_window: usize,

    /// Alignment of candidate addresses during brute-force scans
    pub scan_step: usize,
}

impl Default for SanityBounds {
    fn default() -> Self {
        Self {
            flat_min_num: 0x1000,
            flat_max_max: 0x400000,
            flat_index_probe: 0xC,
            chunked_min_num_chunks: 1,
            chunked_max_num_chunks: 0x14,
            chunked_min_max_chunks: 6,
            chunked_max_max_chunks: 0x5FF,
            chunked_min_num_elements: 0x800,
            chunked_min_max_elements: 0x10000,
            chunked_min_per_chunk: 0x8000,
            chunked_max_per_chunk: 0x80000,
            name_pool_max_blocks: 0x2000,
            name_pool_max_cursor: 0x40000,
            name_array_window: 0x800,
            scan_step: crate::POINTER_SIZE,
        }
    }
}

/// Thresholds for the statistical offset heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicBounds {
    pub find_offset_min: usize,
    pub find_offset_max: usize,

    /// ObjectFlags value shared by most early objects
    pub common_flag_value: u32,
    pub common_flag_seeds: usize,
    pub common_flag_samples: usize,
    pub common_flag_threshold: usize,

    /// Slots whose index field must read back as the slot number
    pub index_anchor_slots: Vec<usize>,

    pub outer_pairs: usize,

    pub name_samples: usize,
    pub name_max_value: u32,
    pub name_small_value: u32,
    pub name_max_small_count: usize,
    pub name_min_average: u64,
    pub name_max_average: u64,

    /// Share of names with a small number suffix below which FName::Number is outlined
    pub outline_number_ratio: f64,
}

impl Default for HeuristicBounds {
    fn default() -> Self {
        Self {
            find_offset_min: 0x28,
            find_offset_max: 0x1A0,
            common_flag_value: 0x43,
            common_flag_seeds: 0x20,
            common_flag_samples: 0x100,
            common_flag_threshold: 0xA0,
            index_anchor_slots: vec![0x55, 0x123],
            outer_pairs: 0x10,
            name_samples: 0x40000,
            name_max_value: 0x400_0000,
            name_small_value: 0x10,
            name_max_small_count: 0x40,
            name_min_average: 0x280,
            name_max_average: 0x200_0000,
            outline_number_ratio: 0.03,
        }
    }
}

/// Names of the objects used to bootstrap discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Anchors {
    /// Classes whose first children share a UField::Next link
    pub library_classes: Vec<String>,
    /// Wide string referenced right before the dispatch function
    pub dispatch_string: String,
    pub text_library: String,
    pub text_function: String,
    pub text_marker: String,
}

impl Default for Anchors {
    fn default() -> Self {
        Self {
            library_classes: vec!["KismetSystemLibrary".into(), "KismetStringLibrary".into()],
            dispatch_string: "Accessed None".into(),
            text_library: "KismetTextLibrary".into(),
            text_function: "Conv_StringToText".into(),
            text_marker: "ThisIsAGoodString!".into(),
        }
    }
}

/// Manual corrections for targets where the heuristics fail
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Overrides {
    /// Explicit offsets keyed by `"Record::Field"`
    pub offsets: BTreeMap<String, usize>,
    pub object_table: Option<TableOverride<ObjectLayoutKind>>,
    pub name_table: Option<TableOverride<NameLayoutKind>>,
    /// Decoder for every pointer field
    pub decode: Option<DecodePreset>,
    /// Per-field decoders, applied after `decode`
    pub decode_fields: BTreeMap<String, DecodePreset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOverride<L> {
    pub address: usize,
    pub layout: L,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DecodePreset {
    Identity,
    Xor { key: u64 },
}

impl DecodePreset {
    fn uniform(self) -> DecodeTable {
        match self {
            DecodePreset::Identity => DecodeTable::default(),
            DecodePreset::Xor { key } => DecodeTable::uniform(XorKey(key)),
        }
    }

    fn install(self, table: &mut DecodeTable, field: CodecField) {
        match self {
            DecodePreset::Identity => table.install(field, Identity),
            DecodePreset::Xor { key } => table.install(field, XorKey(key)),
        }
    }
}
