//! The discovery session
//!
//! A [`DiscoveredSchema`] owns everything one attach produces: the probe,
//! the decode table, the two global tables and the offset table. Views
//! borrow it; nothing mutates it once [`DiscoveredSchema::discover`]
//! returns.

use crate::codec::{CodecField, DecodeTable};
use crate::config::DiscoveryConfig;
use crate::discovery::{DispatchInfo, Invoker, Pipeline};
use crate::error::Result;
use crate::names::{self, FName, NameTable};
use crate::objects::{self, ObjectTable};
use crate::offsets::{FieldKey, FieldOffsetTable, LayoutTraits, Provenance};
use crate::probe::{MemoryProbe, Module};
use crate::source::MemorySource;
use crate::view::ObjectView;

use std::sync::Arc;

/// Frozen result of one discovery run
#[derive(Debug, Clone)]
pub struct DiscoveredSchema {
    probe: MemoryProbe,
    codec: DecodeTable,
    module: Module,
    objects: ObjectTable,
    names: NameTable,
    config: DiscoveryConfig,
    pub(crate) offsets: FieldOffsetTable,
    pub(crate) traits: LayoutTraits,
    pub(crate) dispatch: Option<DispatchInfo>,
}

impl DiscoveredSchema {
    /// Locate both global tables and run the standard pipeline
    pub fn discover(source: Arc<dyn MemorySource>, config: DiscoveryConfig) -> Result<Self> {
        Self::discover_with(source, config, &Pipeline::standard(), None)
    }

    /// Like [`discover`](Self::discover) with a custom pipeline and an
    /// optional invoker for the live-call steps
    pub fn discover_with(
        source: Arc<dyn MemorySource>,
        config: DiscoveryConfig,
        pipeline: &Pipeline,
        invoker: Option<&dyn Invoker>,
    ) -> Result<Self> {
        pipeline.validate()?;
        let mut schema = Self::bootstrap(source, config)?;
        pipeline.run(&mut schema, invoker)?;

        tracing::info!(
            "Discovery finished: {} offsets ({} unverified)",
            schema.offsets.len(),
            schema
                .offsets
                .iter()
                .filter(|(_, e)| e.provenance == Provenance::Default)
                .count()
        );
        Ok(schema)
    }

    /// Locate the module and both global tables without running any
    /// offset heuristics. Manual offsets from the configuration are applied.
    pub fn bootstrap(source: Arc<dyn MemorySource>, config: DiscoveryConfig) -> Result<Self> {
        let probe = MemoryProbe::new(source);
        let codec = config.decode_table()?;
        if !codec.is_identity() {
            tracing::info!("Using custom decode table: {:?}", codec);
        }

        let module = probe.locate_module(config.module_base)?;
        let objects = objects::locate(&probe, &codec, &module, &config)?;
        let names = names::locate(&probe, &module, &config)?;

        let mut offsets = FieldOffsetTable::new();
        for (key, offset) in config.offset_overrides()? {
            tracing::info!("{} = {:#x} (manual)", key, offset);
            offsets.set(key, offset, Provenance::Manual);
        }

        Ok(Self {
            probe,
            codec,
            module,
            objects,
            names,
            config,
            offsets,
            traits: LayoutTraits::default(),
            dispatch: None,
        })
    }

    pub fn probe(&self) -> &MemoryProbe {
        &self.probe
    }

    pub fn codec(&self) -> &DecodeTable {
        &self.codec
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn object_table(&self) -> &ObjectTable {
        &self.objects
    }

    pub fn name_table(&self) -> &NameTable {
        &self.names
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn offsets(&self) -> &FieldOffsetTable {
        &self.offsets
    }

    pub fn traits(&self) -> &LayoutTraits {
        &self.traits
    }

    pub fn dispatch(&self) -> Option<&DispatchInfo> {
        self.dispatch.as_ref()
    }

    /// Every valid object in the object array, in slot order
    pub fn objects(&self) -> impl Iterator<Item = ObjectView<'_>> + '_ {
        self.objects
            .iter()
            .filter_map(move |(_, address)| ObjectView::new(self, address))
    }

    /// The object in slot `index`, if it is populated and valid
    pub fn object_by_index(&self, index: usize) -> Option<ObjectView<'_>> {
        ObjectView::new(self, self.objects.get_by_index(index)?)
    }

    #[inline]
    pub(crate) fn field(&self, key: FieldKey) -> Option<usize> {
        self.offsets.get(key)
    }

    /// `base + offset(key)`, or `None` if the offset is unknown or the sum
    /// leaves the address space
    #[inline]
    pub(crate) fn field_address(&self, base: usize, key: FieldKey) -> Option<usize> {
        base.checked_add(self.field(key)?)
    }

    /// Decoded, non-null pointer stored at `base + offset(key)`
    pub(crate) fn read_ptr(&self, base: usize, key: FieldKey, codec: CodecField) -> Option<usize> {
        let raw = self.probe.read_ptr(self.field_address(base, key)?)?;
        Some(self.codec.decode_ptr(codec, raw)).filter(|&p| p != 0)
    }

    pub(crate) fn read_i32(&self, base: usize, key: FieldKey) -> Option<i32> {
        self.probe.read_i32(self.field_address(base, key)?)
    }

    pub(crate) fn read_u32(&self, base: usize, key: FieldKey) -> Option<u32> {
        self.probe.read_u32(self.field_address(base, key)?)
    }

    pub(crate) fn read_u64(&self, base: usize, key: FieldKey) -> Option<u64> {
        self.probe.read_u64(self.field_address(base, key)?)
    }

    /// Decoded 32-bit value stored at `base + offset(key)`
    pub(crate) fn read_value(&self, base: usize, key: FieldKey, codec: CodecField) -> Option<u32> {
        let raw = self.probe.read_u32(self.field_address(base, key)?)?;
        Some(self.codec.decode(codec, raw as u64) as u32)
    }

    /// The FName stored at `address`, laid out per the discovered traits
    pub fn fname_at(&self, address: usize) -> Option<FName> {
        let index_offset = self.field(FieldKey::FNameComparisonIndex).unwrap_or(0);
        let raw = self.probe.read_u32(address.checked_add(index_offset)?)?;
        let comparison_index =
            self.codec.decode(CodecField::NameComparisonIndex, raw as u64) as u32;

        let number = match self.field(FieldKey::FNameNumber) {
            Some(offset) if !self.traits.name_layout.is_outline() => {
                let raw = self.probe.read_u32(address.checked_add(offset)?)?;
                self.codec.decode(CodecField::NameNumber, raw as u64) as u32
            }
            _ => 0,
        };

        Some(FName::new(comparison_index, number))
    }

    /// Display string of `name`, following outlined numbered entries
    pub fn resolve_name(&self, name: FName) -> Option<String> {
        let base = self.names.resolve(name.comparison_index)?;
        let number = self
            .names
            .outline_number(name.comparison_index)
            .unwrap_or(name.number);
        Some(names::format_name(&base, number))
    }
}
