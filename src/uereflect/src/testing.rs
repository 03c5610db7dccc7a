//! Synthetic targets for tests
//!
//! [`Heap`] lays bytes out at fixed addresses and the writers on top of it
//! produce the table shapes discovery looks for. [`engine_fixture`] builds a
//! whole image: a PE module whose `.data` holds the object array, the name
//! pool and the vtables, followed by a heap of reflection objects.
//!
//! Layout of the fixture objects:
//!
//! | type       | fields |
//! |------------|--------|
//! | UObject    | vft 0, flags 8, index 0xC, class 0x10, name 0x18, outer 0x20 |
//! | UField     | next 0x28 |
//! | UStruct    | super 0x30, children 0x38, child properties 0x40, size 0x48, alignment 0x4C |
//! | UFunction  | flags 0x60, exec 0x68 |
//! | UClass     | cast flags 0x60, default object 0x68, interfaces 0x80 |
//! | UEnum      | names 0x40 |
//! | UProperty  | array dim 0x30, element size 0x34, flags 0x38, offset 0x44, payload 0x70 |
//! | FField     | vft 0, class 8, owner 0x10 + flag 0x18, next 0x20, name 0x28, flags 0x30 |
//! | FProperty  | array dim 0x38, element size 0x3C, flags 0x40, offset 0x4C, payload 0x78 |

use crate::config::{DecodePreset, DiscoveryConfig};
use crate::discovery::{DispatchInfo, Invoker, Pipeline};
use crate::flags::{CastFlags, FunctionFlags, PropertyFlags};
use crate::offsets::FieldModel;
use crate::schema::DiscoveredSchema;
use crate::source::tests::MockMemorySource;
use crate::source::MemorySource;

use byteorder::{ByteOrder, LE};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

/// Byte buffer mapped at a fixed address, with bump allocation
#[derive(Debug, Clone)]
pub struct Heap {
    base: usize,
    data: Vec<u8>,
    cursor: usize,
}

impl Heap {
    pub fn new(base: usize, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
            cursor: 0,
        }
    }

    /// Keep the first `offset` bytes out of [`alloc`](Self::alloc)
    pub fn reserve(&mut self, offset: usize) {
        self.cursor = self.cursor.max(offset);
    }

    /// Zeroed, 16 byte aligned block
    pub fn alloc(&mut self, size: usize) -> usize {
        let start = self.cursor.next_multiple_of(16);
        assert!(
            start + size <= self.data.len(),
            "heap exhausted: {:#x} + {:#x} > {:#x}",
            start,
            size,
            self.data.len()
        );
        self.cursor = start + size.max(1);
        self.base + start
    }

    fn bytes_mut(&mut self, address: usize, len: usize) -> &mut [u8] {
        let offset = address - self.base;
        &mut self.data[offset..offset + len]
    }

    fn bytes(&self, address: usize, len: usize) -> &[u8] {
        let offset = address - self.base;
        &self.data[offset..offset + len]
    }

    pub fn write_bytes(&mut self, address: usize, bytes: &[u8]) {
        self.bytes_mut(address, bytes.len()).copy_from_slice(bytes);
    }

    pub fn write_u8(&mut self, address: usize, value: u8) {
        self.bytes_mut(address, 1)[0] = value;
    }

    pub fn write_u32(&mut self, address: usize, value: u32) {
        LE::write_u32(self.bytes_mut(address, 4), value);
    }

    pub fn write_i32(&mut self, address: usize, value: i32) {
        LE::write_i32(self.bytes_mut(address, 4), value);
    }

    pub fn write_u64(&mut self, address: usize, value: u64) {
        LE::write_u64(self.bytes_mut(address, 8), value);
    }

    pub fn write_ptr(&mut self, address: usize, value: usize) {
        self.write_u64(address, value as u64);
    }

    pub fn read_u32(&self, address: usize) -> u32 {
        LE::read_u32(self.bytes(address, 4))
    }

    pub fn read_ptr(&self, address: usize) -> usize {
        LE::read_u64(self.bytes(address, 8)) as usize
    }

    /// One readable region covering the whole buffer
    pub fn into_source(self) -> MockMemorySource {
        MockMemorySource::new(self.data, self.base)
    }
}

/// FChunkedFixedUObjectArray header: chunk table, then the four counts
pub fn write_chunked_header(
    heap: &mut Heap,
    header: usize,
    chunks: usize,
    max_elements: i32,
    num_elements: i32,
    max_chunks: i32,
    num_chunks: i32,
) {
    heap.write_ptr(header, chunks);
    heap.write_i32(header + 0x10, max_elements);
    heap.write_i32(header + 0x14, num_elements);
    heap.write_i32(header + 0x18, max_chunks);
    heap.write_i32(header + 0x1C, num_chunks);
}

const SECTION_HEADER_SIZE: usize = 40;
const PE_HEADER_OFFSET: usize = 0x80;
const OPTIONAL_HEADER_SIZE: usize = 0xF0;

/// DOS stub, PE header and section table for a 64-bit image.
/// Sections are `(name, rva, size, characteristics)`.
pub fn write_pe_header(
    image: &mut [u8],
    size_of_image: usize,
    sections: &[(&str, usize, usize, u32)],
) {
    image[..2].copy_from_slice(b"MZ");
    LE::write_u32(&mut image[0x3C..], PE_HEADER_OFFSET as u32);

    let pe = PE_HEADER_OFFSET;
    image[pe..pe + 4].copy_from_slice(b"PE\0\0");
    LE::write_u16(&mut image[pe + 4..], 0x8664);
    LE::write_u16(&mut image[pe + 6..], sections.len() as u16);
    LE::write_u16(&mut image[pe + 20..], OPTIONAL_HEADER_SIZE as u16);
    LE::write_u16(&mut image[pe + 24..], 0x20B);
    LE::write_u32(&mut image[pe + 24 + 56..], size_of_image as u32);

    let table = pe + 24 + OPTIONAL_HEADER_SIZE;
    for (i, &(name, rva, size, characteristics)) in sections.iter().enumerate() {
        let entry = table + i * SECTION_HEADER_SIZE;
        let name = name.as_bytes();
        image[entry..entry + name.len().min(8)].copy_from_slice(&name[..name.len().min(8)]);
        LE::write_u32(&mut image[entry + 8..], size as u32);
        LE::write_u32(&mut image[entry + 12..], rva as u32);
        LE::write_u32(&mut image[entry + 16..], size as u32);
        LE::write_u32(&mut image[entry + 20..], rva as u32);
        LE::write_u32(&mut image[entry + 36..], characteristics);
    }
}

/// Entry header shapes of FNamePool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEntryStyle {
    /// 2 byte header, `len << 6 | wide`
    Ue5,
    /// 4 byte hash before a 2 byte `len << 1 | wide` header
    WithHash,
}

impl PoolEntryStyle {
    fn stride(self) -> usize {
        match self {
            Self::Ue5 => 2,
            Self::WithHash => 4,
        }
    }
}

/// Pool block being filled, one entry per distinct name
#[derive(Debug)]
struct PoolBuilder {
    style: PoolEntryStyle,
    block: Vec<u8>,
    indices: HashMap<String, u32>,
}

impl PoolBuilder {
    fn new(style: PoolEntryStyle) -> Self {
        Self {
            style,
            block: Vec::new(),
            indices: HashMap::new(),
        }
    }

    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&index) = self.indices.get(name) {
            return index;
        }
        let stride = self.style.stride();
        let index = (self.block.len() / stride) as u32;
        let len = name.len() as u16;
        match self.style {
            PoolEntryStyle::Ue5 => self.block.extend((len << 6).to_le_bytes()),
            PoolEntryStyle::WithHash => {
                self.block.extend([0u8; 4]);
                self.block.extend((len << 1).to_le_bytes());
            }
        }
        self.block.extend(name.as_bytes());
        self.block.resize(self.block.len().next_multiple_of(stride), 0);
        self.indices.insert(name.to_string(), index);
        index
    }

    /// Block 0 on the heap, and the pool header at `header`
    fn write(&self, heap: &mut Heap, header: usize) {
        let block = heap.alloc(self.block.len().max(0x40));
        heap.write_bytes(block, &self.block);
        heap.write_u64(header, 0);
        heap.write_u32(header + 8, 0);
        heap.write_u32(header + 0xC, self.block.len() as u32);
        heap.write_ptr(header + 0x10, block);
    }
}

/// FNamePool with `names` in one block; returns the pool address and
/// each name's index
pub fn write_name_pool(
    heap: &mut Heap,
    names: &[&str],
    style: PoolEntryStyle,
) -> (usize, Vec<u32>) {
    let mut pool = PoolBuilder::new(style);
    let indices = names.iter().map(|name| pool.intern(name)).collect();
    let header = heap.alloc(0x20);
    pool.write(heap, header);
    (header, indices)
}

/// TNameEntryArray: one chunk of entry pointers, entries holding
/// `index << 1` at 8 and the ANSI string at 0xC
pub fn write_name_array(heap: &mut Heap, names: &[&str]) -> usize {
    let entries: Vec<usize> = names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let entry = heap.alloc((0xC + name.len() + 1).max(0x30));
            heap.write_u32(entry + 8, (index as u32) << 1);
            heap.write_bytes(entry + 0xC, name.as_bytes());
            entry
        })
        .collect();

    let chunk = heap.alloc(entries.len() * 8);
    for (i, &entry) in entries.iter().enumerate() {
        heap.write_ptr(chunk + i * 8, entry);
    }

    let base = heap.alloc(0x20);
    heap.write_ptr(base, chunk);
    heap.write_i32(base + 0x10, names.len() as i32);
    heap.write_i32(base + 0x14, 1);
    base
}

pub const IMAGE_BASE: usize = 0x7FF6_1000_0000;
const IMAGE_SIZE: usize = 0x4000;
const TEXT_RVA: usize = 0x1000;
const TEXT_SIZE: usize = 0x1000;
const DATA_RVA: usize = 0x2000;
const DATA_SIZE: usize = 0x2000;
const CODE_CHARACTERISTICS: u32 = 0x6000_0020;
const DATA_CHARACTERISTICS: u32 = 0xC000_0040;

const OBJECT_ARRAY_RVA: usize = DATA_RVA;
const NAME_POOL_RVA: usize = DATA_RVA + 0x40;
const OBJECT_VTABLE_RVA: usize = DATA_RVA + 0x100;
const FIELD_VTABLE_RVA: usize = DATA_RVA + 0x380;
const FIELD_CLASSES_RVA: usize = DATA_RVA + 0x400;
const ACCESSED_NONE_RVA: usize = DATA_RVA + 0x1800;

const EXEC_STUBS_RVA: usize = TEXT_RVA + 0x500;
const NAME_SIGNATURE_RVA: usize = TEXT_RVA + 0x700;
const ACCESSED_NONE_REFERENCE_RVA: usize = TEXT_RVA + 0xBC0;
const PROCESS_EVENT_RVA: usize = TEXT_RVA + 0xC00;

/// Vtable slot of the dispatch function in the fixture
pub const PROCESS_EVENT_INDEX: usize = 0x44;
const VTABLE_ENTRIES: usize = 0x48;

const OBJECT_FLAGS: u32 = 0x43;
const DEFAULT_OBJECT_FLAGS: u32 = 0x53;
const FIELD_FLAGS: u32 = 0x45;
const FLAT_ITEM_SIZE: usize = 24;

/// Module at [`IMAGE_BASE`] with empty sections; heap allocation starts
/// after the image
fn image_heap(heap_size: usize) -> Heap {
    let mut heap = Heap::new(IMAGE_BASE, IMAGE_SIZE + heap_size);
    write_pe_header(
        &mut heap.data[..IMAGE_SIZE],
        IMAGE_SIZE,
        &[
            (".text", TEXT_RVA, TEXT_SIZE, CODE_CHARACTERISTICS),
            (".data", DATA_RVA, DATA_SIZE, DATA_CHARACTERISTICS),
        ],
    );
    heap.data[TEXT_RVA..TEXT_RVA + TEXT_SIZE].fill(0xCC);
    heap.reserve(IMAGE_SIZE);
    heap
}

/// Vtable of `VTABLE_ENTRIES` one-byte functions, null terminated
fn write_vtable(heap: &mut Heap, vtable: usize) {
    for i in 0..VTABLE_ENTRIES {
        let function = IMAGE_BASE + TEXT_RVA + i * 0x10;
        heap.write_u8(function, 0xC3);
        heap.write_ptr(vtable + i * 8, function);
    }
}

/// `lea rcx, [rip + pool]; call ...; mov r8, rax; mov byte ptr [...]`
fn write_name_signature(heap: &mut Heap, pool: usize) {
    let at = IMAGE_BASE + NAME_SIGNATURE_RVA;
    let rel = (pool as i64 - (at + 7) as i64) as i32;
    heap.write_bytes(at, &[0x48, 0x8D, 0x0D]);
    heap.write_i32(at + 3, rel);
    heap.write_bytes(at + 7, &[0xE8, 0, 0, 0, 0, 0x4C, 0x8B, 0xC0, 0xC6, 0x05]);
}

fn write_flat_header(heap: &mut Heap, items: usize, count: usize) -> usize {
    let header = IMAGE_BASE + OBJECT_ARRAY_RVA;
    heap.write_ptr(header, items);
    heap.write_i32(header + 8, count.next_multiple_of(0x10) as i32);
    heap.write_i32(header + 0xC, count as i32);
    header
}

/// A module with a flat object array and a name pool in `.data`.
///
/// Objects have Flags at 0x8, Index at 0xC, Class at 0x10, Outer at 0x18
/// and Name at 0x20.
pub struct Image {
    pub source: MockMemorySource,
    pub object_table: usize,
    pub name_table: usize,
}

#[derive(Debug, Default)]
pub struct ImageBuilder {
    flat_objects: usize,
    name_signature: bool,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flat_objects(mut self, count: usize) -> Self {
        self.flat_objects = count;
        self
    }

    /// Reference the pool from `.text` the way FName's constructor does
    pub fn with_name_signature(mut self) -> Self {
        self.name_signature = true;
        self
    }

    pub fn build(self) -> Image {
        let mut heap = image_heap(0x10000);
        let vtable = IMAGE_BASE + OBJECT_VTABLE_RVA;
        write_vtable(&mut heap, vtable);

        let mut pool = PoolBuilder::new(PoolEntryStyle::Ue5);
        for name in ["None", "ByteProperty", "IntProperty", "Object", "Class", "Package"] {
            pool.intern(name);
        }

        // Slot 0 is a package (no outer), slot 1 the self-typed Class
        let items = heap.alloc((self.flat_objects * FLAT_ITEM_SIZE).max(FLAT_ITEM_SIZE));
        let objects: Vec<usize> = (0..self.flat_objects).map(|_| heap.alloc(0x30)).collect();
        for (index, &object) in objects.iter().enumerate() {
            heap.write_ptr(object, vtable);
            heap.write_u32(object + 8, OBJECT_FLAGS);
            heap.write_i32(object + 0xC, index as i32);
            if let Some(&class) = objects.get(1) {
                heap.write_ptr(object + 0x10, class);
            }
            if index > 0 {
                heap.write_ptr(object + 0x18, objects[0]);
            }
            let name = match index {
                0 => pool.intern("/Script/CoreUObject"),
                1 => pool.intern("Class"),
                _ => pool.intern(&format!("Object{index}")),
            };
            heap.write_u32(object + 0x20, name);
            heap.write_ptr(items + index * FLAT_ITEM_SIZE, object);
        }
        let object_table = write_flat_header(&mut heap, items, self.flat_objects);
        let name_table = IMAGE_BASE + NAME_POOL_RVA;
        pool.write(&mut heap, name_table);
        if self.name_signature {
            write_name_signature(&mut heap, name_table);
        }

        Image {
            source: heap.into_source(),
            object_table,
            name_table,
        }
    }
}

/// How the fixture's dispatch function can be recognised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchStyle {
    /// It tests FUNC_Native and FUNC_HasOutParms
    #[default]
    FlagTests,
    /// Only the "Accessed None" neighbour gives it away
    StringReference,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureOptions {
    pub model: FieldModel,
    pub dispatch: DispatchStyle,
    /// XOR key applied to every UObject::Class, UObject::Outer,
    /// UStruct::SuperStruct and FField::ClassPrivate in the image. The
    /// fixture config installs the matching decoders.
    pub pointer_key: Option<u64>,
}

/// Fields [`FixtureOptions::pointer_key`] encodes
pub const ENCODED_FIELDS: [&str; 4] = ["ObjectClass", "ObjectOuter", "StructSuper", "FFieldClass"];

/// Offset of Conv_StringToText's return value in its parameter block
const TEXT_RETURN_OFFSET: usize = 0x10;
const TEXT_MARKER: &str = "ThisIsAGoodString!";

/// Stands in for code execution: "runs" Conv_StringToText by writing a
/// prepared FText into the parameter block
#[derive(Debug)]
pub struct FakeInvoker {
    calls: Cell<usize>,
    staging: usize,
    text_data: usize,
}

impl FakeInvoker {
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Invoker for FakeInvoker {
    fn stage(&self, bytes: &[u8]) -> anyhow::Result<usize> {
        anyhow::ensure!(!bytes.is_empty(), "nothing to stage");
        Ok(self.staging)
    }

    fn call(
        &self,
        dispatch: &DispatchInfo,
        _object: usize,
        _function: usize,
        params: &mut [u8],
    ) -> anyhow::Result<()> {
        anyhow::ensure!(
            dispatch.vtable_index == PROCESS_EVENT_INDEX,
            "called through vtable slot {:#x}",
            dispatch.vtable_index
        );
        anyhow::ensure!(params.len() >= TEXT_RETURN_OFFSET + 8, "parameter block too small");
        self.calls.set(self.calls.get() + 1);
        LE::write_u64(&mut params[TEXT_RETURN_OFFSET..], self.text_data as u64);
        Ok(())
    }
}

/// A synthetic engine and the addresses tests check against
pub struct EngineFixture {
    heap: Heap,
    source: Arc<dyn MemorySource>,
    config: DiscoveryConfig,
    objects: HashMap<String, usize>,
    /// Zeroed heap memory
    pub scratch: usize,
    pub process_event: usize,
    pub invoker: FakeInvoker,
}

impl EngineFixture {
    /// Address of an object (or FField) by display name, or by
    /// `Outer.Name`; the first one built under a name wins
    pub fn object(&self, name: &str) -> usize {
        match self.objects.get(name) {
            Some(&address) => address,
            None => panic!("fixture has no object {name:?}"),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn source(&self) -> Arc<dyn MemorySource> {
        Arc::clone(&self.source)
    }

    pub fn discovered(&self) -> DiscoveredSchema {
        let invoker: &dyn Invoker = &self.invoker;
        DiscoveredSchema::discover_with(
            self.source(),
            self.config.clone(),
            &Pipeline::standard(),
            Some(invoker),
        )
        .expect("fixture discovery")
    }

    pub fn discovered_without_invoker(&self) -> DiscoveredSchema {
        let pipeline = Pipeline::standard();
        DiscoveredSchema::discover_with(self.source(), self.config.clone(), &pipeline, None)
            .expect("fixture discovery")
    }

    /// A copy of the image with `patch` applied
    pub fn patched(&self, patch: impl FnOnce(&mut Heap)) -> Arc<dyn MemorySource> {
        let mut heap = self.heap.clone();
        patch(&mut heap);
        Arc::new(heap.into_source())
    }

    /// Discovery over `source` with every offset pinned to what the
    /// unmodified image yields
    pub fn rediscovered(&self, source: Arc<dyn MemorySource>) -> DiscoveredSchema {
        let mut config = self.config.clone();
        for (key, entry) in self.discovered().offsets().iter() {
            config.overrides.offsets.insert(key.to_string(), entry.offset);
        }
        DiscoveredSchema::discover_with(source, config, &Pipeline::standard(), Some(&self.invoker))
            .expect("pinned discovery")
    }
}

fn fixture_config() -> DiscoveryConfig {
    let mut config = DiscoveryConfig::default();
    config.bounds.flat_min_num = 0x20;
    config.heuristics.common_flag_threshold = 0x20;
    config.heuristics.name_min_average = 0x10;
    config
}

pub fn engine_fixture() -> EngineFixture {
    fixture_with(FixtureOptions::default())
}

pub fn fproperty_fixture() -> EngineFixture {
    fixture_with(FixtureOptions {
        model: FieldModel::FProperty,
        ..FixtureOptions::default()
    })
}

pub fn fixture_with(options: FixtureOptions) -> EngineFixture {
    let mut b = EngineBuilder::new(options.model);
    b.populate();
    b.finish(options)
}

const OBJECT_SIZE: usize = 0x28;
const STRUCT_SIZE: usize = 0x60;
const FUNCTION_SIZE: usize = 0x80;
const CLASS_SIZE: usize = 0x100;
const ENUM_SIZE: usize = 0x50;
const UPROPERTY_SIZE: usize = 0x80;
const FPROPERTY_SIZE: usize = 0x88;
const FIELD_CLASS_SIZE: usize = 0x28;

const OBJ_FLAGS: usize = 0x8;
const OBJ_INDEX: usize = 0xC;
const OBJ_CLASS: usize = 0x10;
const OBJ_NAME: usize = 0x18;
const OBJ_OUTER: usize = 0x20;
const FIELD_NEXT: usize = 0x28;
const STRUCT_SUPER: usize = 0x30;
const STRUCT_CHILDREN: usize = 0x38;
const STRUCT_CHILD_PROPERTIES: usize = 0x40;
const STRUCT_PROPERTIES_SIZE: usize = 0x48;
const STRUCT_MIN_ALIGNMENT: usize = 0x4C;
const FUNCTION_FLAGS: usize = 0x60;
const FUNCTION_EXEC: usize = 0x68;
const CLASS_CAST_FLAGS: usize = 0x60;
const CLASS_DEFAULT_OBJECT: usize = 0x68;
const CLASS_INTERFACES: usize = 0x80;
const ENUM_NAMES: usize = 0x40;

const FFIELD_CLASS: usize = 0x8;
const FFIELD_OWNER: usize = 0x10;
const FFIELD_OWNER_IS_OBJECT: usize = 0x18;
const FFIELD_NEXT: usize = 0x20;
const FFIELD_NAME: usize = 0x28;
const FFIELD_FLAGS: usize = 0x30;

/// Where the property body starts, and its per-type payload
fn property_layout(model: FieldModel) -> (usize, usize) {
    match model {
        FieldModel::UProperty => (0x30, 0x70),
        FieldModel::FProperty => (0x38, 0x78),
    }
}

fn plain_flags() -> PropertyFlags {
    PropertyFlags::EDIT
        | PropertyFlags::ZERO_CONSTRUCTOR
        | PropertyFlags::SAVE_GAME
        | PropertyFlags::IS_PLAIN_OLD_DATA
        | PropertyFlags::NO_DESTRUCTOR
        | PropertyFlags::HAS_GET_VALUE_TYPE_HASH
}

fn visible_flags() -> PropertyFlags {
    plain_flags() | PropertyFlags::BLUEPRINT_VISIBLE
}

fn param_flags() -> PropertyFlags {
    PropertyFlags::PARM | PropertyFlags::ZERO_CONSTRUCTOR | PropertyFlags::IS_PLAIN_OLD_DATA
}

fn return_flags() -> PropertyFlags {
    param_flags() | PropertyFlags::OUT_PARM | PropertyFlags::RETURN_PARM
}

const PROPERTY_TYPES: [&str; 14] = [
    "ByteProperty",
    "IntProperty",
    "FloatProperty",
    "DoubleProperty",
    "BoolProperty",
    "NameProperty",
    "StrProperty",
    "TextProperty",
    "ObjectProperty",
    "ClassProperty",
    "StructProperty",
    "ArrayProperty",
    "EnumProperty",
    "DelegateProperty",
];

fn property_cast_flags(kind: &str) -> CastFlags {
    let numeric = CastFlags::NUMERIC_PROPERTY;
    let object = CastFlags::OBJECT_PROPERTY | CastFlags::OBJECT_PROPERTY_BASE;
    let specific = match kind {
        "ByteProperty" => CastFlags::BYTE_PROPERTY | numeric,
        "IntProperty" => CastFlags::INT_PROPERTY | numeric,
        "FloatProperty" => CastFlags::FLOAT_PROPERTY | numeric,
        "DoubleProperty" => CastFlags::DOUBLE_PROPERTY | numeric,
        "BoolProperty" => CastFlags::BOOL_PROPERTY,
        "NameProperty" => CastFlags::NAME_PROPERTY,
        "StrProperty" => CastFlags::STR_PROPERTY,
        "TextProperty" => CastFlags::TEXT_PROPERTY,
        "ObjectProperty" => object,
        "ClassProperty" => CastFlags::CLASS_PROPERTY | object,
        "StructProperty" => CastFlags::STRUCT_PROPERTY,
        "ArrayProperty" => CastFlags::ARRAY_PROPERTY,
        "EnumProperty" => CastFlags::ENUM_PROPERTY,
        "DelegateProperty" => CastFlags::DELEGATE_PROPERTY,
        _ => CastFlags::empty(),
    };
    CastFlags::PROPERTY | specific
}

/// A member to add to a struct or function
struct Member<'a> {
    name: &'a str,
    kind: &'a str,
    offset: i32,
    element_size: i32,
    flags: PropertyFlags,
}

impl<'a> Member<'a> {
    fn new(name: &'a str, kind: &'a str, offset: i32, element_size: i32) -> Self {
        Self {
            name,
            kind,
            offset,
            element_size,
            flags: PropertyFlags::EDIT | PropertyFlags::BLUEPRINT_VISIBLE,
        }
    }

    fn flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Builds the synthetic engine object by object
struct EngineBuilder {
    heap: Heap,
    model: FieldModel,
    names: PoolBuilder,
    objects: Vec<usize>,
    by_name: HashMap<String, usize>,
    display: HashMap<usize, String>,
    vtable: usize,
    field_vtable: usize,
    next_field_class: usize,
    field_classes: HashMap<String, usize>,
    classes: HashMap<String, usize>,
    class_class: usize,
    last_child: HashMap<usize, usize>,
    last_property: HashMap<usize, usize>,
    next_exec: usize,
    structs: Vec<usize>,
    fields: Vec<usize>,
}

impl EngineBuilder {
    fn new(model: FieldModel) -> Self {
        let mut heap = image_heap(0x40000);
        let vtable = IMAGE_BASE + OBJECT_VTABLE_RVA;
        write_vtable(&mut heap, vtable);
        let field_vtable = IMAGE_BASE + FIELD_VTABLE_RVA;
        for i in 0..4 {
            heap.write_ptr(field_vtable + i * 8, IMAGE_BASE + TEXT_RVA + i * 0x10);
        }

        let mut names = PoolBuilder::new(PoolEntryStyle::Ue5);
        names.intern("None");
        names.intern("ByteProperty");

        Self {
            heap,
            model,
            names,
            objects: Vec::new(),
            by_name: HashMap::new(),
            display: HashMap::new(),
            vtable,
            field_vtable,
            next_field_class: IMAGE_BASE + FIELD_CLASSES_RVA,
            field_classes: HashMap::new(),
            classes: HashMap::new(),
            class_class: 0,
            last_child: HashMap::new(),
            last_property: HashMap::new(),
            next_exec: IMAGE_BASE + EXEC_STUBS_RVA,
            structs: Vec::new(),
            fields: Vec::new(),
        }
    }

    fn register(&mut self, address: usize, name: &str, number: u32, outer: usize) {
        let display = if number == 0 {
            name.to_string()
        } else {
            format!("{}_{}", name, number - 1)
        };
        if let Some(outer) = self.display.get(&outer) {
            let qualified = format!("{outer}.{display}");
            self.by_name.entry(qualified).or_insert(address);
        }
        self.by_name.entry(display.clone()).or_insert(address);
        self.display.insert(address, display);
    }

    fn object(
        &mut self,
        class: usize,
        name: &str,
        number: u32,
        outer: usize,
        size: usize,
        flags: u32,
    ) -> usize {
        let address = self.heap.alloc(size);
        let index = self.names.intern(name);
        self.heap.write_ptr(address, self.vtable);
        self.heap.write_u32(address + OBJ_FLAGS, flags);
        self.heap.write_i32(address + OBJ_INDEX, self.objects.len() as i32);
        self.heap.write_ptr(address + OBJ_CLASS, class);
        self.heap.write_u32(address + OBJ_NAME, index);
        self.heap.write_u32(address + OBJ_NAME + 4, number);
        self.heap.write_ptr(address + OBJ_OUTER, outer);
        self.objects.push(address);
        self.register(address, name, number, outer);
        address
    }

    fn class_named(&self, name: &str) -> usize {
        match self.classes.get(name) {
            Some(&class) => class,
            None => panic!("class {name} used before it was built"),
        }
    }

    fn set_class(&mut self, object: usize, class: usize) {
        self.heap.write_ptr(object + OBJ_CLASS, class);
    }

    fn write_struct(&mut self, address: usize, super_struct: usize, size: i32, alignment: i32) {
        self.heap.write_ptr(address + STRUCT_SUPER, super_struct);
        self.structs.push(address);
        self.heap.write_i32(address + STRUCT_PROPERTIES_SIZE, size);
        self.heap.write_i32(address + STRUCT_MIN_ALIGNMENT, alignment);
    }

    fn class(
        &mut self,
        name: &str,
        super_class: &str,
        package: usize,
        cast: CastFlags,
        size: i32,
    ) -> usize {
        let super_class = if super_class.is_empty() { 0 } else { self.class_named(super_class) };
        let address = self.object(self.class_class, name, 0, package, CLASS_SIZE, OBJECT_FLAGS);
        self.write_struct(address, super_class, size, 8);
        self.heap.write_u64(address + CLASS_CAST_FLAGS, cast.bits());
        self.classes.insert(name.to_string(), address);
        address
    }

    fn script_struct(&mut self, name: &str, package: usize, size: i32, alignment: i32) -> usize {
        let class = self.class_named("ScriptStruct");
        let address = self.object(class, name, 0, package, STRUCT_SIZE, OBJECT_FLAGS);
        self.write_struct(address, 0, size, alignment);
        address
    }

    fn default_object(&mut self, class_name: &str, package: usize) -> usize {
        let class = self.class_named(class_name);
        let name = format!("Default__{class_name}");
        let address = self.object(class, &name, 0, package, OBJECT_SIZE, DEFAULT_OBJECT_FLAGS);
        self.heap.write_ptr(class + CLASS_DEFAULT_OBJECT, address);
        address
    }

    fn enumeration(&mut self, name: &str, package: usize, entries: &[&str]) -> usize {
        let class = self.class_named("Enum");
        let address = self.object(class, name, 0, package, ENUM_SIZE, OBJECT_FLAGS);
        let data = self.heap.alloc(entries.len() * 0x10);
        for (value, entry) in entries.iter().enumerate() {
            let index = self.names.intern(entry);
            self.heap.write_u32(data + value * 0x10, index);
            self.heap.write_u64(data + value * 0x10 + 8, value as u64);
        }
        self.heap.write_ptr(address + ENUM_NAMES, data);
        self.heap.write_i32(address + ENUM_NAMES + 8, entries.len() as i32);
        self.heap.write_i32(address + ENUM_NAMES + 0xC, entries.len() as i32);
        address
    }

    /// Append to the UField chain under `owner`
    fn link_child(&mut self, owner: usize, child: usize) {
        match self.last_child.insert(owner, child) {
            Some(last) => self.heap.write_ptr(last + FIELD_NEXT, child),
            None => self.heap.write_ptr(owner + STRUCT_CHILDREN, child),
        }
    }

    /// Append to the FField chain under `owner`
    fn link_property(&mut self, owner: usize, field: usize) {
        match self.last_property.insert(owner, field) {
            Some(last) => self.heap.write_ptr(last + FFIELD_NEXT, field),
            None => self.heap.write_ptr(owner + STRUCT_CHILD_PROPERTIES, field),
        }
    }

    fn function_object(
        &mut self,
        class_name: &str,
        owner: usize,
        name: &str,
        flags: FunctionFlags,
        size: i32,
    ) -> usize {
        let class = self.class_named(class_name);
        let address = self.object(class, name, 0, owner, FUNCTION_SIZE, OBJECT_FLAGS);
        self.write_struct(address, 0, size, 8);
        self.heap.write_u32(address + FUNCTION_FLAGS, flags.bits());

        let exec = self.next_exec;
        self.next_exec += 0x10;
        self.heap.write_u8(exec, 0xC3);
        self.heap.write_ptr(address + FUNCTION_EXEC, exec);
        address
    }

    fn function(
        &mut self,
        owner: usize,
        name: &str,
        flags: FunctionFlags,
        params: &[Member<'_>],
    ) -> usize {
        let size = params.iter().map(|p| p.offset + p.element_size).max().unwrap_or(0);
        let function = self.function_object("Function", owner, name, flags, (size + 7) & !7);
        self.link_child(owner, function);
        for param in params {
            self.member(function, param, &[]);
        }
        function
    }

    fn field_class(&mut self, name: &str, cast: CastFlags, super_class: usize) -> usize {
        let address = self.next_field_class;
        self.next_field_class += FIELD_CLASS_SIZE;
        assert!(address + FIELD_CLASS_SIZE <= IMAGE_BASE + DATA_RVA + DATA_SIZE);

        let index = self.names.intern(name);
        self.heap.write_u32(address, index);
        self.heap.write_u64(address + 8, self.field_classes.len() as u64 + 1);
        self.heap.write_u64(address + 0x10, cast.bits());
        self.heap.write_ptr(address + 0x20, super_class);
        self.field_classes.insert(name.to_string(), address);
        address
    }

    /// The property object or field itself, with its base body written
    fn new_property(&mut self, owner: usize, owner_is_object: bool, member: &Member<'_>) -> usize {
        let (body, _) = property_layout(self.model);
        let address = match self.model {
            FieldModel::UProperty => {
                let class = self.class_named(member.kind);
                self.object(class, member.name, 0, owner, UPROPERTY_SIZE, OBJECT_FLAGS)
            }
            FieldModel::FProperty => {
                let class = match self.field_classes.get(member.kind) {
                    Some(&class) => class,
                    None => panic!("no field class {}", member.kind),
                };
                let address = self.heap.alloc(FPROPERTY_SIZE);
                self.heap.write_ptr(address, self.field_vtable);
                self.heap.write_ptr(address + FFIELD_CLASS, class);
                self.heap.write_ptr(address + FFIELD_OWNER, owner);
                self.heap.write_u8(address + FFIELD_OWNER_IS_OBJECT, u8::from(owner_is_object));
                let index = self.names.intern(member.name);
                self.heap.write_u32(address + FFIELD_NAME, index);
                self.heap.write_u32(address + FFIELD_FLAGS, FIELD_FLAGS);
                self.register(address, member.name, 0, owner);
                self.fields.push(address);
                address
            }
        };

        self.heap.write_i32(address + body, 1);
        self.heap.write_i32(address + body + 4, member.element_size);
        self.heap.write_u64(address + body + 8, member.flags.bits());
        self.heap.write_i32(address + body + 0x14, member.offset);
        address
    }

    /// A linked member of `owner` with `payload` pointers after the body
    fn member(&mut self, owner: usize, member: &Member<'_>, payload: &[usize]) -> usize {
        let address = self.new_property(owner, true, member);
        match self.model {
            FieldModel::UProperty => self.link_child(owner, address),
            FieldModel::FProperty => self.link_property(owner, address),
        }
        let (_, start) = property_layout(self.model);
        for (i, &pointer) in payload.iter().enumerate() {
            self.heap.write_ptr(address + start + i * 8, pointer);
        }
        address
    }

    /// Property owned by another property, outside any member chain
    fn inner(&mut self, parent: usize, member: &Member<'_>) -> usize {
        let owner_is_object = self.model == FieldModel::UProperty;
        self.new_property(parent, owner_is_object, member)
    }

    fn bool_member(&mut self, owner: usize, name: &str, offset: i32, packing: [u8; 4]) -> usize {
        let address = self.member(owner, &Member::new(name, "BoolProperty", offset, 1), &[]);
        let (_, start) = property_layout(self.model);
        self.heap.write_bytes(address + start, &packing);
        address
    }

    fn array_member(
        &mut self,
        owner: usize,
        name: &str,
        offset: i32,
        inner_kind: &str,
        inner_size: i32,
    ) -> usize {
        let array = self.member(owner, &Member::new(name, "ArrayProperty", offset, 0x10), &[]);
        let inner = self.inner(array, &Member::new(name, inner_kind, 0, inner_size));
        let (_, start) = property_layout(self.model);
        self.heap.write_ptr(array + start, inner);
        array
    }

    fn enum_member(&mut self, owner: usize, name: &str, offset: i32, enumeration: usize) -> usize {
        let property = self.member(owner, &Member::new(name, "EnumProperty", offset, 1), &[]);
        let underlying = self.inner(property, &Member::new("UnderlyingType", "ByteProperty", 0, 1));
        let (_, start) = property_layout(self.model);
        self.heap.write_ptr(property + start, underlying);
        self.heap.write_ptr(property + start + 8, enumeration);
        property
    }

    fn instances(&mut self, class_name: &str, outer: usize, count: u32) {
        let class = self.class_named(class_name);
        for number in 1..=count {
            self.object(class, class_name, number, outer, 0x40, OBJECT_FLAGS);
        }
    }

    /// Everything discovery and the view tests look at
    fn populate(&mut self) {
        let core = self.object(0, "/Script/CoreUObject", 0, 0, OBJECT_SIZE, OBJECT_FLAGS);
        let engine = self.object(0, "/Script/Engine", 0, 0, OBJECT_SIZE, OBJECT_FLAGS);
        let temp = self.object(0, "/Temp/Untitled", 0, 0, OBJECT_SIZE, OBJECT_FLAGS);

        let field = CastFlags::FIELD;
        let structure = field | CastFlags::STRUCT;
        self.class("Object", "", core, CastFlags::empty(), 0x28);
        self.class("Field", "Object", core, field, 0x30);
        self.class("Struct", "Field", core, structure, 0xB0);
        let class = self.class("Class", "Struct", core, structure | CastFlags::CLASS, 0x200);
        self.class_class = class;
        let bootstrap = self.objects[3..].to_vec();
        for address in bootstrap {
            self.set_class(address, class);
        }
        let package = self.class("Package", "Object", core, CastFlags::PACKAGE, 0x80);
        for address in [core, engine, temp] {
            self.set_class(address, package);
        }
        self.class("ScriptStruct", "Struct", core, structure | CastFlags::SCRIPT_STRUCT, 0xC0);
        self.class("Function", "Struct", core, structure | CastFlags::FUNCTION, 0xE0);
        let delegate = structure | CastFlags::FUNCTION | CastFlags::DELEGATE_FUNCTION;
        self.class("DelegateFunction", "Function", core, delegate, 0xF0);
        self.class("Enum", "Field", core, field | CastFlags::ENUM, 0x60);
        self.class("Interface", "Object", core, CastFlags::empty(), 0x28);

        match self.model {
            FieldModel::UProperty => {
                self.class("Property", "Field", core, field | CastFlags::PROPERTY, 0x70);
                for kind in PROPERTY_TYPES {
                    self.class(kind, "Property", core, field | property_cast_flags(kind), 0x78);
                }
            }
            FieldModel::FProperty => {
                let base = self.field_class("Property", CastFlags::PROPERTY, 0);
                for kind in PROPERTY_TYPES {
                    self.field_class(kind, property_cast_flags(kind), base);
                }
            }
        }
        self.default_object("Object", core);
        self.default_object("Field", core);

        self.core_structs(core);
        self.engine_types(engine);
        self.gameplay_classes(engine);
        self.libraries(engine);

        let world_class = self.class_named("World");
        let world = self.object(world_class, "Untitled", 0, temp, 0x40, OBJECT_FLAGS);
        let level_class = self.class_named("Level");
        let level = self.object(level_class, "PersistentLevel", 0, world, 0x40, OBJECT_FLAGS);
        self.instances("Actor", level, 4);
        self.instances("PlayerStart", level, 4);
        self.instances("Pawn", level, 4);
    }

    fn core_structs(&mut self, core: usize) {
        let double = PropertyFlags::EDIT
            | PropertyFlags::BLUEPRINT_VISIBLE
            | PropertyFlags::IS_PLAIN_OLD_DATA;

        let vector = self.script_struct("Vector", core, 0x18, 8);
        for (i, name) in ["X", "Y", "Z"].into_iter().enumerate() {
            let component = Member::new(name, "DoubleProperty", i as i32 * 8, 8).flags(double);
            self.member(vector, &component, &[]);
        }
        let vector4 = self.script_struct("Vector4", core, 0x20, 0x10);
        for (i, name) in ["X", "Y", "Z", "W"].into_iter().enumerate() {
            let component = Member::new(name, "DoubleProperty", i as i32 * 8, 8).flags(double);
            self.member(vector4, &component, &[]);
        }
        let vector2d = self.script_struct("Vector2D", core, 0x10, 8);
        for (i, name) in ["X", "Y"].into_iter().enumerate() {
            let component = Member::new(name, "DoubleProperty", i as i32 * 8, 8).flags(double);
            self.member(vector2d, &component, &[]);
        }

        let guid = self.script_struct("Guid", core, 0x10, 4);
        for (i, name) in ["A", "B", "C", "D"].into_iter().enumerate() {
            let component = Member::new(name, "IntProperty", i as i32 * 4, 4).flags(plain_flags());
            self.member(guid, &component, &[]);
        }
        let color = self.script_struct("Color", core, 4, 4);
        for (i, name) in ["B", "G", "R", "A"].into_iter().enumerate() {
            let component = Member::new(name, "ByteProperty", i as i32, 1).flags(visible_flags());
            self.member(color, &component, &[]);
        }

        self.script_struct("Transform", core, 0x60, 0x10);
        let two_vectors = self.script_struct("TwoVectors", core, 0x30, 8);
        self.member(two_vectors, &Member::new("v1", "StructProperty", 0, 0x18), &[vector]);
        self.member(two_vectors, &Member::new("v2", "StructProperty", 0x18, 0x18), &[vector]);
    }

    fn engine_types(&mut self, engine: usize) {
        self.enumeration(
            "ENetRole",
            engine,
            &[
                "ROLE_None",
                "ROLE_SimulatedProxy",
                "ROLE_AutonomousProxy",
                "ROLE_Authority",
                "ROLE_MAX",
            ],
        );
        let trace: Vec<String> = (1..=33)
            .map(|i| format!("TraceTypeQuery{i}"))
            .chain(std::iter::once("TraceTypeQuery_MAX".to_string()))
            .collect();
        let trace: Vec<&str> = trace.iter().map(String::as_str).collect();
        self.enumeration("ETraceTypeQuery", engine, &trace);
        let responses = ["ECR_Ignore", "ECR_Overlap", "ECR_Block", "ECR_MAX"];
        self.enumeration("ECollisionResponse", engine, &responses);
        self.enumeration(
            "EComponentCreationMethod",
            engine,
            &["Native", "SimpleConstructionScript", "UserConstructionScript", "Instance"],
        );
        self.enumeration(
            "EAutoPossessAI",
            engine,
            &["Disabled", "PlacedInWorld", "Spawned", "PlacedInWorldOrSpawned"],
        );

        let response = self.by_name["ECollisionResponse"];
        let container = self.script_struct("CollisionResponseContainer", engine, 0x20, 1);
        for (name, offset) in [("GameTraceChannel1", 0x0E), ("GameTraceChannel2", 0x0F)] {
            self.member(container, &Member::new(name, "ByteProperty", offset, 1), &[response]);
        }

        self.function_object(
            "DelegateFunction",
            engine,
            "TimerDynamicDelegate__DelegateSignature",
            FunctionFlags::PUBLIC | FunctionFlags::DELEGATE,
            0,
        );
    }

    fn gameplay_classes(&mut self, engine: usize) {
        let actor = self.class("Actor", "Object", engine, CastFlags::ACTOR, 0x220);
        let pawn = self.class("Pawn", "Actor", engine, CastFlags::PAWN, 0x280);
        let player_state = self.class("PlayerState", "Actor", engine, CastFlags::empty(), 0x2A8);
        let component = self.class("ActorComponent", "Object", engine, CastFlags::empty(), 0xB0);
        let scene_cast = CastFlags::SCENE_COMPONENT;
        let scene = self.class("SceneComponent", "ActorComponent", engine, scene_cast, 0x220);
        let controller = self.class("Controller", "Actor", engine, CastFlags::empty(), 0x298);
        let player_controller = self.class(
            "PlayerController",
            "Controller",
            engine,
            CastFlags::PLAYER_CONTROLLER,
            0x570,
        );
        let level = self.class("Level", "Object", engine, CastFlags::LEVEL, 0x98);
        let world = self.class("World", "Object", engine, CastFlags::empty(), 0x7A0);
        let engine_class = self.class("Engine", "Object", engine, CastFlags::empty(), 0xE00);
        let player_start = self.class("PlayerStart", "Actor", engine, CastFlags::empty(), 0x2A0);
        let cheat_manager = self.class("CheatManager", "Object", engine, CastFlags::empty(), 0x88);
        let asset_user_data =
            self.class("Interface_AssetUserData", "Interface", engine, CastFlags::empty(), 0x28);

        let net_role = self.by_name["ENetRole"];
        self.member(actor, &Member::new("RemoteRole", "ByteProperty", 0x5D, 1), &[net_role]);
        self.array_member(actor, "Tags", 0x1E0, "NameProperty", 8);

        let possess = self.by_name["EAutoPossessAI"];
        self.enum_member(pawn, "AutoPossessAI", 0x260, possess);

        let creation = self.by_name["EComponentCreationMethod"];
        self.enum_member(component, "CreationMethod", 0xAC, creation);
        let interfaces = self.heap.alloc(0x10);
        self.heap.write_ptr(interfaces, asset_user_data);
        self.heap.write_ptr(component + CLASS_INTERFACES, interfaces);
        self.heap.write_i32(component + CLASS_INTERFACES + 8, 1);
        self.heap.write_i32(component + CLASS_INTERFACES + 0xC, 1);
        self.default_object("ActorComponent", engine);

        let references = [
            ("PlayerState", 0x228, player_state),
            ("Pawn", 0x250, pawn),
            ("TransformComponent", 0x270, scene),
        ];
        for (name, offset, class) in references {
            self.member(controller, &Member::new(name, "ObjectProperty", offset, 8), &[class]);
        }
        let callable =
            FunctionFlags::NATIVE | FunctionFlags::PUBLIC | FunctionFlags::BLUEPRINT_CALLABLE;
        self.function(controller, "UnPossess", callable, &[]);

        let pure =
            callable | FunctionFlags::FINAL | FunctionFlags::BLUEPRINT_PURE | FunctionFlags::CONST;
        self.function(
            player_controller,
            "WasInputKeyJustReleased",
            pure,
            &[
                Member::new("Key", "NameProperty", 0, 8).flags(param_flags()),
                Member::new("ReturnValue", "BoolProperty", 8, 1).flags(return_flags()),
            ],
        );
        self.function(
            player_controller,
            "WasInputKeyJustPressed",
            pure,
            &[
                Member::new("Key", "NameProperty", 0, 8).flags(param_flags()),
                Member::new("ReturnValue", "BoolProperty", 8, 1).flags(return_flags()),
            ],
        );
        let exec = FunctionFlags::EXEC | FunctionFlags::NATIVE | FunctionFlags::PUBLIC;
        self.function(
            player_controller,
            "ToggleSpeaking",
            exec,
            &[Member::new("bInSpeaking", "BoolProperty", 0, 1).flags(param_flags())],
        );
        self.function(
            player_controller,
            "SwitchLevel",
            exec,
            &[Member::new("URL", "StrProperty", 0, 0x10).flags(param_flags())],
        );
        let camera = "bAutoManageActiveCameraTarget";
        self.bool_member(player_controller, camera, 0x2F8, [1, 0, 1, 0xFF]);
        let class = self.class_class;
        self.member(
            player_controller,
            &Member::new("CheatClass", "ClassProperty", 0x350, 8),
            &[class, cheat_manager],
        );
        self.default_object("PlayerController", engine);

        self.member(world, &Member::new("PersistentLevel", "ObjectProperty", 0x30, 8), &[level]);
        self.bool_member(engine_class, "bIsOverridingSelectedColor", 0x4B0, [1, 0, 1, 0xFF]);
        self.bool_member(engine_class, "bEnableOnScreenDebugMessagesDisplay", 0x4B4, [1, 0, 2, 2]);
        self.member(player_start, &Member::new("PlayerStartTag", "NameProperty", 0x298, 8), &[]);
    }

    fn libraries(&mut self, engine: usize) {
        self.class("BlueprintFunctionLibrary", "Object", engine, CastFlags::empty(), 0x28);
        let mut library = |name: &str| {
            self.class(name, "BlueprintFunctionLibrary", engine, CastFlags::empty(), 0x28)
        };
        let system = library("KismetSystemLibrary");
        let string = library("KismetStringLibrary");
        let text = library("KismetTextLibrary");
        let signature = self.by_name["TimerDynamicDelegate__DelegateSignature"];
        let statics = FunctionFlags::FINAL
            | FunctionFlags::NATIVE
            | FunctionFlags::PUBLIC
            | FunctionFlags::BLUEPRINT_CALLABLE;

        for name in ["K2_GetTimerElapsedTimeDelegate", "K2_GetTimerRemainingTimeDelegate"] {
            let function = self.function(
                system,
                name,
                statics,
                &[Member::new("ReturnValue", "FloatProperty", 0x10, 4).flags(return_flags())],
            );
            let delegate =
                Member::new("Delegate", "DelegateProperty", 0, 0x10).flags(param_flags());
            self.member(function, &delegate, &[signature]);
        }

        for name in ["Concat_StrStr", "Len"] {
            self.function(
                string,
                name,
                statics | FunctionFlags::BLUEPRINT_PURE,
                &[
                    Member::new("S", "StrProperty", 0, 0x10).flags(param_flags()),
                    Member::new("ReturnValue", "IntProperty", 0x10, 4).flags(return_flags()),
                ],
            );
        }

        self.function(
            text,
            "Conv_StringToText",
            statics | FunctionFlags::BLUEPRINT_PURE,
            &[
                Member::new("InString", "StrProperty", 0, 0x10).flags(param_flags()),
                Member::new("ReturnValue", "TextProperty", TEXT_RETURN_OFFSET as i32, 0x18)
                    .flags(return_flags()),
            ],
        );
        self.default_object("KismetTextLibrary", engine);
    }

    /// XOR the encoded pointer fields in place
    fn encode_pointers(&mut self, key: u64) {
        let objects = self.objects.iter().flat_map(|&o| [o + OBJ_CLASS, o + OBJ_OUTER]);
        let supers = self.structs.iter().map(|&s| s + STRUCT_SUPER);
        let classes = self.fields.iter().map(|&f| f + FFIELD_CLASS);
        let slots: Vec<usize> = objects.chain(supers).chain(classes).collect();
        for slot in slots {
            let raw = self.heap.read_ptr(slot) as u64;
            self.heap.write_u64(slot, raw ^ key);
        }
    }

    /// Dispatch code, the object array, the pool, and the text the fake
    /// invoker hands back
    fn finish(mut self, options: FixtureOptions) -> EngineFixture {
        let process_event = IMAGE_BASE + PROCESS_EVENT_RVA;
        self.heap.write_ptr(self.vtable + PROCESS_EVENT_INDEX * 8, process_event);
        match options.dispatch {
            DispatchStyle::FlagTests => self.heap.write_bytes(
                process_event,
                &[
                    0x40, 0x55, // push rbp
                    0xF7, 0x81, 0x60, 0, 0, 0, 0, 0x04, 0, 0, // test [rcx+60h], FUNC_Native
                    0xF7, 0x81, 0x60, 0, 0, 0, 0, 0, 0x40, 0, // test [rcx+60h], FUNC_HasOutParms
                    0x5D, 0xC3,
                ],
            ),
            DispatchStyle::StringReference => {
                self.heap.write_bytes(process_event, &[0x40, 0x55, 0x48, 0x8B, 0xEC, 0x5D, 0xC3]);
            }
        }

        let string = IMAGE_BASE + ACCESSED_NONE_RVA;
        let wide: Vec<u8> = "Accessed None"
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(|c| c.to_le_bytes())
            .collect();
        self.heap.write_bytes(string, &wide);
        let reference = IMAGE_BASE + ACCESSED_NONE_REFERENCE_RVA;
        self.heap.write_bytes(reference, &[0x48, 0x8D, 0x0D]);
        self.heap.write_i32(reference + 3, (string - (reference + 7)) as i32);
        self.heap.write_bytes(reference + 7, &[0x5D, 0xC3]);

        let items = self.heap.alloc(self.objects.len() * FLAT_ITEM_SIZE);
        for (i, &object) in self.objects.iter().enumerate() {
            self.heap.write_ptr(items + i * FLAT_ITEM_SIZE, object);
        }
        write_flat_header(&mut self.heap, items, self.objects.len());

        let marker: Vec<u8> = TEXT_MARKER
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(|c| c.to_le_bytes())
            .collect();
        let chars = self.heap.alloc(marker.len());
        self.heap.write_bytes(chars, &marker);
        let text_data = self.heap.alloc(0x40);
        self.heap.write_ptr(text_data + 0x28, chars);
        self.heap.write_i32(text_data + 0x30, (marker.len() / 2) as i32);
        self.heap.write_i32(text_data + 0x34, (marker.len() / 2) as i32);
        let staging = self.heap.alloc(0x40);
        let scratch = self.heap.alloc(0x100);

        let pool = IMAGE_BASE + NAME_POOL_RVA;
        self.names.write(&mut self.heap, pool);
        write_name_signature(&mut self.heap, pool);

        let mut config = fixture_config();
        if let Some(key) = options.pointer_key {
            self.encode_pointers(key);
            for field in ENCODED_FIELDS {
                config
                    .overrides
                    .decode_fields
                    .insert(field.to_string(), DecodePreset::Xor { key });
            }
        }

        EngineFixture {
            source: Arc::new(self.heap.clone().into_source()),
            heap: self.heap,
            config,
            objects: self.by_name,
            scratch,
            process_event,
            invoker: FakeInvoker {
                calls: Cell::new(0),
                staging,
                text_data,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_alloc_is_aligned_and_zeroed() {
        let mut heap = Heap::new(0x1000, 0x100);
        let a = heap.alloc(3);
        let b = heap.alloc(8);
        assert_eq!(a, 0x1000);
        assert_eq!(b, 0x1010);
        heap.write_u32(b, 0xDEAD_BEEF);
        assert_eq!(heap.read_u32(b), 0xDEAD_BEEF);
        assert_eq!(heap.read_ptr(a), 0);
    }

    #[test]
    fn test_pool_indices_follow_stride() {
        let mut ue5 = PoolBuilder::new(PoolEntryStyle::Ue5);
        assert_eq!(ue5.intern("None"), 0);
        assert_eq!(ue5.intern("ByteProperty"), 3);
        assert_eq!(ue5.intern("None"), 0);

        let mut hashed = PoolBuilder::new(PoolEntryStyle::WithHash);
        assert_eq!(hashed.intern("None"), 0);
        assert_eq!(hashed.intern("ByteProperty"), 3);
    }

    #[test]
    fn test_fixture_registers_qualified_names() {
        let fx = engine_fixture();
        assert_ne!(fx.object("Vector.X"), fx.object("Vector4.X"));
        assert_eq!(fx.object("X"), fx.object("Vector.X"));
        assert_ne!(fx.object("Actor"), fx.object("Actor_2"));
    }
}
