//! The script dispatch function (UObject::ProcessEvent)
//!
//! Found in the vtable of the first object: it is the virtual that tests
//! `UFunction::FunctionFlags` against both FUNC_Native and FUNC_HasOutParms.
//! Failing that, it is the function laid out right after the one that
//! references the "Accessed None" warning.

use super::Discovery;
use crate::codec::CodecField;
use crate::error::{Error, Result};
use crate::offsets::FieldKey;
use crate::probe::{MemoryProbe, Module, Signature};
use crate::schema::DiscoveredSchema;

use serde::Serialize;

/// Vtable slots scanned before giving up
const MAX_VTABLE_ENTRIES: usize = 0x150;
const NATIVE_TEST_RANGE: usize = 0x400;
const OUT_PARMS_TEST_RANGE: usize = 0xF00;
const JMP_REL32: u8 = 0xE9;

/// Where the dispatch function lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchInfo {
    pub vtable_index: usize,
    pub address: usize,
    /// `address` relative to the module base
    pub offset: usize,
}

impl DispatchInfo {
    /// None when `address` lies outside `module`
    fn in_module(module: &Module, vtable_index: usize, address: usize) -> Option<Self> {
        if !module.contains(address) {
            tracing::debug!("Dispatch candidate {:#x} is outside the module", address);
            return None;
        }
        Some(Self {
            vtable_index,
            address,
            offset: address.wrapping_sub(module.base),
        })
    }
}

/// `test dword ptr [reg + flags_offset], imm32`
fn flag_test(flags_offset: usize, imm: u32) -> Signature {
    let mut bytes = vec![Some(0xF7), None];
    bytes.extend((flags_offset as u32).to_le_bytes().map(Some));
    bytes.extend(imm.to_le_bytes().map(Some));
    Signature::new(bytes)
}

/// Follow a leading `jmp rel32` thunk
fn resolve_thunk(probe: &MemoryProbe, module: &Module, function: usize) -> usize {
    if probe.read_u8(function) != Some(JMP_REL32) {
        return function;
    }
    probe
        .resolve_relative(function + 1)
        .filter(|&target| module.contains(target))
        .unwrap_or(function)
}

/// Vtable functions of the first object, as (index, resolved address),
/// up to the first slot that isn't a readable pointer
fn vtable_functions(schema: &DiscoveredSchema) -> Result<Vec<(usize, usize)>> {
    let probe = schema.probe();
    let first = schema
        .object_table()
        .get_by_index(0)
        .ok_or_else(|| Error::not_found("object 0"))?;
    let vtable = schema
        .read_ptr(first, FieldKey::ObjectVft, CodecField::ObjectVft)
        .ok_or_else(|| Error::not_found("vtable of object 0"))?;

    Ok((0..MAX_VTABLE_ENTRIES)
        .map_while(|i| {
            let function = probe.read_ptr(vtable + i * crate::POINTER_SIZE)?;
            probe
                .is_readable(function)
                .then(|| (i, resolve_thunk(probe, schema.module(), function)))
        })
        .collect())
}

fn by_flag_tests(
    schema: &DiscoveredSchema,
    functions: &[(usize, usize)],
    flags_offset: usize,
) -> Option<(usize, usize)> {
    let probe = schema.probe();
    let native = flag_test(flags_offset, 0x400);
    let out_parms = flag_test(flags_offset, 0x40_0000);

    functions.iter().copied().find(|&(_, function)| {
        probe.find_pattern(&native, function, NATIVE_TEST_RANGE, None).is_some()
            && probe.find_pattern(&out_parms, function, OUT_PARMS_TEST_RANGE, None).is_some()
    })
}

fn by_string_reference(
    schema: &DiscoveredSchema,
    functions: &[(usize, usize)],
) -> Option<(usize, usize)> {
    let probe = schema.probe();
    let module = schema.module();
    let text = &schema.config().anchors.dispatch_string;

    let string = probe.find_wide_string(text, module.base, module.size)?;
    let reference = module
        .code_sections()
        .find_map(|section| probe.find_code_reference(string, section.base, section.size))?;
    let candidate = probe.next_function_start(reference)?;
    tracing::debug!("Function after the {:?} reference: {:#x}", text, candidate);

    functions.iter().copied().find(|&(_, function)| function == candidate)
}

/// Locate the dispatch function and record it on the schema
pub(super) fn locate(d: &mut Discovery<'_>) -> Result<()> {
    let Some(flags_offset) = d.offset(FieldKey::FunctionFlags) else {
        return Err(Error::not_found("UFunction::FunctionFlags"));
    };

    let info = {
        let s = &*d.schema;
        let functions = vtable_functions(s)?;
        tracing::debug!("Object 0 has {} virtual functions", functions.len());

        by_flag_tests(s, &functions, flags_offset)
            .or_else(|| {
                tracing::debug!("No virtual tests the function flags, trying the string reference");
                by_string_reference(s, &functions)
            })
            .and_then(|(vtable_index, address)| {
                DispatchInfo::in_module(s.module(), vtable_index, address)
            })
    };

    let Some(info) = info else {
        return Err(Error::not_found("dispatch function"));
    };
    tracing::info!(
        "Dispatch function: vtable index {:#x}, module offset {:#x}",
        info.vtable_index,
        info.offset
    );
    d.schema.dispatch = Some(info);
    Ok(())
}
