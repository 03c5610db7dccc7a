//! Search for the global name table

use super::{array, pool, NameTable, NameTableLayout};
use crate::config::{DiscoveryConfig, SanityBounds};
use crate::error::{Error, Result};
use crate::probe::{MemoryProbe, Module, Signature};

use super::NameLayoutKind;

use byteorder::{ByteOrder, LE};

/// Code references to the name table global, each resolved through the rel32 at +3
const SIGNATURES: [&str; 2] = [
    "48 8D 0D ?? ?? ?? ?? E8 ?? ?? ?? ?? 4C 8B C0 C6 05",
    "48 89 3D ?? ?? ?? ?? 8B 87 ?? ?? ?? ?? 05 ?? ?? ?? ?? 99 81 E2 ?? ?? ?? ??",
];
const SIGNATURE_DISPLACEMENT: usize = 3;

/// Bytes inspected at each scan position
const CANDIDATE_WINDOW: usize = 0x18;

/// Try `address` as a name array global (through the pointer it holds), then as a pool
fn check(probe: &MemoryProbe, address: usize, bounds: &SanityBounds) -> Option<NameTableLayout> {
    if let Some(base) = probe.read_valid_ptr(address) {
        if let Some(shape) = array::detect(probe, base, bounds.name_array_window) {
            return Some(NameTableLayout::Array(shape));
        }
    }
    pool::detect(probe, address, bounds).map(NameTableLayout::Pool)
}

fn check_kind(
    probe: &MemoryProbe,
    address: usize,
    kind: NameLayoutKind,
    bounds: &SanityBounds,
) -> Option<NameTableLayout> {
    match kind {
        NameLayoutKind::Array => probe
            .read_valid_ptr(address)
            .and_then(|base| array::detect(probe, base, bounds.name_array_window))
            .map(NameTableLayout::Array),
        NameLayoutKind::Pool => pool::detect(probe, address, bounds).map(NameTableLayout::Pool),
    }
}

/// Brute-force scan of the readable parts of `[start, start + len)`
fn scan(
    probe: &MemoryProbe,
    start: usize,
    len: usize,
    bounds: &SanityBounds,
) -> Option<(usize, NameTableLayout)> {
    let step = bounds.scan_step.max(1);

    let mut hit = None;
    probe.for_each_readable(start, len, |base, data| {
        let Some(last) = data.len().checked_sub(CANDIDATE_WINDOW) else {
            return true;
        };
        let first = (step - (base - start) % step) % step;
        hit = (first..=last)
            .step_by(step)
            .filter(|&i| {
                // skip anything that is neither a pointer nor a pool header
                let window = &data[i..i + CANDIDATE_WINDOW];
                let head = LE::read_u64(&window[0..8]) as usize;
                probe.is_readable(head) || pool::PoolHeader::parse(window).is_plausible(bounds)
            })
            .find_map(|i| check(probe, base + i, bounds).map(|layout| (base + i, layout)));
        hit.is_none()
    });
    hit
}

/// Locate the name table: override, code signatures, `.data`, then every section
pub fn locate(probe: &MemoryProbe, module: &Module, config: &DiscoveryConfig) -> Result<NameTable> {
    let bounds = &config.bounds;

    if let Some(table) = config.overrides.name_table {
        return match check_kind(probe, table.address, table.layout, bounds) {
            Some(layout) => Ok(found(probe, module, table.address, layout, "configuration")),
            None => Err(Error::inconsistent(
                format!("configured {:?} name table", table.layout),
                table.address,
            )),
        };
    }

    for text in SIGNATURES {
        let signature: Signature = text.parse()?;
        for section in module.code_sections() {
            let displacement = Some(SIGNATURE_DISPLACEMENT);
            let Some(global) =
                probe.find_pattern(&signature, section.base, section.size, displacement)
            else {
                continue;
            };
            if let Some(layout) = check(probe, global, bounds) {
                return Ok(found(probe, module, global, layout, "code reference"));
            }
            tracing::debug!("Signature hit {:#x} is not a name table", global);
        }
    }

    let data = module.data_section();
    if let Some(section) = data {
        if let Some((address, layout)) = scan(probe, section.base, section.size, bounds) {
            return Ok(found(probe, module, address, layout, "data scan"));
        }
    }

    tracing::warn!("Name table not in .data, scanning the whole module");
    for section in &module.sections {
        if data.is_some_and(|d| d.base == section.base) {
            continue;
        }
        if let Some((address, layout)) = scan(probe, section.base, section.size, bounds) {
            return Ok(found(probe, module, address, layout, "module scan"));
        }
    }

    Err(Error::Fatal(format!(
        "name table not found in module at {:#x}",
        module.base
    )))
}

fn found(
    probe: &MemoryProbe,
    module: &Module,
    address: usize,
    layout: NameTableLayout,
    via: &str,
) -> NameTable {
    tracing::info!(
        "Found {:?} name table at {:#x} (module + {:#x}) via {}",
        layout.kind(),
        address,
        address.wrapping_sub(module.base),
        via
    );
    NameTable::new(probe.clone(), address, layout)
}
