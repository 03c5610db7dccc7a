//! Module, table and name lookups
//!
//! These only need the bootstrap (module, object table, name table), not
//! the field offset discovery.

use super::hex;
use anyhow::{Context, Result};
use std::sync::Arc;
use uereflect::source::MemorySource;
use uereflect::{DiscoveredSchema, DiscoveryConfig};

fn bootstrap(source: Arc<dyn MemorySource>, config: DiscoveryConfig) -> Result<DiscoveredSchema> {
    DiscoveredSchema::bootstrap(source, config)
        .context("Failed to locate the object and name tables")
}

/// Handle the Info command
pub fn handle_info(source: Arc<dyn MemorySource>, config: DiscoveryConfig) -> Result<()> {
    let schema = bootstrap(source, config)?;

    let module = schema.module();
    println!("Module: {} (size {:#x})", hex(module.base), module.size);
    for section in &module.sections {
        println!(
            "  {:<8} {} size {:#x}{}",
            section.name,
            hex(section.base),
            section.size,
            if section.is_executable() { " (code)" } else { "" }
        );
    }

    let objects = schema.object_table();
    println!("\nObject table at {}", hex(objects.address));
    println!("  Layout:   {:?}", objects.kind);
    println!("  Item:     {:#x} bytes, object at +{:#x}", objects.item_size, objects.item_offset);
    if let Some(per_chunk) = objects.elements_per_chunk {
        println!("  Chunk:    {} elements", per_chunk);
    }
    println!("  Objects:  {} of {}", objects.num(), objects.max());

    let names = schema.name_table();
    println!("\nName table at {}", hex(names.address));
    println!("  Layout:   {:?}", names.layout.kind());

    Ok(())
}

/// Handle the Fname command
pub fn handle_fname(
    source: Arc<dyn MemorySource>,
    config: DiscoveryConfig,
    index: u32,
) -> Result<()> {
    let schema = bootstrap(source, config)?;
    let names = schema.name_table();

    match names.resolve(index) {
        Some(name) => {
            println!("FName[{:#x}] = \"{}\"", index, name);
            if let Some(entry) = names.entry_address(index) {
                println!("  Entry at {}", hex(entry));
            }
        }
        None => println!("FName[{:#x}] does not resolve", index),
    }
    Ok(())
}

/// Handle the FnameSearch command
pub fn handle_fname_search(
    source: Arc<dyn MemorySource>,
    config: DiscoveryConfig,
    query: &str,
) -> Result<()> {
    let schema = bootstrap(source, config)?;

    match schema.name_table().search(query) {
        Some(index) => println!("\"{}\" = FName[{:#x}]", query, index),
        None => println!("No name \"{}\" in the name table", query),
    }
    Ok(())
}

/// Handle the Config command
pub fn handle_config(config: &DiscoveryConfig) -> Result<()> {
    let toml = config.to_toml_string().context("Failed to serialize config")?;
    print!("{}", toml);
    Ok(())
}
