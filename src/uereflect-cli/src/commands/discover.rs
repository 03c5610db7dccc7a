//! Discovery report

use super::hex;
use anyhow::{Context, Result};
use serde_json::json;
use uereflect::DiscoveredSchema;

/// Report as a JSON value
fn report(schema: &DiscoveredSchema) -> serde_json::Value {
    let module = schema.module();
    let objects = schema.object_table();
    let names = schema.name_table();

    json!({
        "module": { "base": module.base, "size": module.size },
        "object_table": {
            "address": objects.address,
            "layout": objects.kind,
            "item_size": objects.item_size,
            "elements_per_chunk": objects.elements_per_chunk,
        },
        "name_table": { "address": names.address, "layout": names.layout.kind() },
        "traits": schema.traits(),
        "dispatch": schema.dispatch(),
        "offsets": schema.offsets(),
    })
}

/// Handle the Discover command
pub fn handle_discover(schema: &DiscoveredSchema, as_json: bool) -> Result<()> {
    if as_json {
        let text = serde_json::to_string_pretty(&report(schema))
            .context("Failed to serialize report")?;
        println!("{}", text);
        return Ok(());
    }

    let objects = schema.object_table();
    let names = schema.name_table();
    println!("Object table: {} ({:?})", hex(objects.address), objects.kind);
    println!("Name table:   {} ({:?})", hex(names.address), names.layout.kind());

    let traits = schema.traits();
    println!("\nLayout traits:");
    println!("  FName:         {:?}", traits.name_layout);
    println!("  Members:       {:?}", traits.field_model);
    println!("  FField owner:  {:?}", traits.owner_encoding);
    println!("  Enum names:    {:?}", traits.enum_names);

    match schema.dispatch() {
        Some(dispatch) => println!(
            "\nDispatch function: vtable index {:#x}, {} (module + {:#x})",
            dispatch.vtable_index,
            hex(dispatch.address),
            dispatch.offset
        ),
        None => println!("\nDispatch function: not found"),
    }

    let offsets = schema.offsets();
    println!("\n{} field offsets:", offsets.len());
    for (key, entry) in offsets.iter() {
        println!("  {:<40} {:#06x}  {:?}", key.to_string(), entry.offset, entry.provenance);
    }

    Ok(())
}
