//! Object listing and type inspection

use super::hex;
use anyhow::{Context, Result};
use uereflect::flags::{CastFlags, PropertyFlags};
use uereflect::view::{ObjectLookup, ObjectView, PropertyView, StructView};
use uereflect::DiscoveredSchema;

/// Handle the Objects command
pub fn handle_objects(schema: &DiscoveredSchema, class: Option<&str>, limit: usize) -> Result<()> {
    let matching = schema.objects().filter(|o| match class {
        Some(class) => o.class().is_some_and(|c| c.name_is(class)),
        None => true,
    });

    let mut shown = 0;
    let mut total = 0;
    for object in matching {
        total += 1;
        if shown < limit {
            print_object(&object);
            shown += 1;
        }
    }

    match class {
        Some(class) => println!("\n{} objects of class {} ({} shown)", total, class, shown),
        None => println!("\n{} objects ({} shown)", total, shown),
    }
    Ok(())
}

fn print_object(object: &ObjectView<'_>) {
    println!(
        "  [{:>6}] {} {}",
        object.index().unwrap_or(-1),
        hex(object.address()),
        object.full_name().unwrap_or_else(|| "<unnamed>".to_string())
    );
}

/// Full names contain a space between class and path
fn lookup<'s>(schema: &'s DiscoveredSchema, name: &str) -> Option<ObjectView<'s>> {
    if name.contains(' ') {
        schema.find_object(name)
    } else {
        schema.find_object_fast(name, CastFlags::empty())
    }
}

/// Handle the Find command
pub fn handle_find(schema: &DiscoveredSchema, name: &str) -> Result<()> {
    let object = lookup(schema, name).with_context(|| format!("No object named {:?}", name))?;

    println!("{}", object.full_name().unwrap_or_default());
    println!("  Address: {}", hex(object.address()));
    println!("  Kind:    {}", object.kind());
    println!("  Flags:   {:?}", object.flags());
    if let Some(outer) = object.outer() {
        println!("  Outer:   {}", outer.full_name().unwrap_or_default());
    }

    if let Some(class) = object.as_class() {
        if let Some(flags) = class.cast_flags() {
            println!("  Cast:    {:?}", flags);
        }
        if let Some(cdo) = class.default_object() {
            println!("  Default: {}", cdo.full_name().unwrap_or_default());
        }
        for interface in class.implemented_interfaces() {
            println!("  Implements {}", interface.name().unwrap_or_default());
        }
    }
    if let Some(function) = object.as_function() {
        if let Some(flags) = function.function_flags() {
            println!("  Function flags: {:?}", flags);
        }
        if let Some(exec) = function.exec_function() {
            let offset = exec.wrapping_sub(schema.module().base);
            println!("  Native:  {} (module + {:#x})", hex(exec), offset);
        }
    }
    if let Some(structure) = object.as_struct() {
        let supers: Vec<String> = structure.hierarchy().skip(1).filter_map(|s| s.name()).collect();
        if !supers.is_empty() {
            println!("  Supers:  {}", supers.join(" -> "));
        }
        print_size(&structure);
    }

    Ok(())
}

fn print_size(structure: &StructView<'_>) {
    if let Some(size) = structure.size() {
        match structure.min_alignment() {
            Some(align) => println!("  Size:    {:#x} (align {})", size, align),
            None => println!("  Size:    {:#x}", size),
        }
    }
}

fn print_property(property: &PropertyView<'_>) {
    let dim = property.array_dim().filter(|&d| d > 1);
    println!(
        "  +{:#06x}  {:<48} {}{}",
        property.offset().unwrap_or(-1),
        property.type_string(),
        property.name().unwrap_or_else(|| "<unnamed>".to_string()),
        dim.map(|d| format!("[{}]", d)).unwrap_or_default()
    );
}

/// Handle the Members command
pub fn handle_members(schema: &DiscoveredSchema, name: &str, inherited: bool) -> Result<()> {
    let structure = schema
        .find_struct(name)
        .with_context(|| format!("No struct, class or function named {:?}", name))?;

    let levels: Vec<StructView<'_>> = if inherited {
        let mut chain: Vec<_> = structure.hierarchy().collect();
        chain.reverse();
        chain
    } else {
        vec![structure]
    };

    for level in levels {
        println!("{}", level.full_name().unwrap_or_default());
        print_size(&level);
        for property in level.properties() {
            print_property(&property);
        }
        for function in level.functions() {
            let params: Vec<String> = function
                .params()
                .iter()
                .filter(|p| !p.has_flags(PropertyFlags::RETURN_PARM))
                .map(|p| format!("{} {}", p.type_string(), p.name().unwrap_or_default()))
                .collect();
            let ret = function
                .return_property()
                .map_or_else(|| "void".to_string(), |r| r.type_string());
            println!("  fn {} {}({})", ret, function.name().unwrap_or_default(), params.join(", "));
        }
    }
    Ok(())
}

/// Handle the Enum command
pub fn handle_enum(schema: &DiscoveredSchema, name: &str) -> Result<()> {
    let enumeration = schema
        .find_enum(name)
        .with_context(|| format!("No enum named {:?}", name))?;

    println!("{}", enumeration.full_name().unwrap_or_default());
    for (name, value) in enumeration.names() {
        println!("  {:<48} = {}", name, value);
    }
    Ok(())
}
