//! Command handlers
//!
//! Every handler takes an already opened target and prints to stdout;
//! progress and diagnostics go through tracing to stderr.

mod discover;
mod objects;
mod tables;

pub use discover::handle_discover;
pub use objects::{handle_enum, handle_find, handle_members, handle_objects};
pub use tables::{handle_config, handle_fname, handle_fname_search, handle_info};

use crate::cli::TargetArgs;
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use uereflect::source::{DumpFile, MemorySource, ProcessSource};
use uereflect::{DiscoveredSchema, DiscoveryConfig};

/// Configuration from `path`, or the built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<DiscoveryConfig> {
    let Some(path) = path else {
        return Ok(DiscoveryConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    DiscoveryConfig::from_toml_str(&contents)
        .with_context(|| format!("Invalid config {}", path.display()))
}

/// Open the memory source named on the command line
pub fn open_source(target: &TargetArgs) -> Result<Arc<dyn MemorySource>> {
    if let Some(dump) = &target.dump {
        let file = match &target.maps {
            Some(maps) => DumpFile::open_with_maps(dump, maps),
            None => DumpFile::open(dump),
        }
        .with_context(|| format!("Failed to open dump {}", dump.display()))?;
        return Ok(Arc::new(file));
    }

    if let Some(pid) = target.pid {
        let process = ProcessSource::attach(pid)
            .with_context(|| format!("Failed to attach to pid {}", pid))?;
        return Ok(Arc::new(process));
    }

    if let Some(name) = &target.process {
        let process = ProcessSource::attach_by_name(name)
            .with_context(|| format!("Failed to attach to process {:?}", name))?;
        return Ok(Arc::new(process));
    }

    bail!("No target given: pass --pid, --process or --dump")
}

/// Full discovery against `source`
pub fn discover(
    source: Arc<dyn MemorySource>,
    config: DiscoveryConfig,
) -> Result<DiscoveredSchema> {
    DiscoveredSchema::discover(source, config).context("Discovery failed")
}

/// Fixed-width hex for addresses
fn hex(value: usize) -> String {
    format!("{:#014x}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert!(config.overrides.offsets.is_empty());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/uereflect.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("uereflect-cli-{}.toml", std::process::id()));
        std::fs::write(&path, "[overrides.offsets]\n\"UStruct::Size\" = 0x50\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.overrides.offsets.get("UStruct::Size"), Some(&0x50));
    }

    #[test]
    fn test_open_source_without_target() {
        let err = open_source(&TargetArgs::default()).err().unwrap();
        assert!(err.to_string().contains("No target"));
    }

    #[test]
    fn test_open_missing_dump() {
        let target = TargetArgs {
            dump: Some("/nonexistent/game.dmp".into()),
            ..TargetArgs::default()
        };
        assert!(open_source(&target).is_err());
    }

    #[test]
    fn test_hex_width() {
        assert_eq!(hex(0x7ff6_1000_0000), "0x7ff610000000");
        assert_eq!(hex(0x10), "0x000000000010");
    }
}
