//! # uereflect
//!
//! Runtime discovery of Unreal Engine reflection layouts.
//!
//! The crate works against any [`source::MemorySource`] (a live process, a
//! memory dump, or a synthetic image in tests) and infers, at every run:
//! - where the global object array and name table live and which historical
//!   layout each one uses
//! - the byte offsets of the reflection fields needed to walk the object graph
//! - the dispatch function used to call into live objects
//!
//! The result is a [`DiscoveredSchema`], an immutable context object that the
//! typed views in [`view`] read through.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use uereflect::source::DumpFile;
//! use uereflect::{DiscoveredSchema, DiscoveryConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dump = DumpFile::open("game.dmp")?;
//! let schema = DiscoveredSchema::discover(Arc::new(dump), DiscoveryConfig::default())?;
//!
//! for object in schema.objects() {
//!     println!("{}", object.full_name().unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod flags;
pub mod names;
pub mod objects;
pub mod offsets;
pub mod probe;
pub mod schema;
pub mod source;
pub mod view;

#[cfg(test)]
mod testing;

pub use codec::{CodecField, DecodeTable, FieldDecoder};
pub use config::DiscoveryConfig;
pub use error::{Error, Result};
pub use offsets::{FieldKey, FieldOffsetTable, LayoutTraits};
pub use schema::DiscoveredSchema;

/// Pointer width of supported targets (x86-64 only)
pub const POINTER_SIZE: usize = 8;
