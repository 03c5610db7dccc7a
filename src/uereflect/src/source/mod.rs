//! Memory sources
//!
//! Everything discovery reads comes through [`MemorySource`]:
//! - Live processes via [`ProcessSource`]
//! - Memory dump files via [`DumpFile`] (minidump and raw + maps formats)
//! - Mock sources for testing

mod dump;
#[cfg(test)]
mod mock;
mod process;
mod region;
mod traits;

pub use dump::DumpFile;
pub use process::{find_process, parse_maps, ProcessSource};
pub use region::{MemoryRegion, Protection};
pub use traits::MemorySource;
