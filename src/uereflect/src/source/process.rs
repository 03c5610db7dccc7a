//! Live Process Memory Source

use super::{MemoryRegion, MemorySource, Protection};

use anyhow::{bail, Context, Result};
use process_memory::{CopyAddress, ProcessHandle, TryIntoProcessHandle};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use sysinfo::System;
use tracing::info;

/// An attached target process
pub struct ProcessSource {
    pub pid: u32,
    pub handle: ProcessHandle,
    pub exe_path: PathBuf,
    pub maps: Vec<MemoryRegion>,
}

// SAFETY: the handle is process-wide and only used for reads.
unsafe impl Send for ProcessSource {}
unsafe impl Sync for ProcessSource {}

impl MemorySource for ProcessSource {
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; size];
        self.handle
            .copy_address(address, &mut buffer)
            .with_context(|| format!("Failed to read {} bytes at {:#x}", size, address))?;
        Ok(buffer)
    }

    fn regions(&self) -> &[MemoryRegion] {
        &self.maps
    }

    fn is_live(&self) -> bool {
        true
    }
}

impl ProcessSource {
    /// Attach to a process by PID
    pub fn attach(pid: u32) -> Result<Self> {
        let handle = (pid as process_memory::Pid)
            .try_into_process_handle()
            .context("Failed to attach to process. Try running with sudo.")?;

        let maps = parse_maps(pid)?;

        let exe_path = std::fs::read_link(format!("/proc/{}/exe", pid))
            .unwrap_or_else(|_| PathBuf::from("unknown"));

        info!(pid, regions = maps.len(), exe = %exe_path.display(), "attached to process");

        Ok(ProcessSource {
            pid,
            handle,
            exe_path,
            maps,
        })
    }

    /// Attach to the largest running process whose name or command line contains `name`
    pub fn attach_by_name(name: &str) -> Result<Self> {
        Self::attach(find_process(name)?)
    }

    /// Regions backed by a file whose name contains `module`
    pub fn module_regions<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a MemoryRegion> {
        self.maps.iter().filter(move |r| {
            r.path
                .as_deref()
                .map(|p| p.contains(module))
                .unwrap_or(false)
        })
    }
}

/// Find a running process by name substring, preferring the one using the most memory
///
/// Wine/Proton targets show up both as the loader and the game thread group, so
/// candidates are keyed by thread group id.
pub fn find_process(name: &str) -> Result<u32> {
    let mut system = System::new_all();
    system.refresh_all();

    let needle = name.to_lowercase();
    let mut candidates: Vec<(u32, u64)> = Vec::new();

    for process in system.processes().values() {
        let pid = process.pid().as_u32();
        let process_name = process.name().to_string_lossy().to_lowercase();

        let cmdline_matches = std::fs::read_to_string(format!("/proc/{}/cmdline", pid))
            .map(|c| c.to_lowercase().contains(&needle))
            .unwrap_or(false);

        if process_name.contains(&needle) || cmdline_matches {
            candidates.push((get_tgid(pid).unwrap_or(pid), process.memory()));
        }
    }

    candidates.sort_by(|a, b| b.1.cmp(&a.1));
    candidates.dedup_by(|a, b| a.0 == b.0);

    match candidates.first() {
        Some(&(pid, memory)) => {
            info!(pid, memory_mb = memory / 1_000_000, "found target process");
            Ok(pid)
        }
        None => bail!("No process matching '{}' found. Is the target running?", name),
    }
}

/// Get the thread group ID (main process) for a given PID/TID
pub fn get_tgid(pid: u32) -> Option<u32> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    status
        .lines()
        .find(|line| line.starts_with("Tgid:"))
        .and_then(|line| line.split_whitespace().nth(1)?.parse().ok())
}

/// Parse /proc/pid/maps to get memory regions
pub fn parse_maps(pid: u32) -> Result<Vec<MemoryRegion>> {
    let maps_path = format!("/proc/{}/maps", pid);
    let file = File::open(&maps_path)
        .with_context(|| format!("Failed to open {}. Do you have permission?", maps_path))?;

    let mut regions = Vec::new();
    for line in BufReader::new(file).lines() {
        if let Some(region) = parse_maps_line(&line?) {
            regions.push(region);
        }
    }

    Ok(regions)
}

/// Parse one `start-end perms offset dev inode [path]` line
pub(crate) fn parse_maps_line(line: &str) -> Option<MemoryRegion> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let (start, end) = parts.first()?.split_once('-')?;

    Some(MemoryRegion {
        start: usize::from_str_radix(start, 16).ok()?,
        end: usize::from_str_radix(end, 16).ok()?,
        protection: Protection::from_perms(parts.get(1).unwrap_or(&"")),
        offset: parts
            .get(2)
            .and_then(|s| usize::from_str_radix(s, 16).ok())
            .unwrap_or(0),
        path: parts.get(5).map(|s| s.to_string()),
    })
}
