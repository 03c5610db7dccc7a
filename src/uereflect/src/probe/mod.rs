//! Memory probing and byte-pattern search
//!
//! [`MemoryProbe`] is the only way the rest of the crate touches target
//! memory. Every read returns a sentinel on failure: a bad candidate address
//! is an ordinary outcome for the heuristics built on top of it.

pub mod image;
mod signature;

pub use image::{Module, Section};
pub use signature::Signature;

use crate::error::{Error, Result};
use crate::source::MemorySource;

use byteorder::{ByteOrder, LE};
use std::sync::Arc;

/// Largest window searched for a `ret` when looking for a function end
const MAX_FUNCTION_LENGTH: usize = 0xFFFF;
/// Bytes of a RIP-relative `lea`: REX, opcode, modrm, disp32
const LEA_LENGTH: usize = 7;

const FUNCTION_ALIGNMENT: usize = 0x10;

/// Safe reads and scans over a shared [`MemorySource`]
#[derive(Clone)]
pub struct MemoryProbe {
    source: Arc<dyn MemorySource>,
}

impl std::fmt::Debug for MemoryProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProbe")
            .field("regions", &self.source.regions().len())
            .field("live", &self.source.is_live())
            .finish()
    }
}

impl MemoryProbe {
    pub fn new(source: Arc<dyn MemorySource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &dyn MemorySource {
        self.source.as_ref()
    }

    /// Non-null and inside a readable region. Never fails.
    pub fn is_readable(&self, address: usize) -> bool {
        address != 0 && self.source.is_readable(address)
    }

    pub fn read_bytes(&self, address: usize, size: usize) -> Option<Vec<u8>> {
        if address == 0 {
            return None;
        }
        self.source.read_bytes(address, size).ok()
    }

    pub fn read_u8(&self, address: usize) -> Option<u8> {
        self.source.read_u8(address).ok()
    }

    pub fn read_u16(&self, address: usize) -> Option<u16> {
        self.source.read_u16(address).ok()
    }

    pub fn read_u32(&self, address: usize) -> Option<u32> {
        self.source.read_u32(address).ok()
    }

    pub fn read_i32(&self, address: usize) -> Option<i32> {
        self.source.read_i32(address).ok()
    }

    pub fn read_u64(&self, address: usize) -> Option<u64> {
        self.source.read_u64(address).ok()
    }

    pub fn read_ptr(&self, address: usize) -> Option<usize> {
        self.source.read_ptr(address).ok()
    }

    /// Read a pointer and require it to point at readable memory
    pub fn read_valid_ptr(&self, address: usize) -> Option<usize> {
        self.read_ptr(address).filter(|&p| self.is_readable(p))
    }

    /// Call `visit(chunk_base, bytes)` for each readable piece of `[start, start + len)`.
    ///
    /// Pieces are clipped to region boundaries, so matches straddling two
    /// regions are not seen.
    pub(crate) fn for_each_readable(
        &self,
        start: usize,
        len: usize,
        mut visit: impl FnMut(usize, &[u8]) -> bool,
    ) {
        let end = start.saturating_add(len);
        let mut regions: Vec<_> = self
            .source
            .regions()
            .iter()
            .filter(|r| r.is_readable() && r.start < end && r.end > start)
            .map(|r| (r.start.max(start), r.end.min(end)))
            .collect();
        regions.sort_unstable();

        for (piece_start, piece_end) in regions {
            let Ok(data) = self.source.read_bytes(piece_start, piece_end - piece_start) else {
                tracing::debug!("Skipping unreadable range {:#x}..{:#x}", piece_start, piece_end);
                continue;
            };
            if !visit(piece_start, &data) {
                return;
            }
        }
    }

    /// Resolve the rel32 operand at `address`: `address + 4 + disp32`
    pub fn resolve_relative(&self, address: usize) -> Option<usize> {
        let disp = self.read_i32(address)? as i64;
        usize::try_from(address as i64 + 4 + disp).ok()
    }

    /// First match of `signature` in `[start, start + range)`.
    ///
    /// With a displacement the match is resolved as
    /// `match + disp + 4 + *(i32 at match + disp)`.
    pub fn find_pattern(
        &self,
        signature: &Signature,
        start: usize,
        range: usize,
        displacement: Option<usize>,
    ) -> Option<usize> {
        let mut found = None;
        self.for_each_readable(start, range, |base, data| {
            found = signature.find(data).map(|offset| base + offset);
            found.is_none()
        });

        let hit = found?;
        match displacement {
            Some(disp) => self.resolve_relative(hit + disp),
            None => Some(hit),
        }
    }

    /// Every match of `signature` in `[start, start + range)`
    pub fn find_pattern_all(
        &self,
        signature: &Signature,
        start: usize,
        range: usize,
    ) -> Vec<usize> {
        let mut hits = Vec::new();
        self.for_each_readable(start, range, |base, data| {
            hits.extend(signature.scan(data).into_iter().map(|offset| base + offset));
            true
        });
        hits
    }

    /// First occurrence of a narrow string literal
    pub fn find_string(&self, text: &str, start: usize, range: usize) -> Option<usize> {
        self.find_pattern(&Signature::literal(text.as_bytes()), start, range, None)
    }

    /// First occurrence of a UTF-16LE string literal
    pub fn find_wide_string(&self, text: &str, start: usize, range: usize) -> Option<usize> {
        let wide: Vec<u8> = text.encode_utf16().flat_map(|c| c.to_le_bytes()).collect();
        self.find_pattern(&Signature::literal(&wide), start, range, None)
    }

    /// First `lea reg, [rip + disp32]` in `[start, start + range)` resolving to `target`
    pub fn find_code_reference(&self, target: usize, start: usize, range: usize) -> Option<usize> {
        let mut found = None;
        self.for_each_readable(start, range, |base, data| {
            found = data.windows(LEA_LENGTH).enumerate().find_map(|(i, insn)| {
                let is_lea = (insn[0] == 0x48 || insn[0] == 0x4C)
                    && insn[1] == 0x8D
                    && insn[2] & 0xC7 == 0x05;
                if !is_lea {
                    return None;
                }
                let disp = LE::read_i32(&insn[3..7]) as i64;
                let resolved = (base + i + LEA_LENGTH) as i64 + disp;
                (resolved == target as i64).then_some(base + i)
            });
            found.is_none()
        });
        found
    }

    /// Start of the function following the one containing `address`.
    ///
    /// The function end is the first `ret` that follows a `pop`; the next
    /// start is the following 16-byte boundary, skipping `int3`/`nop` padding.
    pub fn next_function_start(&self, address: usize) -> Option<usize> {
        let code = self.read_bytes(address, MAX_FUNCTION_LENGTH).or_else(|| {
            let region = self.source.find_region(address)?;
            self.read_bytes(address, region.end.saturating_sub(address).min(MAX_FUNCTION_LENGTH))
        })?;

        let ret = (1..code.len()).find(|&i| {
            (code[i] == 0xC3 || code[i] == 0xCB) && (0x58..=0x5F).contains(&code[i - 1])
        })?;

        let mut next = (address + ret + 1).next_multiple_of(FUNCTION_ALIGNMENT);
        while next - address < code.len() && matches!(code[next - address], 0xCC | 0x90) {
            next += FUNCTION_ALIGNMENT;
        }
        Some(next)
    }

    /// Parse the PE section table of the image at `module_base`
    pub fn enumerate_sections(&self, module_base: usize) -> Result<Vec<Section>> {
        image::parse_module(self.source(), module_base).map(|m| m.sections)
    }

    /// Module base, size and sections of the image at `base`
    pub fn module_at(&self, base: usize) -> Result<Module> {
        image::parse_module(self.source(), base)
    }

    /// Find the main executable image.
    ///
    /// Tries `hint`, then regions backed by an `.exe`, then the usual image
    /// bases, then any region that starts with a PE header.
    pub fn locate_module(&self, hint: Option<usize>) -> Result<Module> {
        let from_path = self
            .source
            .regions()
            .iter()
            .filter(|r| {
                r.path
                    .as_deref()
                    .is_some_and(|p| p.to_ascii_lowercase().ends_with(".exe"))
            })
            .map(|r| r.start);

        let candidates: Vec<usize> = hint
            .into_iter()
            .chain(from_path)
            .chain(image::DEFAULT_IMAGE_BASES)
            .chain(self.source.regions().iter().map(|r| r.start))
            .collect();

        for base in candidates {
            if let Ok(module) = self.module_at(base) {
                tracing::info!(
                    "Found module at {:#x} ({:#x} bytes, {} sections)",
                    module.base,
                    module.size,
                    module.sections.len()
                );
                return Ok(module);
            }
        }

        Err(Error::Fatal("no PE image found in target memory".into()))
    }
}
