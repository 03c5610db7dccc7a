//! Offset discovery
//!
//! Discovery runs as an ordered list of [`Step`]s. Each step looks at a few
//! anchor objects whose contents are known in advance (a class that always
//! exists, a struct whose size never changes) and infers one or more field
//! offsets from them. Later steps build on the offsets earlier ones settled.
//!
//! A step that can't confirm its offset records a structural default
//! instead and says so in the log; only a missing object array or anchor
//! set aborts the run.

pub mod dispatch;
mod ffield;
mod fname;
mod identity;
mod pipeline;
mod properties;
mod structs;
pub mod text;

pub use dispatch::DispatchInfo;
pub use pipeline::{Pipeline, Step};
pub use text::Invoker;

use crate::codec::CodecField;
use crate::offsets::{FieldKey, Provenance};
use crate::schema::DiscoveredSchema;

/// State handed to every step
pub struct Discovery<'a> {
    pub schema: &'a mut DiscoveredSchema,
    pub invoker: Option<&'a dyn Invoker>,
}

/// How a step settled one offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Found(usize),
    /// Heuristic failed, structural default recorded
    Defaulted(usize),
    Missing,
}

impl Outcome {
    pub fn offset(self) -> Option<usize> {
        match self {
            Outcome::Found(offset) | Outcome::Defaulted(offset) => Some(offset),
            Outcome::Missing => None,
        }
    }
}

impl Discovery<'_> {
    /// Current offset of `key`, whoever set it
    pub fn offset(&self, key: FieldKey) -> Option<usize> {
        self.schema.offsets.get(key)
    }

    /// Record a heuristic result, or `default` when the heuristic failed.
    ///
    /// Manual offsets from the configuration always win; the returned
    /// outcome reflects what the table holds afterwards.
    pub fn settle(
        &mut self,
        key: FieldKey,
        found: Option<usize>,
        default: Option<usize>,
    ) -> Outcome {
        if let Some(entry) = self.schema.offsets.entry(key) {
            if entry.provenance == Provenance::Manual {
                if let Some(found) = found.filter(|&f| f != entry.offset) {
                    tracing::warn!(
                        "{} discovered at {:#x}, keeping manual {:#x}",
                        key,
                        found,
                        entry.offset
                    );
                }
                return Outcome::Found(entry.offset);
            }
        }

        match (found, default) {
            (Some(offset), _) => {
                tracing::info!("{} = {:#x}", key, offset);
                self.schema.offsets.set(key, offset, Provenance::Discovered);
                Outcome::Found(offset)
            }
            (None, Some(offset)) => {
                tracing::warn!("{} not found, assuming {:#x}", key, offset);
                self.schema.offsets.set(key, offset, Provenance::Default);
                Outcome::Defaulted(offset)
            }
            (None, None) => {
                tracing::warn!("{} not found", key);
                Outcome::Missing
            }
        }
    }

    /// Record an offset computed from others. It is verified only if every
    /// input it was computed from was.
    pub fn derive(&mut self, key: FieldKey, offset: usize, inputs: &[FieldKey]) -> Outcome {
        let verified = inputs.iter().all(|&k| self.schema.offsets.is_verified(k));
        if verified {
            self.settle(key, Some(offset), None)
        } else {
            self.settle(key, None, Some(offset))
        }
    }

    /// Move an already settled offset, keeping its provenance
    pub fn adjust(&mut self, key: FieldKey, offset: usize) -> Outcome {
        match self.schema.offsets.entry(key).map(|e| e.provenance) {
            Some(Provenance::Default) => self.settle(key, None, Some(offset)),
            Some(_) => self.settle(key, Some(offset), None),
            None => Outcome::Missing,
        }
    }
}

/// Offsets tried by [`find_offset`]: `min..max` in steps of `align`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub min: usize,
    pub max: usize,
    pub align: usize,
}

impl Window {
    pub fn new(min: usize, max: usize, align: usize) -> Self {
        Self { min, max, align }
    }

    /// The configured default window
    pub fn standard(schema: &DiscoveredSchema, align: usize) -> Self {
        let h = &schema.config().heuristics;
        Self::new(h.find_offset_min, h.find_offset_max, align)
    }

    pub fn starting_at(self, min: usize) -> Self {
        Self { min, ..self }
    }
}

/// Least offset in `window` at which every sample reads back its expected value.
///
/// Samples are `(address, expected)`. Null addresses (anchors that weren't
/// found) are skipped. Whenever a sample only matches further out, the
/// search restarts from the first sample at that offset, so the result does
/// not depend on sample order. A match at `window.min` itself counts.
pub fn find_offset<T, F>(samples: &[(usize, T)], window: Window, mut read: F) -> Option<usize>
where
    T: PartialEq + Copy,
    F: FnMut(usize) -> Option<T>,
{
    let samples: Vec<(usize, T)> = samples
        .iter()
        .copied()
        .filter(|&(address, _)| {
            if address == 0 {
                tracing::warn!("Skipping a sample whose anchor object is missing");
            }
            address != 0
        })
        .collect();

    if samples.is_empty() {
        return None;
    }

    let align = window.align.max(1);
    let mut accepted = window.min;
    let mut i = 0;

    while i < samples.len() {
        let (address, expected) = samples[i];
        let hit = (accepted..window.max)
            .step_by(align)
            .find(|&offset| address.checked_add(offset).and_then(&mut read) == Some(expected))?;

        if hit > accepted {
            accepted = hit;
            i = 0;
        } else {
            i += 1;
        }
    }

    Some(accepted)
}

/// What a pointer found by [`valid_pointer_offset`] must point at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerCheck {
    Readable,
    /// Something whose first word is itself a readable pointer (a vtable)
    Object,
    /// Inside the main module
    InModule,
}

/// First offset in `start..=max` (pointer aligned) at which both `a` and `b`
/// hold a pointer passing `check`
pub fn valid_pointer_offset(
    schema: &DiscoveredSchema,
    a: usize,
    b: usize,
    start: usize,
    max: usize,
    check: PointerCheck,
    codec: CodecField,
) -> Option<usize> {
    if a == 0 || b == 0 {
        return None;
    }

    let probe = schema.probe();
    let passes = |address: usize| {
        let Some(raw) = probe.read_ptr(address) else {
            return false;
        };
        let pointer = schema.codec().decode_ptr(codec, raw);
        match check {
            PointerCheck::Readable => probe.is_readable(pointer),
            PointerCheck::Object => probe.read_valid_ptr(pointer).is_some(),
            PointerCheck::InModule => pointer != 0 && schema.module().contains(pointer),
        }
    };

    (start.next_multiple_of(crate::POINTER_SIZE)..=max)
        .step_by(crate::POINTER_SIZE)
        .find(|&offset| passes(a + offset) && passes(b + offset))
}

/// Address of `view`, or 0 for a missing anchor
pub(crate) fn addr<V: crate::view::Address>(view: Option<V>) -> usize {
    view.map_or(0, |v| v.address())
}
