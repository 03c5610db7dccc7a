//! Byte signatures with wildcards
//!
//! Scanning anchors on the longest literal run with memchr's SIMD `memmem`
//! finder, then verifies the full signature at each hit.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A fixed byte signature where `None` matches any byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: Vec<Option<u8>>,
}

impl Signature {
    pub fn new(bytes: Vec<Option<u8>>) -> Self {
        Self { bytes }
    }

    /// A signature with no wildcards
    pub fn literal(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().copied().map(Some).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the signature matches at the start of `data`
    #[inline]
    pub fn matches(&self, data: &[u8]) -> bool {
        data.len() >= self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(data)
                .all(|(expected, actual)| expected.map_or(true, |b| b == *actual))
    }

    /// Longest contiguous run of literal bytes as (start, bytes)
    fn anchor(&self) -> (usize, Vec<u8>) {
        let mut best = (0, 0);
        let mut run_start = 0;
        let mut run_len = 0;

        for (i, b) in self.bytes.iter().enumerate() {
            if b.is_some() {
                if run_len == 0 {
                    run_start = i;
                }
                run_len += 1;
                if run_len > best.1 {
                    best = (run_start, run_len);
                }
            } else {
                run_len = 0;
            }
        }

        let anchor = self.bytes[best.0..best.0 + best.1]
            .iter()
            .flatten()
            .copied()
            .collect();
        (best.0, anchor)
    }

    /// All match offsets within `data`, in ascending order
    pub fn scan(&self, data: &[u8]) -> Vec<usize> {
        if self.bytes.is_empty() || data.len() < self.bytes.len() {
            return Vec::new();
        }

        let (anchor_offset, anchor) = self.anchor();

        if anchor.is_empty() {
            return (0..=data.len() - self.bytes.len())
                .filter(|&i| self.matches(&data[i..]))
                .collect();
        }

        memchr::memmem::find_iter(data, &anchor)
            .filter_map(|hit| hit.checked_sub(anchor_offset))
            .filter(|&start| self.matches(&data[start..]))
            .collect()
    }

    /// First match offset within `data`
    pub fn find(&self, data: &[u8]) -> Option<usize> {
        let (anchor_offset, anchor) = self.anchor();

        if anchor.is_empty() {
            return (0..=data.len().checked_sub(self.bytes.len())?)
                .find(|&i| self.matches(&data[i..]));
        }

        memchr::memmem::find_iter(data, &anchor)
            .filter_map(|hit| hit.checked_sub(anchor_offset))
            .find(|&start| self.matches(&data[start..]))
    }
}

impl FromStr for Signature {
    type Err = Error;

    /// Parse IDA-style text: `"48 8D 0D ?? ?? ?? ??"`, `?` and `??` are wildcards
    fn from_str(pattern: &str) -> Result<Self> {
        let bytes = pattern
            .split_whitespace()
            .map(|token| match token {
                "?" | "??" => Ok(None),
                _ => u8::from_str_radix(token, 16).map(Some).map_err(|e| {
                    Error::Config(format!("invalid signature token '{}': {}", token, e))
                }),
            })
            .collect::<Result<Vec<_>>>()?;

        if bytes.is_empty() {
            return Err(Error::Config("signature is empty".to_string()));
        }

        Ok(Self { bytes })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .bytes
            .iter()
            .map(|b| match b {
                Some(b) => format!("{:02X}", b),
                None => "??".to_string(),
            })
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}
