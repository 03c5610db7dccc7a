//! Error taxonomy for discovery.
//!
//! Single-read and single-candidate failures are never errors: heuristics
//! consume them locally as `None`/`false`. Only what a caller can act on is
//! surfaced here.

/// Errors surfaced by discovery and table location
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A heuristic exhausted its search window
    #[error("{what} not found")]
    NotFound { what: String },

    /// A table-shape predicate failed for a candidate address
    #[error("{what} at {address:#x} is inconsistent")]
    Inconsistent { what: String, address: usize },

    /// Nothing downstream can work without this
    #[error("fatal: {0}")]
    Fatal(String),

    /// A required read from the target failed
    #[error("failed to read {size} bytes at {address:#x}")]
    Read { address: usize, size: usize },

    /// Invalid configuration or override data
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A call into the target through an [`Invoker`](crate::discovery::Invoker) failed
    #[error("remote call failed: {0}")]
    Call(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    pub fn inconsistent(what: impl Into<String>, address: usize) -> Self {
        Error::Inconsistent {
            what: what.into(),
            address,
        }
    }

    /// Whether the error leaves no usable result behind
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}
