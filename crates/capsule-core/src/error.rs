//! Error types for the core crate
//!
//! Every error here is recoverable by design: fetch failures surface to the
//! caller as stale/empty state, storage failures degrade to in-memory-only
//! results. Nothing in this crate panics on a specified error path.

/// Capsule list fetch failure.
///
/// Not retried automatically; the operator changes mode or reloads to retry.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Transport-level failure reaching the data source
    #[error("capsule fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Data source answered with a non-success status
    #[error("capsule source returned status {0}")]
    Status(u16),

    /// Response body did not parse as a capsule list
    #[error("capsule list parse failed: {0}")]
    Parse(String),
}

impl LoadError {
    /// Whether a later identical request could plausibly succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            LoadError::Http(_) => true,
            LoadError::Status(code) => *code >= 500,
            LoadError::Parse(_) => false,
        }
    }
}

/// Journal persistence failure.
///
/// Appends are best-effort: a failed persist is logged and swallowed, the
/// in-memory event stands.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Underlying storage write/read failed
    #[error("journal storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Persisted blob did not decode
    #[error("journal decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
