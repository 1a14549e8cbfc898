//! Error types for the sync crate
//!
//! Transport failures recover locally (fixed-delay retry) and surface to
//! callers only as the connected flag; authority violations are explicit
//! results, not conventions. Nothing here is fatal.

use capsule_core::{LoadError, Role};

/// Transport-level failure
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the relay link failed
    #[error("relay connect failed: {0}")]
    Connect(String),

    /// The link closed underneath us
    #[error("relay link closed")]
    Closed,
}

/// Sync coordinator failure
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A subordinate attempted to mutate sync-driven state locally
    #[error("local mutation denied for subordinate role {role}")]
    PermissionDenied {
        /// The role that attempted the mutation
        role: Role,
    },

    /// Capsule list load failed
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl SyncError {
    /// Whether the failure is an authority refusal rather than an I/O issue
    #[inline]
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SyncError::PermissionDenied { .. })
    }
}
