//! Capsule Core - Replay data model and state
//!
//! The non-networked half of the replay layer:
//! - Capsule, mode, role, and status types
//! - The replay state store (single source of truth for playback state)
//! - Capsule data sources (HTTP API, fixed sets)
//! - The unified event journal and time-window correlation
//!
//! # Example
//!
//! ```rust,ignore
//! use capsule_core::{ReplayMode, ReplayStore, StaticCapsuleSource};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(StaticCapsuleSource::new());
//! let store = ReplayStore::new(source);
//! store.load(ReplayMode::Daily).await?;
//! store.set_playing(true);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod correlate;
pub mod error;
pub mod journal;
pub mod source;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use correlate::{CorrelationPatterns, EventCorrelation};
pub use error::{JournalError, LoadError};
pub use journal::{
    EventId, EventKind, Journal, JournalStore, JsonFileStore, MemoryStore, NewEvent, UnifiedEvent,
};
pub use source::{HttpCapsuleSource, StaticCapsuleSource};
pub use store::{CapsuleSource, ReplaySnapshot, ReplayStore};
pub use types::{
    CapsuleId, CapsuleStatus, ClientIdentity, ReplayCapsule, ReplayMode, Role, SyncConfig,
    UnknownMode,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
