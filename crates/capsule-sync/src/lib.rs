//! Broadcast synchronization for replay sessions.
//!
//! One sovereign client drives shared playback state; council, heir, and
//! observer clients mirror it over a relay channel. The pieces:
//!
//! - [`proto`]: the JSON wire messages
//! - [`transport`]: the relay client with fixed-delay reconnect
//! - [`coordinator`]: role-gated binding between store and transport
//! - [`chat`]: ordered chat feed with history backfill
//! - [`relay`]: the warp relay service
//! - [`memory`]: in-process relay for tests and single-process embedding
//! - [`ws`]: the WebSocket relay link

#![warn(unreachable_pub)]

pub mod chat;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod proto;
pub mod relay;
pub mod transport;
pub mod ws;

pub use chat::ChatFeed;
pub use coordinator::SyncCoordinator;
pub use error::{SyncError, TransportError};
pub use memory::{MemoryLink, MemoryRelay};
pub use proto::{BroadcastMessage, MessageKind, PlaybackAction};
pub use relay::RelayState;
pub use transport::{HandlerId, LinkChannel, RelayLink, TransportClient};
pub use ws::WsLink;
