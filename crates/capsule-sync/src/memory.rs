//! In-process relay
//!
//! A broadcast-channel fan-out hub with the same semantics as the wire
//! relay: every frame goes to every connected client, and chat is recorded
//! and replayed as `history` to each new connection. Used by tests and by
//! embedders that run sovereign and audience in one process.

use crate::error::TransportError;
use crate::proto::{BroadcastMessage, ChatPayload, HistoryPayload};
use crate::transport::{LinkChannel, RelayLink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

const HUB_CAPACITY: usize = 256;
const CLIENT_QUEUE: usize = 64;

/// The hub shared by all in-process links
#[derive(Debug)]
pub struct MemoryRelay {
    hub: broadcast::Sender<String>,
    history: Arc<Mutex<Vec<ChatPayload>>>,
}

impl MemoryRelay {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        let (hub, _) = broadcast::channel(HUB_CAPACITY);
        Self {
            hub,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A link handle for one client
    #[must_use]
    pub fn link(&self) -> MemoryLink {
        MemoryLink {
            hub: self.hub.clone(),
            history: self.history.clone(),
        }
    }

    /// Observe every frame crossing the hub (test instrumentation)
    #[must_use]
    pub fn tap(&self) -> broadcast::Receiver<String> {
        self.hub.subscribe()
    }

    /// Inject a raw frame as if a client had sent it
    pub fn publish(&self, frame: String) {
        let _ = self.hub.send(frame);
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// One client's connection point into a [`MemoryRelay`]
#[derive(Debug, Clone)]
pub struct MemoryLink {
    hub: broadcast::Sender<String>,
    history: Arc<Mutex<Vec<ChatPayload>>>,
}

#[async_trait]
impl RelayLink for MemoryLink {
    async fn open(&self) -> Result<LinkChannel, TransportError> {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(CLIENT_QUEUE);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(CLIENT_QUEUE);
        let mut hub_rx = self.hub.subscribe();

        // Chat backfill, first frame on every fresh connection.
        let backfill = BroadcastMessage::History(HistoryPayload {
            messages: self.history.lock().clone(),
        });
        if let Ok(text) = serde_json::to_string(&backfill) {
            let _ = inbound_tx.try_send(text);
        }

        // Hub -> client.
        let forward_tx = inbound_tx.clone();
        tokio::spawn(async move {
            loop {
                match hub_rx.recv().await {
                    Ok(text) => {
                        if forward_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "in-process relay client lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // Client -> hub, recording chat for later backfill.
        let hub = self.hub.clone();
        let history = self.history.clone();
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Ok(BroadcastMessage::Chat(chat)) = serde_json::from_str(&text) {
                    history.lock().push(chat);
                }
                let _ = hub.send(text);
            }
        });

        Ok(LinkChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
