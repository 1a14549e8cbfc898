//! Transport client
//!
//! One logical connection to a relay endpoint, delivering typed messages
//! in both directions. Survives disconnects with a fixed-delay retry loop
//! (no backoff, no cap) that only `disconnect()` stops; the retry policy
//! is a deliberate carry-over and its thundering-herd risk is documented
//! rather than patched here.

use crate::error::TransportError;
use crate::proto::{BroadcastMessage, JoinPayload, MessageKind};
use async_trait::async_trait;
use capsule_core::ClientIdentity;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// A live bidirectional channel produced by a relay link.
///
/// Closing either side (dropping the inbound sender on the link side)
/// signals disconnection to the client.
pub struct LinkChannel {
    /// Frames toward the relay
    pub outbound: mpsc::Sender<String>,
    /// Frames from the relay
    pub inbound: mpsc::Receiver<String>,
}

/// The seam between the transport client and the actual relay wiring.
///
/// Production uses the WebSocket link; tests and in-process embedding use
/// the memory relay.
#[async_trait]
pub trait RelayLink: Send + Sync {
    /// Open a fresh channel to the relay
    async fn open(&self) -> Result<LinkChannel, TransportError>;
}

type Handler = Arc<dyn Fn(&BroadcastMessage) + Send + Sync>;

/// Token returned by [`TransportClient::on`], used to unregister
#[derive(Debug)]
pub struct HandlerId {
    kind: MessageKind,
    id: u64,
}

struct Shared {
    identity: ClientIdentity,
    connected: AtomicBool,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    handlers: Mutex<HashMap<MessageKind, Vec<(u64, Handler)>>>,
    connect_tx: broadcast::Sender<()>,
}

/// Client side of the relay channel.
///
/// `connect` resolves to a boolean connected state and never fails hard;
/// `send` is a silent no-op while disconnected; malformed inbound frames
/// are logged and dropped without touching the connection.
pub struct TransportClient {
    shared: Arc<Shared>,
    link: Arc<dyn RelayLink>,
    reconnect_delay: Duration,
    next_handler: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    run_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("identity", &self.shared.identity)
            .field("connected", &self.connected())
            .finish()
    }
}

impl TransportClient {
    /// Create a client over a relay link
    #[must_use]
    pub fn new(identity: ClientIdentity, link: Arc<dyn RelayLink>, reconnect_delay: Duration) -> Self {
        let (connect_tx, _) = broadcast::channel(8);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                identity,
                connected: AtomicBool::new(false),
                outbound: Mutex::new(None),
                handlers: Mutex::new(HashMap::new()),
                connect_tx,
            }),
            link,
            reconnect_delay,
            next_handler: AtomicU64::new(0),
            shutdown_tx,
            run_task: Mutex::new(None),
        }
    }

    /// Identity this client registers with
    #[inline]
    #[must_use]
    pub fn identity(&self) -> &ClientIdentity {
        &self.shared.identity
    }

    /// Whether the channel is currently open
    #[inline]
    #[must_use]
    pub fn connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Establish the channel and register the role with a `join` message.
    ///
    /// Resolves once the first connect attempt settles: `true` when the
    /// channel opened, `false` otherwise. A failed first attempt still
    /// leaves the retry loop running until [`TransportClient::disconnect`].
    pub async fn connect(&self) -> bool {
        if *self.shutdown_tx.borrow() {
            return false;
        }
        // Check-and-spawn under one lock so concurrent connects cannot
        // each start a run loop; the lock is released before the await.
        let ready_rx = {
            let mut guard = self.run_task.lock();
            if guard.is_some() {
                return self.connected();
            }
            let (ready_tx, ready_rx) = oneshot::channel();
            *guard = Some(tokio::spawn(run(
                self.shared.clone(),
                self.link.clone(),
                self.reconnect_delay,
                self.shutdown_tx.subscribe(),
                ready_tx,
            )));
            ready_rx
        };
        ready_rx.await.unwrap_or(false)
    }

    /// Close the channel and stop the retry loop; idempotent
    pub async fn disconnect(&self) {
        self.shutdown_tx.send_replace(true);
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.outbound.lock().take();
        let task = self.run_task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }

    /// Register a handler for a message kind.
    ///
    /// Handlers for the same kind run in registration order.
    pub fn on(
        &self,
        kind: MessageKind,
        handler: impl Fn(&BroadcastMessage) + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_handler.fetch_add(1, Ordering::Relaxed);
        self.shared
            .handlers
            .lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        HandlerId { kind, id }
    }

    /// Unregister a handler
    pub fn off(&self, handle: HandlerId) {
        if let Some(list) = self.shared.handlers.lock().get_mut(&handle.kind) {
            list.retain(|(id, _)| *id != handle.id);
        }
    }

    /// Observe successful (re)connections.
    ///
    /// Fires after each `join` goes out, including reconnects.
    #[inline]
    #[must_use]
    pub fn connect_events(&self) -> broadcast::Receiver<()> {
        self.shared.connect_tx.subscribe()
    }

    /// Serialize and transmit; silent no-op while disconnected
    pub fn send(&self, message: &BroadcastMessage) {
        if !self.connected() {
            tracing::trace!(kind = ?message.kind(), "send skipped while disconnected");
            return;
        }
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%err, "outbound message serialization failed");
                return;
            }
        };
        let guard = self.shared.outbound.lock();
        if let Some(tx) = guard.as_ref() {
            if tx.try_send(text).is_err() {
                tracing::warn!("outbound queue unavailable, frame dropped");
            }
        }
    }
}

fn mark_disconnected(shared: &Shared) {
    shared.connected.store(false, Ordering::SeqCst);
    shared.outbound.lock().take();
}

fn send_join(shared: &Shared, outbound: &mpsc::Sender<String>) {
    let join = BroadcastMessage::Join(JoinPayload {
        user: shared.identity.user.clone(),
        role: shared.identity.role,
        client_id: shared.identity.client_id,
        timestamp: chrono::Utc::now(),
    });
    match serde_json::to_string(&join) {
        Ok(text) => {
            let _ = outbound.try_send(text);
        }
        Err(err) => tracing::warn!(%err, "join serialization failed"),
    }
}

fn dispatch(shared: &Shared, text: &str) {
    let message: BroadcastMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(%err, "dropping malformed inbound frame");
            return;
        }
    };
    // Snapshot the handler list so handlers can register/unregister freely.
    let handlers: Vec<Handler> = {
        let guard = shared.handlers.lock();
        guard
            .get(&message.kind())
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    };
    for handler in handlers {
        handler(&message);
    }
}

async fn run(
    shared: Arc<Shared>,
    link: Arc<dyn RelayLink>,
    delay: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    ready: oneshot::Sender<bool>,
) {
    let mut ready = Some(ready);
    loop {
        if *shutdown_rx.borrow() {
            return;
        }
        match link.open().await {
            Ok(mut channel) => {
                shared.connected.store(true, Ordering::SeqCst);
                *shared.outbound.lock() = Some(channel.outbound.clone());
                send_join(&shared, &channel.outbound);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(true);
                }
                let _ = shared.connect_tx.send(());
                tracing::debug!(
                    user = %shared.identity.user,
                    role = %shared.identity.role,
                    "relay channel open"
                );

                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                mark_disconnected(&shared);
                                return;
                            }
                        }
                        frame = channel.inbound.recv() => match frame {
                            Some(text) => dispatch(&shared, &text),
                            None => break,
                        }
                    }
                }
                mark_disconnected(&shared);
                tracing::debug!("relay channel closed");
            }
            Err(err) => {
                tracing::debug!(%err, "relay connect attempt failed");
                if let Some(tx) = ready.take() {
                    let _ = tx.send(false);
                }
            }
        }

        // Exactly one retry per fixed delay, forever, until disconnect().
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
