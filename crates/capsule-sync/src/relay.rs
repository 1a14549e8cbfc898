//! Relay service
//!
//! The shared hub between broadcast clients: a WebSocket fan-out at
//! `/sync` plus the capsule feed at `/api/replaycapsules`. Frames are
//! opaque to the relay except for chat, which it records and replays as
//! `history` to each new connection.

use crate::proto::{BroadcastMessage, ChatPayload, HistoryPayload};
use capsule_core::{ReplayCapsule, ReplayMode};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use warp::ws::{Message, WebSocket};
use warp::Filter;

const HUB_CAPACITY: usize = 256;

/// Shared state behind the relay routes
#[derive(Clone)]
pub struct RelayState {
    hub: broadcast::Sender<String>,
    history: Arc<Mutex<Vec<ChatPayload>>>,
    history_cap: usize,
    capsules: Arc<HashMap<ReplayMode, Vec<ReplayCapsule>>>,
}

impl RelayState {
    /// Relay state serving the given capsule lists
    #[must_use]
    pub fn new(capsules: HashMap<ReplayMode, Vec<ReplayCapsule>>, history_cap: usize) -> Self {
        let (hub, _) = broadcast::channel(HUB_CAPACITY);
        Self {
            hub,
            history: Arc::new(Mutex::new(Vec::new())),
            history_cap,
            capsules: Arc::new(capsules),
        }
    }

    /// Recorded chat, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<ChatPayload> {
        self.history.lock().clone()
    }

    /// Number of currently connected clients
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.hub.receiver_count()
    }

    fn record_chat(&self, chat: ChatPayload) {
        let mut guard = self.history.lock();
        guard.push(chat);
        let overflow = guard.len().saturating_sub(self.history_cap);
        if overflow > 0 {
            guard.drain(..overflow);
        }
    }

    /// Capsules for a mode string.
    ///
    /// Clients always name a mode; an unknown or absent one yields an
    /// empty list rather than an error or a default.
    #[must_use]
    pub fn capsules_for(&self, mode: Option<&str>) -> Vec<ReplayCapsule> {
        mode.and_then(|raw| raw.parse::<ReplayMode>().ok())
            .and_then(|mode| self.capsules.get(&mode).cloned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ModeQuery {
    mode: Option<String>,
}

/// All relay routes: `GET /api/replaycapsules?mode=` and the `/sync`
/// WebSocket upgrade
pub fn routes(
    state: RelayState,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let capsule_state = state.clone();
    let capsules = warp::path!("api" / "replaycapsules")
        .and(warp::get())
        .and(warp::query::<ModeQuery>())
        .map(move |query: ModeQuery| {
            warp::reply::json(&capsule_state.capsules_for(query.mode.as_deref()))
        });

    let sync = warp::path("sync")
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let state = state.clone();
            ws.on_upgrade(move |socket| client_session(socket, state))
        });

    capsules.or(sync)
}

/// Run the relay until the process exits
pub async fn serve(state: RelayState, addr: SocketAddr) {
    tracing::info!(%addr, "relay listening");
    warp::serve(routes(state)).run(addr).await;
}

/// One connected client: backfill chat history, then fan frames both ways
/// until the socket closes.
async fn client_session(socket: WebSocket, state: RelayState) {
    let (mut sink, mut stream) = socket.split();
    let mut hub_rx = state.hub.subscribe();

    let backfill = BroadcastMessage::History(HistoryPayload {
        messages: state.history(),
    });
    if let Ok(text) = serde_json::to_string(&backfill) {
        if sink.send(Message::text(text)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            published = hub_rx.recv() => match published {
                Ok(text) => {
                    if sink.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "relay client lagged, frames skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            frame = stream.next() => match frame {
                Some(Ok(message)) => {
                    if message.is_close() {
                        break;
                    }
                    if let Ok(text) = message.to_str() {
                        if let Ok(BroadcastMessage::Chat(chat)) = serde_json::from_str(text) {
                            state.record_chat(chat);
                        }
                        let _ = state.hub.send(text.to_string());
                    }
                }
                Some(Err(err)) => {
                    tracing::debug!(%err, "relay client socket error");
                    break;
                }
                None => break,
            }
        }
    }
    tracing::debug!("relay client session ended");
}
