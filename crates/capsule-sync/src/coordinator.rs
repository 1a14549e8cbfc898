//! Broadcast sync coordinator
//!
//! Binds the replay store to the transport client. The sovereign observes
//! local state changes and publishes them; subordinate roles apply
//! published state and are refused local mutation of synced fields with an
//! explicit `PermissionDenied` result instead of caller discipline.
//!
//! The role is fixed at construction and never renegotiated. Nothing here
//! enforces sovereign exclusivity: two sovereigns in one session would
//! both publish and subordinates would apply whichever arrives last
//! (flicker, not corruption). That limitation is documented, not solved.

use crate::error::SyncError;
use crate::proto::{
    BroadcastMessage, CapsuleSyncPayload, ChatPayload, ConstellationPayload, MessageKind,
    PlaybackAction, PlaybackControlPayload, RequestStatePayload, StateSnapshotPayload,
};
use crate::transport::{HandlerId, TransportClient};
use capsule_core::{
    ClientIdentity, EventKind, Journal, NewEvent, ReplayMode, ReplaySnapshot, ReplayStore, Role,
    SyncConfig, UnifiedEvent,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The sole bridge between local replay state and the relay channel
pub struct SyncCoordinator {
    identity: ClientIdentity,
    config: SyncConfig,
    store: Arc<ReplayStore>,
    journal: Arc<Journal>,
    transport: Arc<TransportClient>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    handlers: Mutex<Vec<HandlerId>>,
    started: AtomicBool,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("role", &self.identity.role)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

impl SyncCoordinator {
    /// Create a coordinator for a fixed role
    #[must_use]
    pub fn new(
        identity: ClientIdentity,
        config: SyncConfig,
        store: Arc<ReplayStore>,
        journal: Arc<Journal>,
        transport: Arc<TransportClient>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            identity,
            config,
            store,
            journal,
            transport,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Session role
    #[inline]
    #[must_use]
    pub fn role(&self) -> Role {
        self.identity.role
    }

    /// Whether this client drives shared state
    #[inline]
    #[must_use]
    pub fn is_authoritative(&self) -> bool {
        self.identity.role.is_authoritative()
    }

    /// Wire up handlers and background tasks for this role; idempotent
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.is_authoritative() {
            self.start_sovereign();
        } else {
            self.start_subordinate();
        }
        tracing::info!(role = %self.identity.role, "sync coordinator started");
    }

    /// Stop all tasks, unregister handlers, and close the transport.
    ///
    /// Clears the playback tick and the transport's reconnect loop so no
    /// callback can mutate state after teardown. Idempotent.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }
        let handlers: Vec<HandlerId> = self.handlers.lock().drain(..).collect();
        for handle in handlers {
            self.transport.off(handle);
        }
        self.transport.disconnect().await;
    }

    // -- Local mutation entry points (authority-gated) --------------------

    /// Set the position index locally.
    ///
    /// # Errors
    /// `SyncError::PermissionDenied` on subordinate roles; synced fields
    /// only change through inbound messages there.
    pub fn set_index(&self, index: usize) -> Result<(), SyncError> {
        self.ensure_authority()?;
        self.store.set_index(index);
        Ok(())
    }

    /// Set the playback flag locally
    ///
    /// # Errors
    /// `SyncError::PermissionDenied` on subordinate roles.
    pub fn set_playing(&self, playing: bool) -> Result<(), SyncError> {
        self.ensure_authority()?;
        self.store.set_playing(playing);
        Ok(())
    }

    /// Switch mode, triggering a capsule list load
    ///
    /// # Errors
    /// `SyncError::PermissionDenied` on subordinate roles, or the
    /// surfaced `LoadError` when the fetch fails.
    pub async fn set_mode(&self, mode: ReplayMode) -> Result<usize, SyncError> {
        self.ensure_authority()?;
        Ok(self.store.set_mode(mode).await?)
    }

    /// Publish a playback command for remote transports.
    ///
    /// This is the command channel, distinct from state mirroring: the
    /// sovereign's own store is not touched here.
    ///
    /// # Errors
    /// `SyncError::PermissionDenied` on subordinate roles.
    pub fn broadcast_playback_control(
        &self,
        action: PlaybackAction,
        target_index: Option<usize>,
    ) -> Result<(), SyncError> {
        self.ensure_authority()?;
        self.transport
            .send(&BroadcastMessage::PlaybackControl(PlaybackControlPayload {
                action,
                target_index,
            }));
        Ok(())
    }

    // -- Journal enrichment (any role) ------------------------------------

    /// Append an annotation tied to the currently active capsule
    pub fn annotate(&self, content: impl Into<String>, tags: Vec<String>) -> UnifiedEvent {
        self.journal.append(self.event(EventKind::Annotation, content).with_tags(tags))
    }

    /// Append feedback tied to the currently active capsule
    pub fn feedback(&self, content: impl Into<String>) -> UnifiedEvent {
        self.journal.append(self.event(EventKind::Feedback, content))
    }

    /// Send a chat message and journal it against the current capsule
    pub fn send_chat(&self, text: impl Into<String>) -> ChatPayload {
        let payload = ChatPayload {
            user: self.identity.user.clone(),
            role: self.identity.role,
            message: text.into(),
            timestamp: chrono::Utc::now(),
        };
        self.transport
            .send(&BroadcastMessage::Chat(payload.clone()));
        self.journal
            .append(self.event(EventKind::Chat, payload.message.clone()));
        payload
    }

    fn event(&self, kind: EventKind, content: impl Into<String>) -> NewEvent {
        let mut new = NewEvent::new(kind, self.identity.user.clone(), self.identity.role, content);
        if let Some(current) = self.store.current() {
            new = new.with_capsule(current.id).with_engine(current.engine);
        }
        new
    }

    fn ensure_authority(&self) -> Result<(), SyncError> {
        if self.is_authoritative() {
            Ok(())
        } else {
            Err(SyncError::PermissionDenied {
                role: self.identity.role,
            })
        }
    }

    // -- Role wiring -------------------------------------------------------

    fn start_sovereign(&self) {
        // State publisher: every observed change to (index, playing, mode)
        // goes out as capsule_sync plus a constellation highlight.
        let store = self.store.clone();
        let transport = self.transport.clone();
        let mut state_rx = store.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.tasks.lock().push(tokio::spawn(async move {
            let mut last: Option<(usize, bool, ReplayMode)> = None;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let snapshot = state_rx.borrow_and_update().clone();
                        let key = (snapshot.index, snapshot.is_playing, snapshot.mode);
                        if last == Some(key) {
                            continue;
                        }
                        last = Some(key);
                        publish_state(&transport, &snapshot);
                    }
                }
            }
        }));

        // Playback driver: advances the store on the tick cadence while
        // playing; the store stops itself at the last capsule.
        let store = self.store.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let tick_interval = self.config.tick_interval;
        self.tasks.lock().push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + tick_interval,
                tick_interval,
            );
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        if store.is_playing() {
                            store.tick();
                        }
                    }
                }
            }
        }));

        // Late joiners ask for state; answer with the full snapshot.
        // Weak reference: the transport owns this handler, so a strong
        // capture would cycle.
        let store = self.store.clone();
        let weak_transport = Arc::downgrade(&self.transport);
        let handle = self.transport.on(MessageKind::RequestState, move |_| {
            let Some(transport) = weak_transport.upgrade() else {
                return;
            };
            let snapshot = store.snapshot();
            transport.send(&BroadcastMessage::StateSnapshot(StateSnapshotPayload {
                index: snapshot.index,
                is_playing: snapshot.is_playing,
                mode: snapshot.mode,
                capsules: store.capsules(),
            }));
        });
        self.handlers.lock().push(handle);
    }

    fn start_subordinate(&self) {
        let store = self.store.clone();
        let handle = self.transport.on(MessageKind::CapsuleSync, move |message| {
            if let BroadcastMessage::CapsuleSync(payload) = message {
                apply_capsule_sync(&store, payload);
            }
        });
        self.handlers.lock().push(handle);

        let store = self.store.clone();
        let seek_step = self.config.seek_step;
        let handle = self
            .transport
            .on(MessageKind::PlaybackControl, move |message| {
                if let BroadcastMessage::PlaybackControl(payload) = message {
                    apply_playback_control(&store, seek_step, payload);
                }
            });
        self.handlers.lock().push(handle);

        let store = self.store.clone();
        let handle = self.transport.on(MessageKind::StateSnapshot, move |message| {
            if let BroadcastMessage::StateSnapshot(payload) = message {
                store.install(payload.mode, payload.capsules.clone());
                store.apply_remote(payload.index, payload.is_playing, payload.mode);
            }
        });
        self.handlers.lock().push(handle);

        if self.config.snapshot_on_connect {
            // Ask the sovereign for current state after every (re)connect,
            // so late joiners are not blind until the next state change.
            let transport = self.transport.clone();
            let client_id = self.identity.client_id;
            let mut connect_rx = transport.connect_events();
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let already_up = transport.connected();
            self.tasks.lock().push(tokio::spawn(async move {
                if already_up {
                    transport.send(&BroadcastMessage::RequestState(RequestStatePayload {
                        client_id,
                    }));
                }
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                return;
                            }
                        }
                        event = connect_rx.recv() => {
                            if event.is_err() {
                                return;
                            }
                            transport.send(&BroadcastMessage::RequestState(RequestStatePayload {
                                client_id,
                            }));
                        }
                    }
                }
            }));
        }
    }
}

fn publish_state(transport: &TransportClient, snapshot: &ReplaySnapshot) {
    transport.send(&BroadcastMessage::CapsuleSync(CapsuleSyncPayload {
        index: snapshot.index,
        capsule: snapshot.current.clone(),
        is_playing: snapshot.is_playing,
        mode: snapshot.mode,
    }));
    if let Some(current) = &snapshot.current {
        transport.send(&BroadcastMessage::ConstellationUpdate(
            ConstellationPayload {
                highlighted_engine: current.engine.clone(),
                status: current.status.clone(),
            },
        ));
    }
}

/// Apply a published state mirror: idempotent capsule merge, then direct
/// field sets (last write wins per field).
fn apply_capsule_sync(store: &ReplayStore, payload: &CapsuleSyncPayload) {
    if let Some(capsule) = &payload.capsule {
        store.merge_capsule(capsule.clone());
    }
    store.apply_remote(payload.index, payload.is_playing, payload.mode);
}

/// Apply a remote playback command
fn apply_playback_control(store: &ReplayStore, seek_step: usize, payload: &PlaybackControlPayload) {
    match payload.action {
        PlaybackAction::Play => store.set_playing(true),
        PlaybackAction::Pause => store.set_playing(false),
        PlaybackAction::Seek => {
            if let Some(target) = payload.target_index {
                store.set_index(target);
            }
        }
        PlaybackAction::Reset => {
            store.set_index(0);
            store.set_playing(false);
        }
        PlaybackAction::FastForward => store.step(seek_step as i64),
        PlaybackAction::Rewind => store.step(-(seek_step as i64)),
    }
}
