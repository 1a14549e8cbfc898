//! Replay state store
//!
//! Single source of truth for the capsule list, position index, playback
//! flag, and replay mode. Mutation happens only through the setters here;
//! observers follow the store through a watch snapshot stream instead of
//! any implicit re-render coupling.

use crate::error::LoadError;
use crate::types::{ReplayCapsule, ReplayMode};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Source of capsule lists, keyed by replay mode.
///
/// The data source itself is external; fetch failures surface as
/// [`LoadError`] and never crash the store.
#[async_trait]
pub trait CapsuleSource: Send + Sync {
    /// Fetch the capsule list for a mode
    async fn fetch(&self, mode: ReplayMode) -> Result<Vec<ReplayCapsule>, LoadError>;
}

/// Point-in-time view of the store, published to observers on every change
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySnapshot {
    /// Active replay mode
    pub mode: ReplayMode,
    /// Current position (always in `[0, len-1]` when non-empty)
    pub index: usize,
    /// Whether playback is advancing
    pub is_playing: bool,
    /// Capsule at the current position, if any
    pub current: Option<ReplayCapsule>,
    /// Number of loaded capsules
    pub capsule_count: usize,
}

#[derive(Debug)]
struct StoreInner {
    capsules: Vec<ReplayCapsule>,
    index: usize,
    is_playing: bool,
    mode: ReplayMode,
}

impl StoreInner {
    fn snapshot(&self) -> ReplaySnapshot {
        ReplaySnapshot {
            mode: self.mode,
            index: self.index,
            is_playing: self.is_playing,
            current: self.capsules.get(self.index).cloned(),
            capsule_count: self.capsules.len(),
        }
    }

    fn clamp_index(&self, requested: usize) -> usize {
        if self.capsules.is_empty() {
            0
        } else {
            requested.min(self.capsules.len() - 1)
        }
    }
}

/// Owned replay state with an observer stream.
///
/// The store is role-agnostic: authority enforcement lives in the sync
/// coordinator, which is the only component bridging local mutation and
/// the transport.
pub struct ReplayStore {
    source: Arc<dyn CapsuleSource>,
    inner: Mutex<StoreInner>,
    watch_tx: watch::Sender<ReplaySnapshot>,
}

impl std::fmt::Debug for ReplayStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.lock();
        f.debug_struct("ReplayStore")
            .field("mode", &guard.mode)
            .field("index", &guard.index)
            .field("is_playing", &guard.is_playing)
            .field("capsules", &guard.capsules.len())
            .finish()
    }
}

impl ReplayStore {
    /// Create an empty store bound to a capsule source
    #[must_use]
    pub fn new(source: Arc<dyn CapsuleSource>) -> Self {
        let inner = StoreInner {
            capsules: Vec::new(),
            index: 0,
            is_playing: false,
            mode: ReplayMode::default(),
        };
        let (watch_tx, _) = watch::channel(inner.snapshot());
        Self {
            source,
            inner: Mutex::new(inner),
            watch_tx,
        }
    }

    /// Subscribe to state snapshots.
    ///
    /// The receiver sees the snapshot current at subscription time and
    /// every subsequent change.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ReplaySnapshot> {
        self.watch_tx.subscribe()
    }

    /// Current snapshot
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> ReplaySnapshot {
        self.inner.lock().snapshot()
    }

    /// Capsule at the current position; `None` when the list is empty
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<ReplayCapsule> {
        let guard = self.inner.lock();
        guard.capsules.get(guard.index).cloned()
    }

    /// Full capsule list (cloned)
    #[inline]
    #[must_use]
    pub fn capsules(&self) -> Vec<ReplayCapsule> {
        self.inner.lock().capsules.clone()
    }

    /// Number of loaded capsules
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().capsules.len()
    }

    /// Whether no capsules are loaded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().capsules.is_empty()
    }

    /// Current position index
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.inner.lock().index
    }

    /// Whether playback is advancing
    #[inline]
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.inner.lock().is_playing
    }

    /// Active replay mode
    #[inline]
    #[must_use]
    pub fn mode(&self) -> ReplayMode {
        self.inner.lock().mode
    }

    /// Fetch and install the capsule list for `mode`.
    ///
    /// On success replaces the list, resets the index to 0 and stops
    /// playback. On failure the previous state is left untouched.
    ///
    /// # Errors
    /// [`LoadError`] from the capsule source; never retried here.
    pub async fn load(&self, mode: ReplayMode) -> Result<usize, LoadError> {
        let capsules = self.source.fetch(mode).await?;
        let count = capsules.len();
        tracing::debug!(mode = %mode, count, "capsule list loaded");
        self.install(mode, capsules);
        Ok(count)
    }

    /// Switch mode; equivalent to [`ReplayStore::load`]
    pub async fn set_mode(&self, mode: ReplayMode) -> Result<usize, LoadError> {
        self.load(mode).await
    }

    /// Replace the capsule list wholesale and reset position/playback.
    ///
    /// Used by `load` and by snapshot application on subordinate clients.
    pub fn install(&self, mode: ReplayMode, capsules: Vec<ReplayCapsule>) {
        let snap = {
            let mut guard = self.inner.lock();
            guard.mode = mode;
            guard.capsules = capsules;
            guard.index = 0;
            guard.is_playing = false;
            guard.snapshot()
        };
        self.watch_tx.send_replace(snap);
    }

    /// Set the position index, clamped into `[0, len-1]`.
    ///
    /// No-op when the capsule list is empty.
    pub fn set_index(&self, index: usize) {
        let snap = {
            let mut guard = self.inner.lock();
            if guard.capsules.is_empty() {
                return;
            }
            guard.index = guard.clamp_index(index);
            guard.snapshot()
        };
        self.watch_tx.send_replace(snap);
    }

    /// Move the position index by a signed step, clamped to bounds
    pub fn step(&self, delta: i64) {
        let snap = {
            let mut guard = self.inner.lock();
            if guard.capsules.is_empty() {
                return;
            }
            let raw = guard.index as i64 + delta;
            let max = (guard.capsules.len() - 1) as i64;
            guard.index = raw.clamp(0, max) as usize;
            guard.snapshot()
        };
        self.watch_tx.send_replace(snap);
    }

    /// Set the playback flag
    pub fn set_playing(&self, playing: bool) {
        let snap = {
            let mut guard = self.inner.lock();
            guard.is_playing = playing;
            guard.snapshot()
        };
        self.watch_tx.send_replace(snap);
    }

    /// Advance playback by one position.
    ///
    /// Called on the playback cadence while playing. Reaching the last
    /// element stops playback on the same tick; the index never passes
    /// `len - 1`.
    pub fn tick(&self) {
        let snap = {
            let mut guard = self.inner.lock();
            if !guard.is_playing || guard.capsules.is_empty() {
                return;
            }
            let last = guard.capsules.len() - 1;
            if guard.index < last {
                guard.index += 1;
            }
            if guard.index >= last {
                guard.is_playing = false;
            }
            guard.snapshot()
        };
        self.watch_tx.send_replace(snap);
    }

    /// Append a capsule unless one with the same id is already present.
    ///
    /// Returns `true` when the capsule was added. This is the idempotent
    /// merge used when applying published sync state.
    pub fn merge_capsule(&self, capsule: ReplayCapsule) -> bool {
        let snap = {
            let mut guard = self.inner.lock();
            if guard.capsules.iter().any(|c| c.id == capsule.id) {
                return false;
            }
            guard.capsules.push(capsule);
            guard.snapshot()
        };
        self.watch_tx.send_replace(snap);
        true
    }

    /// Apply remotely published playback fields in one step.
    ///
    /// Direct field sets with index clamping; no fetch is triggered even
    /// when the mode changes, because subordinates mirror rather than load.
    pub fn apply_remote(&self, index: usize, is_playing: bool, mode: ReplayMode) {
        let snap = {
            let mut guard = self.inner.lock();
            guard.mode = mode;
            guard.is_playing = is_playing;
            guard.index = guard.clamp_index(index);
            guard.snapshot()
        };
        self.watch_tx.send_replace(snap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CapsuleId, CapsuleStatus};
    use proptest::prelude::*;

    struct EmptySource;

    #[async_trait]
    impl CapsuleSource for EmptySource {
        async fn fetch(&self, _mode: ReplayMode) -> Result<Vec<ReplayCapsule>, LoadError> {
            Ok(Vec::new())
        }
    }

    fn capsule(id: &str) -> ReplayCapsule {
        ReplayCapsule {
            id: CapsuleId::from(id),
            timestamp: chrono::Utc::now(),
            engine: "treasury".to_string(),
            status: CapsuleStatus::Operational,
            event: None,
            metadata: None,
        }
    }

    fn store_with(n: usize) -> ReplayStore {
        let store = ReplayStore::new(Arc::new(EmptySource));
        let capsules = (0..n).map(|i| capsule(&format!("c{i}"))).collect();
        store.install(ReplayMode::Daily, capsules);
        store
    }

    #[test]
    fn empty_store_has_no_current() {
        let store = ReplayStore::new(Arc::new(EmptySource));
        assert!(store.current().is_none());
        store.set_index(7);
        assert_eq!(store.index(), 0);
    }

    #[test]
    fn set_index_clamps_to_bounds() {
        let store = store_with(3);
        store.set_index(99);
        assert_eq!(store.index(), 2);
        store.set_index(0);
        assert_eq!(store.index(), 0);
    }

    proptest! {
        #[test]
        fn index_clamping_law(len in 1usize..64, requested in 0usize..1024) {
            let store = store_with(len);
            store.set_index(requested);
            prop_assert_eq!(store.index(), requested.min(len - 1));
        }
    }

    #[test]
    fn tick_terminates_without_overshoot() {
        let store = store_with(4);
        store.set_playing(true);
        for _ in 0..10 {
            store.tick();
        }
        assert_eq!(store.index(), 3);
        assert!(!store.is_playing());
    }

    #[test]
    fn tick_stops_on_the_tick_that_reaches_the_end() {
        let store = store_with(3);
        store.set_index(1);
        store.set_playing(true);
        store.tick();
        assert_eq!(store.index(), 2);
        assert!(!store.is_playing());
    }

    #[test]
    fn tick_on_last_element_stops_without_advancing() {
        let store = store_with(2);
        store.set_index(1);
        store.set_playing(true);
        store.tick();
        assert_eq!(store.index(), 1);
        assert!(!store.is_playing());
    }

    #[test]
    fn merge_capsule_is_idempotent() {
        let store = store_with(1);
        assert!(store.merge_capsule(capsule("c9")));
        assert!(!store.merge_capsule(capsule("c9")));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn step_clamps_both_directions() {
        let store = store_with(3);
        store.step(-5);
        assert_eq!(store.index(), 0);
        store.step(50);
        assert_eq!(store.index(), 2);
    }

    #[tokio::test]
    async fn mode_switch_resets_position_and_playback() {
        struct TwoCapsules;

        #[async_trait]
        impl CapsuleSource for TwoCapsules {
            async fn fetch(&self, _mode: ReplayMode) -> Result<Vec<ReplayCapsule>, LoadError> {
                Ok(vec![capsule("a"), capsule("b")])
            }
        }

        let store = ReplayStore::new(Arc::new(TwoCapsules));
        store.load(ReplayMode::Daily).await.unwrap();
        store.set_index(1);
        store.set_playing(true);

        store.set_mode(ReplayMode::Epochal).await.unwrap();
        assert_eq!(store.index(), 0);
        assert!(!store.is_playing());
        assert_eq!(store.mode(), ReplayMode::Epochal);
    }

    #[tokio::test]
    async fn failed_load_leaves_state_untouched() {
        struct Failing;

        #[async_trait]
        impl CapsuleSource for Failing {
            async fn fetch(&self, _mode: ReplayMode) -> Result<Vec<ReplayCapsule>, LoadError> {
                Err(LoadError::Status(502))
            }
        }

        let store = ReplayStore::new(Arc::new(Failing));
        store.install(ReplayMode::Daily, vec![capsule("keep")]);
        store.set_playing(true);

        assert!(store.load(ReplayMode::Seasonal).await.is_err());
        assert_eq!(store.mode(), ReplayMode::Daily);
        assert_eq!(store.len(), 1);
        assert!(store.is_playing());
    }

    #[tokio::test]
    async fn subscribers_observe_changes() {
        let store = store_with(2);
        let mut rx = store.subscribe();
        rx.mark_unchanged();

        store.set_index(1);
        rx.changed().await.unwrap();
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.index, 1);
        assert_eq!(snap.current.unwrap().id, CapsuleId::from("c1"));
    }
}
