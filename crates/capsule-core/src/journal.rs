//! Unified event journal
//!
//! Append-only log of annotation, chat, capsule, and feedback events,
//! cross-referenced to capsules by id but never embedded in replay state.
//! The conceptual append-only semantics are decoupled from the storage
//! backend's write granularity behind [`JournalStore`].

use crate::error::JournalError;
use crate::types::{CapsuleId, Role};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Unique event identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Generate a new event ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Operator annotation on a capsule
    Annotation,
    /// Chat message
    Chat,
    /// Capsule lifecycle event
    Capsule,
    /// Audience feedback
    Feedback,
}

impl EventKind {
    /// Kind name as persisted
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Annotation => "annotation",
            EventKind::Chat => "chat",
            EventKind::Capsule => "capsule",
            EventKind::Feedback => "feedback",
        }
    }
}

/// One journal entry; immutable once created except explicit deletion by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedEvent {
    /// Unique id
    pub id: EventId,
    /// Category
    pub kind: EventKind,
    /// Capsule this event is tied to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capsule_id: Option<CapsuleId>,
    /// Engine the event concerns, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Acting user
    pub user: String,
    /// Acting role
    pub role: Role,
    /// Event body
    pub content: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Optional open key-value bag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Fields supplied when appending; id and timestamp are assigned by the journal
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Category
    pub kind: EventKind,
    /// Capsule link
    pub capsule_id: Option<CapsuleId>,
    /// Engine link
    pub engine: Option<String>,
    /// Acting user
    pub user: String,
    /// Acting role
    pub role: Role,
    /// Event body
    pub content: String,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Optional metadata
    pub metadata: Option<serde_json::Value>,
}

impl NewEvent {
    /// Minimal event of a kind
    #[must_use]
    pub fn new(kind: EventKind, user: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            kind,
            capsule_id: None,
            engine: None,
            user: user.into(),
            role,
            content: content.into(),
            tags: Vec::new(),
            metadata: None,
        }
    }

    /// Tie the event to a capsule
    #[inline]
    #[must_use]
    pub fn with_capsule(mut self, capsule_id: CapsuleId) -> Self {
        self.capsule_id = Some(capsule_id);
        self
    }

    /// Tie the event to an engine
    #[inline]
    #[must_use]
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    /// Attach tags
    #[inline]
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Attach metadata
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Persistence backend for the journal.
///
/// The journal stays conceptually append-only regardless of how coarsely
/// the backend writes; the shipped file backend rewrites the whole array,
/// matching the storage layer it replaces.
pub trait JournalStore: Send + Sync {
    /// Persist the full event list
    fn persist(&self, events: &[UnifiedEvent]) -> Result<(), JournalError>;

    /// Restore the persisted event list, empty when nothing was stored
    fn restore(&self) -> Result<Vec<UnifiedEvent>, JournalError>;
}

/// Whole-array JSON file backend
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Backend writing to `path`
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl JournalStore for JsonFileStore {
    fn persist(&self, events: &[UnifiedEvent]) -> Result<(), JournalError> {
        let encoded = serde_json::to_vec_pretty(events)?;
        std::fs::write(&self.path, encoded)?;
        Ok(())
    }

    fn restore(&self) -> Result<Vec<UnifiedEvent>, JournalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// In-memory backend for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: Mutex<Vec<UnifiedEvent>>,
}

impl MemoryStore {
    /// Empty backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl JournalStore for MemoryStore {
    fn persist(&self, events: &[UnifiedEvent]) -> Result<(), JournalError> {
        *self.events.lock() = events.to_vec();
        Ok(())
    }

    fn restore(&self) -> Result<Vec<UnifiedEvent>, JournalError> {
        Ok(self.events.lock().clone())
    }
}

/// The unified event journal.
///
/// Appends are synchronous and best-effort: a failed persist is logged and
/// swallowed, the in-memory event stands. Event creation never blocks or
/// fails for the caller.
pub struct Journal {
    store: Arc<dyn JournalStore>,
    events: Mutex<Vec<UnifiedEvent>>,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("events", &self.events.lock().len())
            .finish()
    }
}

impl Journal {
    /// Open a journal over a backend, restoring any persisted events.
    ///
    /// A failed restore starts the journal empty rather than failing the
    /// caller.
    #[must_use]
    pub fn open(store: Arc<dyn JournalStore>) -> Self {
        let events = match store.restore() {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!(%err, "journal restore failed, starting empty");
                Vec::new()
            }
        };
        Self {
            store,
            events: Mutex::new(events),
        }
    }

    /// Journal backed by memory only
    #[inline]
    #[must_use]
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryStore::new()))
    }

    /// Append an event; always succeeds from the caller's perspective
    pub fn append(&self, new: NewEvent) -> UnifiedEvent {
        let event = UnifiedEvent {
            id: EventId::new(),
            kind: new.kind,
            capsule_id: new.capsule_id,
            engine: new.engine,
            user: new.user,
            role: new.role,
            content: new.content,
            timestamp: Utc::now(),
            tags: new.tags,
            metadata: new.metadata,
        };
        let mut guard = self.events.lock();
        guard.push(event.clone());
        if let Err(err) = self.store.persist(&guard) {
            tracing::warn!(%err, event_id = %event.id, "journal persist failed, event kept in memory");
        }
        event
    }

    /// Delete an event by id; returns whether one was removed
    pub fn remove(&self, id: EventId) -> bool {
        let mut guard = self.events.lock();
        let before = guard.len();
        guard.retain(|e| e.id != id);
        let removed = guard.len() != before;
        if removed {
            if let Err(err) = self.store.persist(&guard) {
                tracing::warn!(%err, "journal persist failed after removal");
            }
        }
        removed
    }

    /// All events, in append order
    #[inline]
    #[must_use]
    pub fn events(&self) -> Vec<UnifiedEvent> {
        self.events.lock().clone()
    }

    /// Number of events
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether the journal is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Events tagged with a capsule id
    #[must_use]
    pub fn by_capsule(&self, capsule_id: &CapsuleId) -> Vec<UnifiedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.capsule_id.as_ref() == Some(capsule_id))
            .cloned()
            .collect()
    }

    /// Events whose timestamps fall within `[from, to]` inclusive
    #[must_use]
    pub fn in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<UnifiedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.timestamp >= from && e.timestamp <= to)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(user: &str) -> NewEvent {
        NewEvent::new(EventKind::Annotation, user, Role::Council, "noted")
    }

    #[test]
    fn append_assigns_id_and_timestamp() {
        let journal = Journal::in_memory();
        let event = journal.append(annotation("amara"));
        assert_eq!(event.kind, EventKind::Annotation);
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.events()[0].id, event.id);
    }

    #[test]
    fn remove_by_id() {
        let journal = Journal::in_memory();
        let keep = journal.append(annotation("a"));
        let gone = journal.append(annotation("b"));

        assert!(journal.remove(gone.id));
        assert!(!journal.remove(gone.id));
        assert_eq!(journal.events()[0].id, keep.id);
    }

    #[test]
    fn by_capsule_filters_links() {
        let journal = Journal::in_memory();
        let linked = CapsuleId::from("cap-7");
        journal.append(annotation("a").with_capsule(linked.clone()));
        journal.append(annotation("b"));

        let hits = journal.by_capsule(&linked);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].user, "a");
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.json");

        {
            let journal = Journal::open(Arc::new(JsonFileStore::new(&path)));
            journal.append(annotation("amara").with_tags(vec!["treasury".to_string()]));
            journal.append(annotation("ravi"));
        }

        let reopened = Journal::open(Arc::new(JsonFileStore::new(&path)));
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.events()[0].tags, vec!["treasury".to_string()]);
    }

    #[test]
    fn persist_failure_keeps_event_in_memory() {
        struct Broken;

        impl JournalStore for Broken {
            fn persist(&self, _events: &[UnifiedEvent]) -> Result<(), JournalError> {
                Err(JournalError::Storage(std::io::Error::other("disk gone")))
            }

            fn restore(&self) -> Result<Vec<UnifiedEvent>, JournalError> {
                Ok(Vec::new())
            }
        }

        let journal = Journal::open(Arc::new(Broken));
        journal.append(annotation("amara"));
        assert_eq!(journal.len(), 1);
    }
}
