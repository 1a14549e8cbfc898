//! Time-window correlation over the event journal
//!
//! Best-effort, descriptive correlation: given a capsule, find the events
//! that happened around its tagged activity and count naive co-occurrence
//! patterns. No statistical guarantee is intended.

use crate::journal::{Journal, UnifiedEvent};
use crate::types::CapsuleId;
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Result of correlating a capsule's activity with surrounding events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCorrelation {
    /// Capsule the correlation anchors on
    pub capsule_id: CapsuleId,
    /// Window applied on both sides of the anchor range, in minutes
    pub window_minutes: i64,
    /// Min/max timestamp of events tagged with the capsule; `None` when
    /// no event is tagged (the correlation is then empty)
    pub anchor_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Every event inside the widened range, tagged or not
    pub events: Vec<UnifiedEvent>,
    /// Naive co-occurrence patterns over the included events
    pub patterns: CorrelationPatterns,
}

/// Co-occurrence counts over correlated events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationPatterns {
    /// Event count per kind
    pub by_kind: IndexMap<String, usize>,
    /// Event count per engine (untagged engines excluded)
    pub by_engine: IndexMap<String, usize>,
    /// Event count per role
    pub by_role: IndexMap<String, usize>,
    /// Tags occurring at least twice, with their counts
    pub recurring_tags: Vec<(String, usize)>,
}

impl CorrelationPatterns {
    fn detect(events: &[UnifiedEvent]) -> Self {
        let mut patterns = Self::default();
        let mut tag_counts: IndexMap<String, usize> = IndexMap::new();

        for event in events {
            *patterns
                .by_kind
                .entry(event.kind.as_str().to_string())
                .or_default() += 1;
            if let Some(engine) = &event.engine {
                *patterns.by_engine.entry(engine.clone()).or_default() += 1;
            }
            *patterns
                .by_role
                .entry(event.role.as_str().to_string())
                .or_default() += 1;
            for tag in &event.tags {
                *tag_counts.entry(tag.clone()).or_default() += 1;
            }
        }

        patterns.recurring_tags = tag_counts
            .into_iter()
            .filter(|(_, count)| *count >= 2)
            .collect();
        patterns
    }
}

impl Journal {
    /// Correlate events around a capsule's tagged activity.
    ///
    /// The anchor range is the min/max timestamp of events already tagged
    /// with `capsule_id`, widened by `window_minutes` on both sides; every
    /// event inside the widened range is included.
    #[must_use]
    pub fn correlate(&self, capsule_id: &CapsuleId, window_minutes: i64) -> EventCorrelation {
        let tagged = self.by_capsule(capsule_id);
        let anchor_range = match (
            tagged.iter().map(|e| e.timestamp).min(),
            tagged.iter().map(|e| e.timestamp).max(),
        ) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        };

        let events = match anchor_range {
            Some((min, max)) => {
                let window = Duration::minutes(window_minutes);
                self.in_range(min - window, max + window)
            }
            None => Vec::new(),
        };

        let patterns = CorrelationPatterns::detect(&events);
        EventCorrelation {
            capsule_id: capsule_id.clone(),
            window_minutes,
            anchor_range,
            events,
            patterns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{EventKind, JournalStore, MemoryStore, NewEvent, UnifiedEvent};
    use crate::types::Role;
    use std::sync::Arc;

    // Appending through the journal stamps "now"; correlation tests need
    // controlled timestamps, so events are seeded through the backend.
    fn seeded(events: Vec<UnifiedEvent>) -> Journal {
        let store = MemoryStore::new();
        store.persist(&events).unwrap();
        Journal::open(Arc::new(store))
    }

    fn event_at(
        minutes: i64,
        capsule: Option<&str>,
        kind: EventKind,
        tags: &[&str],
    ) -> UnifiedEvent {
        let base = chrono::DateTime::parse_from_rfc3339("2025-12-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut new = NewEvent::new(kind, "amara", Role::Council, "entry")
            .with_tags(tags.iter().map(|t| t.to_string()).collect());
        if let Some(id) = capsule {
            new = new.with_capsule(CapsuleId::from(id));
        }
        UnifiedEvent {
            id: crate::journal::EventId::new(),
            kind: new.kind,
            capsule_id: new.capsule_id,
            engine: new.engine,
            user: new.user,
            role: new.role,
            content: new.content,
            timestamp: base + Duration::minutes(minutes),
            tags: new.tags,
            metadata: None,
        }
    }

    #[test]
    fn window_includes_nearby_and_excludes_distant() {
        let journal = seeded(vec![
            event_at(0, Some("cap-x"), EventKind::Annotation, &[]),
            event_at(9, None, EventKind::Chat, &[]),
            event_at(11, None, EventKind::Chat, &[]),
        ]);

        let correlation = journal.correlate(&CapsuleId::from("cap-x"), 10);
        assert_eq!(correlation.events.len(), 2);
        assert!(correlation
            .events
            .iter()
            .all(|e| e.timestamp <= correlation.anchor_range.unwrap().1 + Duration::minutes(10)));
    }

    #[test]
    fn anchor_spans_min_to_max_of_tagged_events() {
        let journal = seeded(vec![
            event_at(0, Some("cap-x"), EventKind::Annotation, &[]),
            event_at(30, Some("cap-x"), EventKind::Feedback, &[]),
            event_at(15, None, EventKind::Chat, &[]),
            event_at(35, None, EventKind::Chat, &[]),
        ]);

        let correlation = journal.correlate(&CapsuleId::from("cap-x"), 5);
        // 0, 15, 30 and 35 all fall inside [0-5, 30+5]
        assert_eq!(correlation.events.len(), 4);
    }

    #[test]
    fn untagged_capsule_yields_empty_correlation() {
        let journal = seeded(vec![event_at(0, None, EventKind::Chat, &[])]);
        let correlation = journal.correlate(&CapsuleId::from("nothing"), 60);
        assert!(correlation.anchor_range.is_none());
        assert!(correlation.events.is_empty());
        assert!(correlation.patterns.by_kind.is_empty());
    }

    #[test]
    fn patterns_count_kinds_and_recurring_tags() {
        let journal = seeded(vec![
            event_at(0, Some("cap-x"), EventKind::Annotation, &["urgent"]),
            event_at(1, None, EventKind::Chat, &["urgent"]),
            event_at(2, None, EventKind::Chat, &["once"]),
        ]);

        let correlation = journal.correlate(&CapsuleId::from("cap-x"), 10);
        assert_eq!(correlation.patterns.by_kind.get("chat"), Some(&2));
        assert_eq!(correlation.patterns.by_kind.get("annotation"), Some(&1));
        assert_eq!(
            correlation.patterns.recurring_tags,
            vec![("urgent".to_string(), 2)]
        );
    }
}
