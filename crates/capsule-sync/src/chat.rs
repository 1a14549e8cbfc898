//! Chat feed
//!
//! Ordered view of session chat assembled from live `message` frames and
//! the relay's `history` backfill. Backfill replaces anything already held
//! so a reconnect does not duplicate messages.

use crate::proto::{BroadcastMessage, ChatPayload, MessageKind};
use crate::transport::{HandlerId, TransportClient};
use parking_lot::Mutex;
use std::sync::Arc;

/// Collected chat for one session
#[derive(Debug, Default)]
pub struct ChatFeed {
    messages: Arc<Mutex<Vec<ChatPayload>>>,
    handlers: Mutex<Vec<HandlerId>>,
}

impl ChatFeed {
    /// Empty feed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this feed to a transport's chat traffic
    pub fn attach(&self, transport: &TransportClient) {
        let sink = self.messages.clone();
        let handle = transport.on(MessageKind::Chat, move |message| {
            if let BroadcastMessage::Chat(chat) = message {
                sink.lock().push(chat.clone());
            }
        });
        self.handlers.lock().push(handle);

        let sink = self.messages.clone();
        let handle = transport.on(MessageKind::History, move |message| {
            if let BroadcastMessage::History(history) = message {
                let mut guard = sink.lock();
                guard.clear();
                guard.extend(history.messages.iter().cloned());
            }
        });
        self.handlers.lock().push(handle);
    }

    /// Unsubscribe from a transport
    pub fn detach(&self, transport: &TransportClient) {
        for handle in self.handlers.lock().drain(..) {
            transport.off(handle);
        }
    }

    /// All messages seen so far, oldest first
    #[must_use]
    pub fn messages(&self) -> Vec<ChatPayload> {
        self.messages.lock().clone()
    }

    /// Number of messages held
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether the feed is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRelay;
    use capsule_core::{ClientIdentity, Role};
    use std::time::Duration;

    fn chat(user: &str, text: &str) -> ChatPayload {
        ChatPayload {
            user: user.to_string(),
            role: Role::Council,
            message: text.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn live_messages_accumulate_in_order() {
        let relay = MemoryRelay::new();
        let client = TransportClient::new(
            ClientIdentity::new("amara", Role::Observer),
            Arc::new(relay.link()),
            Duration::from_secs(3),
        );
        let feed = ChatFeed::new();
        feed.attach(&client);
        assert!(client.connect().await);

        for text in ["one", "two", "three"] {
            relay.publish(
                serde_json::to_string(&BroadcastMessage::Chat(chat("kofi", text))).unwrap(),
            );
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen: Vec<String> = feed.messages().into_iter().map(|m| m.message).collect();
        assert_eq!(seen, vec!["one", "two", "three"]);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn history_backfill_replaces_held_messages() {
        let relay = MemoryRelay::new();
        let client = TransportClient::new(
            ClientIdentity::new("amara", Role::Observer),
            Arc::new(relay.link()),
            Duration::from_secs(3),
        );
        let feed = ChatFeed::new();
        feed.attach(&client);
        assert!(client.connect().await);

        relay.publish(
            serde_json::to_string(&BroadcastMessage::Chat(chat("kofi", "stale"))).unwrap(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        relay.publish(
            serde_json::to_string(&BroadcastMessage::History(crate::proto::HistoryPayload {
                messages: vec![chat("ama", "fresh-1"), chat("ama", "fresh-2")],
            }))
            .unwrap(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen: Vec<String> = feed.messages().into_iter().map(|m| m.message).collect();
        assert_eq!(seen, vec!["fresh-1", "fresh-2"]);
        client.disconnect().await;
    }
}
