//! Wire protocol
//!
//! JSON messages exchanged over the relay channel, discriminated by a
//! `type` field. The shapes here are the contract between sovereign and
//! subordinate clients; the relay itself treats frames as opaque except
//! for chat history recording.

use capsule_core::{CapsuleStatus, ReplayCapsule, ReplayMode, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unit on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastMessage {
    /// Role registration, sent once after connect
    Join(JoinPayload),
    /// Sovereign-published playback state mirror
    CapsuleSync(CapsuleSyncPayload),
    /// Sovereign-published engine highlight
    ConstellationUpdate(ConstellationPayload),
    /// Remote playback command
    PlaybackControl(PlaybackControlPayload),
    /// Chat message
    #[serde(rename = "message")]
    Chat(ChatPayload),
    /// Relay chat backfill, sent to each new connection
    History(HistoryPayload),
    /// Late joiner asking the sovereign for current state
    RequestState(RequestStatePayload),
    /// Sovereign's answer to a state request
    StateSnapshot(StateSnapshotPayload),
}

impl BroadcastMessage {
    /// Discriminator of this message
    #[inline]
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            BroadcastMessage::Join(_) => MessageKind::Join,
            BroadcastMessage::CapsuleSync(_) => MessageKind::CapsuleSync,
            BroadcastMessage::ConstellationUpdate(_) => MessageKind::ConstellationUpdate,
            BroadcastMessage::PlaybackControl(_) => MessageKind::PlaybackControl,
            BroadcastMessage::Chat(_) => MessageKind::Chat,
            BroadcastMessage::History(_) => MessageKind::History,
            BroadcastMessage::RequestState(_) => MessageKind::RequestState,
            BroadcastMessage::StateSnapshot(_) => MessageKind::StateSnapshot,
        }
    }
}

/// Message discriminator, used to key handler registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `join`
    Join,
    /// `capsule_sync`
    CapsuleSync,
    /// `constellation_update`
    ConstellationUpdate,
    /// `playback_control`
    PlaybackControl,
    /// `message`
    Chat,
    /// `history`
    History,
    /// `request_state`
    RequestState,
    /// `state_snapshot`
    StateSnapshot,
}

/// `join` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPayload {
    /// Display name
    pub user: String,
    /// Session role
    pub role: Role,
    /// Per-session client id
    pub client_id: Uuid,
    /// Send time
    pub timestamp: DateTime<Utc>,
}

/// `capsule_sync` body: the sovereign's playback state mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapsuleSyncPayload {
    /// Current position
    pub index: usize,
    /// Capsule at the current position, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capsule: Option<ReplayCapsule>,
    /// Playback flag
    pub is_playing: bool,
    /// Active mode
    pub mode: ReplayMode,
}

/// `constellation_update` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstellationPayload {
    /// Engine to highlight
    pub highlighted_engine: String,
    /// Its reported status
    pub status: CapsuleStatus,
}

/// Remote playback command verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackAction {
    /// Start playback
    Play,
    /// Stop playback
    Pause,
    /// Jump to `target_index`
    Seek,
    /// Back to the start, paused
    Reset,
    /// Advance by the seek step
    FastForward,
    /// Back by the seek step
    Rewind,
}

/// `playback_control` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackControlPayload {
    /// Command verb
    pub action: PlaybackAction,
    /// Target for `seek`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_index: Option<usize>,
}

/// `message` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    /// Sender display name
    pub user: String,
    /// Sender role
    pub role: Role,
    /// Message text
    pub message: String,
    /// Send time
    pub timestamp: DateTime<Utc>,
}

/// `history` body: chat backfill for a new connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPayload {
    /// Recorded chat, oldest first
    pub messages: Vec<ChatPayload>,
}

/// `request_state` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStatePayload {
    /// Requesting client
    pub client_id: Uuid,
}

/// `state_snapshot` body: full shared state for late joiners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshotPayload {
    /// Current position
    pub index: usize,
    /// Playback flag
    pub is_playing: bool,
    /// Active mode
    pub mode: ReplayMode,
    /// Full capsule list in chronological order
    pub capsules: Vec<ReplayCapsule>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_core::CapsuleId;
    use pretty_assertions::assert_eq;

    fn capsule() -> ReplayCapsule {
        ReplayCapsule {
            id: CapsuleId::from("cap-1"),
            timestamp: "2025-12-15T00:00:00Z".parse().unwrap(),
            engine: "treasury".to_string(),
            status: CapsuleStatus::Degraded,
            event: Some("ledger sealed".to_string()),
            metadata: None,
        }
    }

    #[test]
    fn capsule_sync_wire_shape() {
        let msg = BroadcastMessage::CapsuleSync(CapsuleSyncPayload {
            index: 2,
            capsule: Some(capsule()),
            is_playing: true,
            mode: ReplayMode::Seasonal,
        });
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "capsule_sync");
        assert_eq!(value["index"], 2);
        assert_eq!(value["mode"], "seasonal");
        assert_eq!(value["capsule"]["status"], "degraded");
    }

    #[test]
    fn chat_uses_message_tag() {
        let msg = BroadcastMessage::Chat(ChatPayload {
            user: "amara".to_string(),
            role: Role::Heir,
            message: "hello".to_string(),
            timestamp: Utc::now(),
        });
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["role"], "heir");
    }

    #[test]
    fn playback_control_round_trip() {
        let msg = BroadcastMessage::PlaybackControl(PlaybackControlPayload {
            action: PlaybackAction::FastForward,
            target_index: None,
        });
        let text = serde_json::to_string(&msg).unwrap();
        assert!(text.contains("fast_forward"));
        let back: BroadcastMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn all_kinds_round_trip() {
        let messages = vec![
            BroadcastMessage::Join(JoinPayload {
                user: "amara".to_string(),
                role: Role::Sovereign,
                client_id: Uuid::new_v4(),
                timestamp: Utc::now(),
            }),
            BroadcastMessage::ConstellationUpdate(ConstellationPayload {
                highlighted_engine: "archive".to_string(),
                status: CapsuleStatus::Operational,
            }),
            BroadcastMessage::History(HistoryPayload { messages: vec![] }),
            BroadcastMessage::RequestState(RequestStatePayload {
                client_id: Uuid::new_v4(),
            }),
            BroadcastMessage::StateSnapshot(StateSnapshotPayload {
                index: 0,
                is_playing: false,
                mode: ReplayMode::Daily,
                capsules: vec![capsule()],
            }),
        ];
        for msg in messages {
            let text = serde_json::to_string(&msg).unwrap();
            let back: BroadcastMessage = serde_json::from_str(&text).unwrap();
            assert_eq!(back.kind(), msg.kind());
            assert_eq!(back, msg);
        }
    }

    #[test]
    fn malformed_frames_do_not_parse() {
        assert!(serde_json::from_str::<BroadcastMessage>("{\"type\":\"mystery\"}").is_err());
        assert!(serde_json::from_str::<BroadcastMessage>("not json").is_err());
    }
}
