//! Core types for the replay layer
//!
//! Defines the fundamental types shared across the workspace:
//! - Replay capsules and their open status set
//! - Replay modes (time-window granularity)
//! - Client roles and identity
//! - Sync configuration

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Unique capsule identifier, stable across sessions
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CapsuleId(pub String);

impl CapsuleId {
    /// Wrap an existing identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CapsuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CapsuleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One timestamped snapshot of a subsystem's status, the unit of replay.
///
/// Immutable once created; the store only appends and replaces whole lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayCapsule {
    /// Stable unique identifier
    pub id: CapsuleId,
    /// Point in time the capsule represents
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Subsystem/domain the capsule describes
    pub engine: String,
    /// Reported status (open set, unknown values tolerated)
    pub status: CapsuleStatus,
    /// Optional human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Optional open key-value bag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Capsule status reported by an engine.
///
/// This is an open set: unrecognized values are carried verbatim and
/// presented as `unknown`, never rejected at the deserialization boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CapsuleStatus {
    /// Engine operating normally
    Operational,
    /// Engine degraded but serving
    Degraded,
    /// Engine failed
    Failed,
    /// Anything else the wire carried
    Other(String),
}

impl CapsuleStatus {
    /// Display label; unrecognized statuses render as `unknown`
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            CapsuleStatus::Operational => "operational",
            CapsuleStatus::Degraded => "degraded",
            CapsuleStatus::Failed => "failed",
            CapsuleStatus::Other(_) => "unknown",
        }
    }
}

impl From<String> for CapsuleStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "operational" => CapsuleStatus::Operational,
            "degraded" => CapsuleStatus::Degraded,
            "failed" => CapsuleStatus::Failed,
            _ => CapsuleStatus::Other(value),
        }
    }
}

impl From<CapsuleStatus> for String {
    fn from(value: CapsuleStatus) -> Self {
        match value {
            CapsuleStatus::Other(raw) => raw,
            known => known.label().to_string(),
        }
    }
}

impl std::fmt::Display for CapsuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Time-window granularity for which capsules are loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    /// One day of capsules
    #[default]
    Daily,
    /// One season
    Seasonal,
    /// One epoch
    Epochal,
    /// One millennium
    Millennial,
}

impl ReplayMode {
    /// Query-parameter value for the capsule API
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayMode::Daily => "daily",
            ReplayMode::Seasonal => "seasonal",
            ReplayMode::Epochal => "epochal",
            ReplayMode::Millennial => "millennial",
        }
    }

    /// All modes, in ascending window size
    #[inline]
    #[must_use]
    pub fn all() -> [ReplayMode; 4] {
        [
            ReplayMode::Daily,
            ReplayMode::Seasonal,
            ReplayMode::Epochal,
            ReplayMode::Millennial,
        ]
    }
}

impl FromStr for ReplayMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(ReplayMode::Daily),
            "seasonal" => Ok(ReplayMode::Seasonal),
            "epochal" => Ok(ReplayMode::Epochal),
            "millennial" => Ok(ReplayMode::Millennial),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unrecognized replay mode string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown replay mode: {0}")]
pub struct UnknownMode(pub String);

/// Session role of a connected client.
///
/// Assigned once at construction; only the sovereign drives shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The single authoritative presenter
    Sovereign,
    /// Passive audience
    Council,
    /// Passive audience
    Heir,
    /// Passive audience
    Observer,
}

impl Role {
    /// Whether this role may publish shared playback state
    #[inline]
    #[must_use]
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Role::Sovereign)
    }

    /// Role name as sent on the wire
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sovereign => "sovereign",
            Role::Council => "council",
            Role::Heir => "heir",
            Role::Observer => "observer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity a client registers with the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Display name
    pub user: String,
    /// Session role
    pub role: Role,
    /// Unique per-session client id
    pub client_id: Uuid,
}

impl ClientIdentity {
    /// Create a fresh identity
    #[inline]
    #[must_use]
    pub fn new(user: impl Into<String>, role: Role) -> Self {
        Self {
            user: user.into(),
            role,
            client_id: Uuid::new_v4(),
        }
    }
}

/// Sync layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay between reconnect attempts (fixed, no backoff)
    pub reconnect_delay: Duration,
    /// Playback tick cadence while playing
    pub tick_interval: Duration,
    /// Index step for fast_forward / rewind
    pub seek_step: usize,
    /// Whether subordinates request a state snapshot after each connect
    pub snapshot_on_connect: bool,
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With reconnect delay
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// With tick interval
    #[inline]
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// With seek step
    #[inline]
    #[must_use]
    pub fn with_seek_step(mut self, step: usize) -> Self {
        self.seek_step = step;
        self
    }

    /// With snapshot-on-connect behavior
    #[inline]
    #[must_use]
    pub fn with_snapshot_on_connect(mut self, enabled: bool) -> Self {
        self.snapshot_on_connect = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
            tick_interval: Duration::from_millis(1500),
            seek_step: 5,
            snapshot_on_connect: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_open_set_round_trip() {
        let known: CapsuleStatus = serde_json::from_str("\"degraded\"").unwrap();
        assert_eq!(known, CapsuleStatus::Degraded);

        let odd: CapsuleStatus = serde_json::from_str("\"ETERNALLY_SOVEREIGN\"").unwrap();
        assert_eq!(odd, CapsuleStatus::Other("ETERNALLY_SOVEREIGN".to_string()));
        assert_eq!(odd.label(), "unknown");

        // Unrecognized values survive re-serialization verbatim
        assert_eq!(
            serde_json::to_string(&odd).unwrap(),
            "\"ETERNALLY_SOVEREIGN\""
        );
    }

    #[test]
    fn mode_parse_and_display() {
        for mode in ReplayMode::all() {
            assert_eq!(mode.as_str().parse::<ReplayMode>().unwrap(), mode);
        }
        assert!("weekly".parse::<ReplayMode>().is_err());
    }

    #[test]
    fn only_sovereign_is_authoritative() {
        assert!(Role::Sovereign.is_authoritative());
        assert!(!Role::Council.is_authoritative());
        assert!(!Role::Heir.is_authoritative());
        assert!(!Role::Observer.is_authoritative());
    }

    #[test]
    fn sync_config_builder() {
        let cfg = SyncConfig::new()
            .with_seek_step(10)
            .with_snapshot_on_connect(false);
        assert_eq!(cfg.seek_step, 10);
        assert!(!cfg.snapshot_on_connect);
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(3));
        assert_eq!(cfg.tick_interval, Duration::from_millis(1500));
    }

    #[test]
    fn capsule_serde_optional_fields() {
        let json = r#"{
            "id": "cap-001",
            "timestamp": "2025-12-15T00:00:00Z",
            "engine": "treasury",
            "status": "operational"
        }"#;
        let capsule: ReplayCapsule = serde_json::from_str(json).unwrap();
        assert_eq!(capsule.id, CapsuleId::from("cap-001"));
        assert!(capsule.event.is_none());
        assert!(capsule.metadata.is_none());
    }
}
