//! Capsule data source implementations
//!
//! The replay store only sees the [`CapsuleSource`] trait; these are the
//! two concrete sources: the HTTP capsule API and a fixed in-memory set
//! for tests and offline use.

use crate::error::LoadError;
use crate::store::CapsuleSource;
use crate::types::{ReplayCapsule, ReplayMode};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Capsule source backed by `GET {base_url}/api/replaycapsules?mode={mode}`.
///
/// A non-success status surfaces as [`LoadError::Status`]; nothing is
/// retried here.
#[derive(Debug, Clone)]
pub struct HttpCapsuleSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCapsuleSource {
    /// Create a source for the given base URL (no trailing slash)
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CapsuleSource for HttpCapsuleSource {
    async fn fetch(&self, mode: ReplayMode) -> Result<Vec<ReplayCapsule>, LoadError> {
        let url = format!("{}/api/replaycapsules", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("mode", mode.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%url, status = status.as_u16(), "capsule fetch rejected");
            return Err(LoadError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| LoadError::Parse(err.to_string()))
    }
}

/// Fixed capsule sets per mode, served from memory.
///
/// Used in tests and as the sovereign's local source when no capsule API
/// is running.
#[derive(Debug, Default)]
pub struct StaticCapsuleSource {
    sets: Mutex<HashMap<ReplayMode, Vec<ReplayCapsule>>>,
}

impl StaticCapsuleSource {
    /// Create an empty source
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the capsule list for a mode, replacing any previous list
    pub fn set(&self, mode: ReplayMode, capsules: Vec<ReplayCapsule>) {
        self.sets.lock().insert(mode, capsules);
    }
}

#[async_trait]
impl CapsuleSource for StaticCapsuleSource {
    async fn fetch(&self, mode: ReplayMode) -> Result<Vec<ReplayCapsule>, LoadError> {
        Ok(self.sets.lock().get(&mode).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CapsuleId, CapsuleStatus};

    #[tokio::test]
    async fn static_source_serves_per_mode() {
        let source = StaticCapsuleSource::new();
        source.set(
            ReplayMode::Daily,
            vec![ReplayCapsule {
                id: CapsuleId::from("d1"),
                timestamp: chrono::Utc::now(),
                engine: "archive".to_string(),
                status: CapsuleStatus::Operational,
                event: None,
                metadata: None,
            }],
        );

        assert_eq!(source.fetch(ReplayMode::Daily).await.unwrap().len(), 1);
        assert!(source.fetch(ReplayMode::Epochal).await.unwrap().is_empty());
    }
}
