//! On-disk cache of the last good subscription

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::SubscriptionState;

const CACHE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CachedSubscription {
    version: u32,
    saved_at: String,
    state: SubscriptionState,
}

/// JSON file holding the most recent committed subscription
#[derive(Debug, Clone)]
pub struct SubscriptionCache {
    path: PathBuf,
}

impl SubscriptionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `state`, replacing the previous file atomically.
    ///
    /// Creates parent directories if they don't exist.
    pub async fn save(&self, state: &SubscriptionState) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cached = CachedSubscription {
            version: CACHE_VERSION,
            saved_at: chrono::Utc::now().to_rfc3339(),
            state: state.clone(),
        };
        let json = serde_json::to_vec_pretty(&cached).map_err(io::Error::other)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }

    /// Load the cached subscription.
    ///
    /// Returns `None` if the file doesn't exist, is unreadable, corrupt, or
    /// from another cache version. Only missing files are silent.
    pub async fn load(&self) -> Option<SubscriptionState> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read subscription cache at {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<CachedSubscription>(&data) {
            Ok(cached) if cached.version == CACHE_VERSION => Some(cached.state),
            Ok(cached) => {
                tracing::warn!(
                    "Ignoring subscription cache at {} with version {}",
                    self.path.display(),
                    cached.version
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Corrupt subscription cache at {}, ignoring: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::SubscriptionSource;
    use sx_core::types::{Node, NodeId, NodeParams, UserInfo};

    fn sample_state() -> SubscriptionState {
        SubscriptionState {
            source: Some(SubscriptionSource {
                base_url: "https://panel.example.com".into(),
                token: "t".into(),
            }),
            fetched_at: Some(1_700_000_000_000),
            nodes: vec![Node {
                id: NodeId(3),
                name: "SG 03".into(),
                host: "sg.example.com".into(),
                port: 443,
                protocol: "vless".into(),
                params: NodeParams::default(),
                latency_ms: Some(88),
                selected: true,
            }],
            user: Some(UserInfo {
                email: "a@example.com".into(),
                active: true,
                ..UserInfo::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SubscriptionCache::new(dir.path().join("state").join("subscription.json"));

        let state = sample_state();
        cache.save(&state).await.unwrap();

        assert_eq!(cache.load().await, Some(state));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SubscriptionCache::new(dir.path().join("absent.json"));
        assert_eq!(cache.load().await, None);
    }

    #[tokio::test]
    async fn test_corrupt_file_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscription.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let cache = SubscriptionCache::new(path);
        assert_eq!(cache.load().await, None);
    }
}
