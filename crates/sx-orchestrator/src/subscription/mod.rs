//! Subscription manager
//!
//! Owns the authoritative node set and account info. The whole
//! [`SubscriptionState`] lives behind a `watch` channel as an `Arc` and is only
//! ever replaced wholesale, so readers see either the previous or the next
//! subscription and never a mix.
//!
//! # Refresh coalescing
//!
//! At most one fetch is in flight. A refresh for the same source arriving
//! while one runs attaches to it and receives the same result. A refresh for a
//! different source waits for the running one to settle, then starts its own.
//! The fetch runs in its own task, so it completes and clears the in-flight
//! slot even if every caller goes away.

pub mod auto_update;
mod cache;
mod panel;
mod source;

pub use cache::SubscriptionCache;
pub use panel::{FetchedSubscription, PanelClient};
pub use source::{SubscriptionSource, SUBSCRIBE_PATH, USER_INFO_PATH};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use sx_core::config::{RetryPolicy, SubscriptionConfig};
use sx_core::time::current_time_millis;
use sx_core::types::{Node, NodeId, UserInfo};
use sx_core::SubscriptionError;

/// The committed subscription
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionState {
    /// Source of the last successful fetch
    pub source: Option<SubscriptionSource>,
    /// Unix millis of the last successful fetch
    pub fetched_at: Option<u64>,
    /// Nodes in panel order
    pub nodes: Vec<Node>,
    /// Account info from the same fetch as `nodes`
    pub user: Option<UserInfo>,
}

impl SubscriptionState {
    /// The selected node, if any
    pub fn selected(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.selected)
    }

    /// Look up a node by id
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

type RefreshResult = Result<Arc<SubscriptionState>, SubscriptionError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

struct InFlight {
    id: u64,
    source: SubscriptionSource,
    future: SharedRefresh,
}

enum Attach {
    Join(SharedRefresh),
    WaitFor(SharedRefresh),
}

/// Keeps the node list and account info in sync with the panel
pub struct SubscriptionManager {
    client: PanelClient,
    retry: RetryPolicy,
    /// Source from configuration, used until a refresh stores another
    configured: Option<SubscriptionSource>,
    state: watch::Sender<Arc<SubscriptionState>>,
    in_flight: Mutex<Option<InFlight>>,
    fetch_ids: AtomicU64,
    cache: Option<SubscriptionCache>,
}

impl SubscriptionManager {
    /// Create a manager with an empty subscription
    pub fn new(config: &SubscriptionConfig) -> Result<Self, SubscriptionError> {
        let configured = match config.url.as_deref() {
            Some(url) => match SubscriptionSource::parse(url, config.token.as_deref()) {
                Ok(source) => Some(source),
                Err(e) => {
                    tracing::warn!("Ignoring configured subscription: {}", e);
                    None
                }
            },
            None => None,
        };

        let (state, _) = watch::channel(Arc::new(SubscriptionState::default()));

        Ok(Self {
            client: PanelClient::new(config)?,
            retry: config.retry.clone(),
            configured,
            state,
            in_flight: Mutex::new(None),
            fetch_ids: AtomicU64::new(0),
            cache: config.cache_path.clone().map(SubscriptionCache::new),
        })
    }

    /// Load the cached subscription, if any, as the current state.
    ///
    /// Does nothing once a refresh has committed.
    pub async fn restore_from_cache(&self) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let Some(cached) = cache.load().await else {
            return false;
        };

        let restored = self.state.send_if_modified(|current| {
            if current.fetched_at.is_some() {
                return false;
            }
            *current = Arc::new(cached);
            true
        });
        if restored {
            tracing::info!(
                "Restored {} nodes from {}",
                self.current().nodes.len(),
                cache.path().display()
            );
        }
        restored
    }

    /// The current subscription
    pub fn current(&self) -> Arc<SubscriptionState> {
        Arc::clone(&self.state.borrow())
    }

    /// Subscribe to subscription changes
    pub fn subscribe(&self) -> watch::Receiver<Arc<SubscriptionState>> {
        self.state.subscribe()
    }

    /// Copy of one node
    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.state.borrow().node(id).cloned()
    }

    /// Source used by `refresh_stored`
    pub fn stored_source(&self) -> Option<SubscriptionSource> {
        self.state
            .borrow()
            .source
            .clone()
            .or_else(|| self.configured.clone())
    }

    /// Whether a fetch is currently running
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Re-fetch from the stored source
    pub async fn refresh_stored(self: &Arc<Self>) -> RefreshResult {
        let source = self
            .stored_source()
            .ok_or(SubscriptionError::NotConfigured)?;
        self.refresh(source).await
    }

    /// Fetch from `source` and commit the result.
    ///
    /// On failure the current subscription is left untouched and the error is
    /// returned as is.
    pub async fn refresh(self: &Arc<Self>, source: SubscriptionSource) -> RefreshResult {
        loop {
            let attach = {
                let mut slot = self.in_flight.lock();
                let running = slot
                    .as_ref()
                    .map(|r| (r.source == source, r.future.clone()));
                match running {
                    Some((true, future)) => Attach::Join(future),
                    Some((false, future)) => Attach::WaitFor(future),
                    None => Attach::Join(self.spawn_fetch(&mut *slot, source.clone())),
                }
            };

            match attach {
                Attach::Join(future) => return future.await,
                Attach::WaitFor(future) => {
                    tracing::debug!("Waiting for in-flight refresh of another source");
                    let _ = future.await;
                }
            }
        }
    }

    fn spawn_fetch(
        self: &Arc<Self>,
        slot: &mut Option<InFlight>,
        source: SubscriptionSource,
    ) -> SharedRefresh {
        let id = self.fetch_ids.fetch_add(1, Ordering::Relaxed);
        let this = Arc::clone(self);
        let task_source = source.clone();

        let task = tokio::spawn(async move {
            let result = this.fetch_and_commit(&task_source).await;
            this.finish(id);
            result
        });

        let future: SharedRefresh = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(SubscriptionError::Network(format!("refresh task failed: {}", e))),
            }
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            id,
            source,
            future: future.clone(),
        });
        future
    }

    fn finish(&self, id: u64) {
        let mut slot = self.in_flight.lock();
        if slot.as_ref().map(|f| f.id) == Some(id) {
            *slot = None;
        }
    }

    async fn fetch_and_commit(&self, source: &SubscriptionSource) -> RefreshResult {
        tracing::info!("Refreshing subscription from {}", source);

        let fetched = match self.fetch_with_retry(source).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!("Subscription refresh from {} failed: {}", source, e);
                return Err(e);
            }
        };

        let mut committed = None;
        self.state.send_modify(|current| {
            let next = Arc::new(merge(current, source, fetched));
            committed = Some(Arc::clone(&next));
            *current = next;
        });
        let committed = committed.unwrap_or_else(|| self.current());

        tracing::info!(
            "Subscription updated: {} nodes, account {}",
            committed.nodes.len(),
            committed.user.as_ref().map_or("-", |u| u.email.as_str())
        );
        self.persist(&committed).await;
        Ok(committed)
    }

    async fn fetch_with_retry(
        &self,
        source: &SubscriptionSource,
    ) -> Result<FetchedSubscription, SubscriptionError> {
        let mut attempt = 0;
        loop {
            match self.client.fetch(source).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) if e.is_transient() && attempt < self.retry.attempts => {
                    attempt += 1;
                    tracing::warn!(
                        "Subscription fetch failed ({}), retry {}/{} in {:?}",
                        e,
                        attempt,
                        self.retry.attempts,
                        self.retry.delay
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Mark `id` as the selected node and clear every other node.
    pub async fn select_node(&self, id: NodeId) -> RefreshResult {
        let mut selected = None;
        self.state.send_if_modified(|current| {
            if current.node(id).is_none() {
                return false;
            }
            let mut next = (**current).clone();
            for node in &mut next.nodes {
                node.selected = node.id == id;
            }
            let next = Arc::new(next);
            selected = Some(Arc::clone(&next));
            *current = next;
            true
        });

        let state = selected.ok_or(SubscriptionError::NodeNotFound(id))?;
        tracing::info!("Selected node {} ({})", id, state.node(id).map_or("", |n| n.name.as_str()));
        self.persist(&state).await;
        Ok(state)
    }

    /// Record a probe result on a node. Returns `false` if the node is gone.
    pub fn record_latency(&self, id: NodeId, latency_ms: Option<u64>) -> bool {
        self.state.send_if_modified(|current| {
            match current.node(id) {
                Some(node) if node.latency_ms != latency_ms => {}
                _ => return false,
            }
            let mut next = (**current).clone();
            if let Some(node) = next.nodes.iter_mut().find(|n| n.id == id) {
                node.latency_ms = latency_ms;
            }
            *current = Arc::new(next);
            true
        }) || self.state.borrow().node(id).is_some()
    }

    async fn persist(&self, state: &SubscriptionState) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(state).await {
                tracing::warn!("Failed to write subscription cache {}: {}", cache.path().display(), e);
            }
        }
    }
}

/// Build the next state from a fetch, carrying selection and latency over for
/// nodes that survive a refresh of the same panel.
fn merge(
    current: &SubscriptionState,
    source: &SubscriptionSource,
    fetched: FetchedSubscription,
) -> SubscriptionState {
    let same_panel = current
        .source
        .as_ref()
        .map_or(false, |s| s.base_url == source.base_url);

    let mut nodes = fetched.nodes;
    if same_panel {
        for node in &mut nodes {
            if let Some(previous) = current.node(node.id) {
                node.selected = previous.selected;
                node.latency_ms = previous.latency_ms;
            }
        }
    }

    SubscriptionState {
        source: Some(source.clone()),
        fetched_at: Some(current_time_millis()),
        nodes,
        user: Some(fetched.user),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sx_core::types::NodeParams;

    fn node(id: u64) -> Node {
        Node {
            id: NodeId(id),
            name: format!("node-{}", id),
            host: format!("n{}.example.com", id),
            port: 443,
            protocol: "trojan".into(),
            params: NodeParams::default(),
            latency_ms: None,
            selected: false,
        }
    }

    fn source(base: &str) -> SubscriptionSource {
        SubscriptionSource {
            base_url: base.into(),
            token: "t".into(),
        }
    }

    fn manager_with(nodes: Vec<Node>) -> SubscriptionManager {
        let config = SubscriptionConfig {
            cache_path: None,
            ..SubscriptionConfig::default()
        };
        let manager = SubscriptionManager::new(&config).unwrap();
        manager.state.send_replace(Arc::new(SubscriptionState {
            source: Some(source("https://a.example.com")),
            fetched_at: Some(1),
            nodes,
            user: None,
        }));
        manager
    }

    fn selected_ids(state: &SubscriptionState) -> Vec<NodeId> {
        state.nodes.iter().filter(|n| n.selected).map(|n| n.id).collect()
    }

    #[tokio::test]
    async fn test_select_moves_selection() {
        let manager = manager_with(vec![node(1), node(2), node(3)]);

        manager.select_node(NodeId(1)).await.unwrap();
        let state = manager.select_node(NodeId(2)).await.unwrap();

        assert_eq!(selected_ids(&state), vec![NodeId(2)]);
        assert_eq!(manager.current().selected().map(|n| n.id), Some(NodeId(2)));
    }

    #[tokio::test]
    async fn test_select_unknown_node() {
        let manager = manager_with(vec![node(1)]);
        manager.select_node(NodeId(1)).await.unwrap();
        let before = manager.current();

        let err = manager.select_node(NodeId(42)).await.unwrap_err();
        assert_eq!(err, SubscriptionError::NodeNotFound(NodeId(42)));
        assert_eq!(*manager.current(), *before);
    }

    #[tokio::test]
    async fn test_refresh_without_source() {
        let config = SubscriptionConfig {
            cache_path: None,
            ..SubscriptionConfig::default()
        };
        let manager = Arc::new(SubscriptionManager::new(&config).unwrap());
        let err = manager.refresh_stored().await.unwrap_err();
        assert_eq!(err, SubscriptionError::NotConfigured);
    }

    #[test]
    fn test_configured_source_is_stored_source() {
        let config = SubscriptionConfig {
            url: Some("https://panel.example.com/sub/abc".into()),
            cache_path: None,
            ..SubscriptionConfig::default()
        };
        let manager = SubscriptionManager::new(&config).unwrap();
        assert_eq!(
            manager.stored_source().map(|s| s.base_url),
            Some("https://panel.example.com".to_string())
        );
    }

    #[test]
    fn test_record_latency_leaves_selection() {
        let manager = manager_with(vec![node(1), node(2)]);
        manager.state.send_modify(|s| {
            let mut next = (**s).clone();
            next.nodes[0].selected = true;
            *s = Arc::new(next);
        });

        assert!(manager.record_latency(NodeId(2), Some(120)));
        assert!(!manager.record_latency(NodeId(9), Some(1)));

        let state = manager.current();
        assert_eq!(state.node(NodeId(2)).unwrap().latency_ms, Some(120));
        assert_eq!(selected_ids(&state), vec![NodeId(1)]);
    }

    #[test]
    fn test_merge_carries_over_same_panel() {
        let mut previous = node(1);
        previous.selected = true;
        previous.latency_ms = Some(50);
        let current = SubscriptionState {
            source: Some(source("https://a.example.com")),
            fetched_at: Some(1),
            nodes: vec![previous, node(2)],
            user: None,
        };
        let fetched = FetchedSubscription {
            nodes: vec![node(1), node(3)],
            user: UserInfo::default(),
        };

        let next = merge(&current, &source("https://a.example.com"), fetched.clone());
        assert_eq!(selected_ids(&next), vec![NodeId(1)]);
        assert_eq!(next.node(NodeId(1)).unwrap().latency_ms, Some(50));
        assert!(next.node(NodeId(2)).is_none());

        let other = merge(&current, &source("https://b.example.com"), fetched);
        assert!(selected_ids(&other).is_empty());
    }
}
