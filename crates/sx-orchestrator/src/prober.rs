//! Node reachability probes
//!
//! A probe is a plain TCP connect to the node endpoint, bounded by a timeout.
//! The result goes onto the node as its latency (`None` when unreachable).
//! Probes never change the selection and never touch the engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;

use sx_core::api::ProbeReport;
use sx_core::config::ProbeConfig;
use sx_core::types::{Node, NodeId};
use sx_core::ProbeError;

use crate::subscription::SubscriptionManager;

/// Runs probes with bounded concurrency
pub struct NodeProber {
    subscription: Arc<SubscriptionManager>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl NodeProber {
    pub fn new(subscription: Arc<SubscriptionManager>, config: &ProbeConfig) -> Self {
        Self {
            subscription,
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            timeout: config.timeout,
        }
    }

    /// Probe one node and record the result on it.
    ///
    /// An unreachable node is a successful probe with `reachable == false`;
    /// only an unknown id is an error.
    pub async fn probe(&self, id: NodeId) -> Result<ProbeReport, ProbeError> {
        let node = self
            .subscription
            .node(id)
            .ok_or(ProbeError::NodeNotFound(id))?;
        Ok(self.probe_node(&node).await)
    }

    /// Probe every node of the current subscription concurrently
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        let nodes = self.subscription.current().nodes.clone();
        join_all(nodes.iter().map(|node| self.probe_node(node))).await
    }

    async fn probe_node(&self, node: &Node) -> ProbeReport {
        let result = match self.permits.acquire().await {
            Ok(_permit) => connect(&node.address(), self.timeout).await,
            Err(_) => Err(ProbeError::Unreachable("prober closed".to_string())),
        };

        let latency = result.as_ref().ok().copied();
        if !self.subscription.record_latency(node.id, latency) {
            tracing::debug!("Node {} disappeared before its probe finished", node.id);
        }

        match result {
            Ok(ms) => {
                tracing::debug!("Probe {} ({}): {}ms", node.id, node.address(), ms);
                ProbeReport {
                    node_id: node.id,
                    reachable: true,
                    latency: Some(ms),
                    error: None,
                }
            }
            Err(e) => {
                tracing::debug!("Probe {} ({}) failed: {}", node.id, node.address(), e);
                ProbeReport {
                    node_id: node.id,
                    reachable: false,
                    latency: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Time a TCP connect to `address` in milliseconds
async fn connect(address: &str, timeout: Duration) -> Result<u64, ProbeError> {
    let started = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => Ok((started.elapsed().as_millis() as u64).max(1)),
        Ok(Err(e)) => Err(ProbeError::Unreachable(e.to_string())),
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let ms = connect(&addr.to_string(), Duration::from_secs(2)).await.unwrap();
        assert!(ms >= 1);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(&addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Unreachable(_)));
    }
}
