//! Orchestrator facade
//!
//! The single entry point used by the HTTP layer. Owns the supervisor,
//! subscription manager, prober, status aggregator and push hub for the
//! lifetime of the service.
//!
//! Engine operations (start, stop, restart and applying a new node set) run
//! under one facade lock, taken before the supervisor's own lock, so deciding
//! which config to run and running it can't interleave with another engine
//! operation.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sx_core::api::{EngineInfo, LogLine, NodeView, ProbeReport, SubscriptionView};
use sx_core::config::OrchestratorConfig;
use sx_core::types::{NodeId, StatusSnapshot};
use sx_core::{OrchestratorError, ProbeError, ProcessError, SubscriptionError};

use crate::engine_config::{build_engine_config, EngineConfigOptions};
use crate::prober::NodeProber;
use crate::push::PushHub;
use crate::status::{ClashApiTraffic, NoTraffic, StatusAggregator, TrafficSource};
use crate::subscription::{
    auto_update::run_auto_update, SubscriptionManager, SubscriptionSource, SubscriptionState,
};
use crate::supervisor::{StopOutcome, Supervisor, SupervisorSettings};

/// Where the running engine's config came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigOrigin {
    /// Never started
    None,
    /// Built from the subscription; rebuilt when nodes or selection change
    Generated,
    /// Supplied by the caller; left alone on subscription changes
    Supplied,
}

/// Global state for the orchestrator daemon
pub struct OrchestratorState {
    /// Configuration
    pub config: OrchestratorConfig,
    /// Engine process supervisor
    pub supervisor: Arc<Supervisor>,
    /// Subscription manager
    pub subscription: Arc<SubscriptionManager>,
    /// Node prober
    pub prober: Arc<NodeProber>,
    /// Status aggregator
    pub aggregator: Arc<StatusAggregator>,
    /// Push channel
    pub push: Arc<PushHub>,
    engine_options: EngineConfigOptions,
    origin: Mutex<ConfigOrigin>,
}

impl OrchestratorState {
    /// Create the orchestrator with nothing running
    pub fn new(config: OrchestratorConfig) -> Result<Self, OrchestratorError> {
        let supervisor = Arc::new(Supervisor::new(SupervisorSettings::from(&config.engine)));
        let subscription = Arc::new(SubscriptionManager::new(&config.subscription)?);
        let prober = Arc::new(NodeProber::new(Arc::clone(&subscription), &config.probe));

        let traffic: Arc<dyn TrafficSource> = match config.engine.clash_api.as_deref() {
            Some(address) => match ClashApiTraffic::new(address) {
                Ok(source) => Arc::new(source),
                Err(e) => {
                    tracing::warn!("Traffic counters disabled: {}", e);
                    Arc::new(NoTraffic)
                }
            },
            None => Arc::new(NoTraffic),
        };

        let aggregator = Arc::new(StatusAggregator::new(
            Arc::clone(&supervisor),
            Arc::clone(&subscription),
            traffic,
            config.status.tick_interval,
        ));
        let push = Arc::new(PushHub::new(aggregator.subscribe(), config.push.client_buffer));

        Ok(Self {
            engine_options: EngineConfigOptions::from(&config.engine),
            config,
            supervisor,
            subscription,
            prober,
            aggregator,
            push,
            origin: Mutex::new(ConfigOrigin::None),
        })
    }

    /// Load the cached subscription and publish a first snapshot
    pub async fn restore(&self) {
        self.subscription.restore_from_cache().await;
        self.aggregator.recompute().await;
    }

    /// Spawn the aggregator, push hub and auto update tasks
    pub fn spawn_background(self: &Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut tasks = vec![
            tokio::spawn(Arc::clone(&self.aggregator).run(cancel.clone())),
            tokio::spawn(Arc::clone(&self.push).run(cancel.clone())),
        ];

        if self.config.subscription.auto_update {
            tasks.push(tokio::spawn(run_auto_update(
                Arc::clone(self),
                self.config.subscription.update_interval,
                cancel,
            )));
        }

        tasks
    }

    /// Latest status snapshot
    pub fn status(&self) -> Arc<StatusSnapshot> {
        self.aggregator.current()
    }

    /// Current subscription as presented to clients
    pub fn subscription_view(&self) -> SubscriptionView {
        view(&self.subscription.current())
    }

    /// Current nodes as presented to clients
    pub fn nodes(&self) -> Vec<NodeView> {
        self.subscription.current().nodes.iter().map(NodeView::from).collect()
    }

    /// Switch to a new subscription URL and fetch it
    pub async fn subscribe(
        &self,
        url: &str,
        token: Option<&str>,
    ) -> Result<SubscriptionView, SubscriptionError> {
        let source = SubscriptionSource::parse(url, token)?;
        let state = self.subscription.refresh(source).await?;
        self.apply_if_generated().await;
        Ok(view(&state))
    }

    /// Re-fetch the stored subscription
    pub async fn refresh(&self) -> Result<SubscriptionView, SubscriptionError> {
        let state = self.subscription.refresh_stored().await?;
        self.apply_if_generated().await;
        Ok(view(&state))
    }

    /// Select the node the engine routes through
    pub async fn select_node(&self, id: NodeId) -> Result<SubscriptionView, SubscriptionError> {
        let state = self.subscription.select_node(id).await?;
        self.apply_if_generated().await;
        Ok(view(&state))
    }

    /// Probe one node
    pub async fn probe(&self, id: NodeId) -> Result<ProbeReport, ProbeError> {
        self.prober.probe(id).await
    }

    /// Probe every node
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        self.prober.probe_all().await
    }

    /// Start the engine with `config`, or with one generated from the subscription
    pub async fn start_engine(&self, config: Option<Value>) -> Result<EngineInfo, ProcessError> {
        let mut origin = self.origin.lock().await;
        let (config, next_origin) = match config {
            Some(config) => (config, ConfigOrigin::Supplied),
            None => (self.generate_config()?, ConfigOrigin::Generated),
        };

        let info = self.supervisor.start(config).await?;
        *origin = next_origin;
        drop(origin);

        self.aggregator.recompute().await;
        Ok(info)
    }

    /// Stop the engine; a no-op when it isn't running
    pub async fn stop_engine(&self) -> Result<StopOutcome, ProcessError> {
        let _origin = self.origin.lock().await;
        let outcome = self.supervisor.stop().await?;
        self.aggregator.recompute().await;
        Ok(outcome)
    }

    /// Restart the engine.
    ///
    /// Without a config, a generated config is rebuilt from the current nodes
    /// and a supplied one is reused as is.
    pub async fn restart_engine(&self, config: Option<Value>) -> Result<EngineInfo, ProcessError> {
        let mut origin = self.origin.lock().await;
        let (config, next_origin) = match (config, *origin) {
            (Some(config), _) => (Some(config), ConfigOrigin::Supplied),
            (None, ConfigOrigin::Supplied) => (None, ConfigOrigin::Supplied),
            (None, ConfigOrigin::None | ConfigOrigin::Generated) => {
                (Some(self.generate_config()?), ConfigOrigin::Generated)
            }
        };

        let info = self.supervisor.restart(config).await?;
        *origin = next_origin;
        drop(origin);

        self.aggregator.recompute().await;
        Ok(info)
    }

    /// Captured engine output, oldest first
    pub fn engine_logs(&self, tail: Option<usize>) -> Vec<LogLine> {
        match tail {
            Some(n) => self.supervisor.logs().tail(n),
            None => self.supervisor.logs().snapshot(),
        }
    }

    /// Stop the engine and drop every push client
    pub async fn shutdown(&self) {
        if let Err(e) = self.stop_engine().await {
            tracing::error!("Failed to stop engine during shutdown: {}", e);
        }
        self.push.disconnect_all();
    }

    fn generate_config(&self) -> Result<Value, ProcessError> {
        build_engine_config(&self.subscription.current().nodes, &self.engine_options)
    }

    /// Restart a running engine whose config was generated, so it picks up
    /// the current nodes and selection. Failures are logged, not returned:
    /// the subscription change itself already succeeded.
    async fn apply_if_generated(&self) {
        let mut origin = self.origin.lock().await;
        if *origin != ConfigOrigin::Generated || !self.supervisor.status().is_running() {
            return;
        }

        let config = match self.generate_config() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Keeping current engine config: {}", e);
                return;
            }
        };

        tracing::info!("Applying updated nodes to the running engine");
        match self.supervisor.restart(Some(config)).await {
            Ok(_) => *origin = ConfigOrigin::Generated,
            Err(e) => tracing::error!("Failed to restart engine with updated nodes: {}", e),
        }
    }
}

fn view(state: &SubscriptionState) -> SubscriptionView {
    SubscriptionView {
        source: state.source.as_ref().map(|s| s.base_url.clone()),
        last_update: state.fetched_at,
        nodes: state.nodes.iter().map(NodeView::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> OrchestratorState {
        let mut config = OrchestratorConfig::default();
        config.subscription.cache_path = None;
        config.engine.clash_api = None;
        OrchestratorState::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_start_without_nodes_is_no_config() {
        let state = state();
        let err = state.start_engine(None).await.unwrap_err();
        assert!(matches!(err, ProcessError::NoConfig));
        assert!(!state.supervisor.status().is_running());
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let state = state();
        let outcome = state.stop_engine().await.unwrap();
        assert!(matches!(outcome, StopOutcome::NotRunning));
        assert!(!state.status().running);
    }

    #[tokio::test]
    async fn test_select_unknown_node() {
        let state = state();
        let err = state.select_node(NodeId(7)).await.unwrap_err();
        assert_eq!(err, SubscriptionError::NodeNotFound(NodeId(7)));
    }

    #[tokio::test]
    async fn test_subscribe_invalid_url() {
        let state = state();
        let err = state.subscribe("ftp://x/sub/t", None).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidUrl(_)));
        assert!(state.subscription_view().nodes.is_empty());
    }

    #[tokio::test]
    async fn test_probe_unknown_node() {
        let state = state();
        let err = state.probe(NodeId(1)).await.unwrap_err();
        assert_eq!(err, ProbeError::NodeNotFound(NodeId(1)));
    }
}
