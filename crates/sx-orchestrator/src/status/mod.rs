//! Status aggregation
//!
//! Folds supervisor state, the subscription and traffic counters into an
//! immutable [`StatusSnapshot`]. A new snapshot is built on every tick and on
//! every supervisor or subscription change. Readers get the latest one from a
//! `watch` channel and never wait on the supervisor lock.

mod traffic;

pub use traffic::{ClashApiTraffic, NoTraffic, TrafficCounters, TrafficSource};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use sx_core::time::current_time_millis;
use sx_core::types::StatusSnapshot;

use crate::subscription::SubscriptionManager;
use crate::supervisor::Supervisor;

/// Builds status snapshots and publishes the latest one
///
/// Rebuilds are serialized: each one reads the engine state, samples traffic
/// and publishes while holding `rebuild`, so a slow traffic sample can never
/// publish state older than a snapshot that is already out.
pub struct StatusAggregator {
    supervisor: Arc<Supervisor>,
    subscription: Arc<SubscriptionManager>,
    traffic: Arc<dyn TrafficSource>,
    counters: Mutex<TrafficCounters>,
    rebuild: tokio::sync::Mutex<()>,
    latest: watch::Sender<Arc<StatusSnapshot>>,
    tick: Duration,
}

impl StatusAggregator {
    /// Create an aggregator publishing an empty snapshot until the first
    /// rebuild. `tick` is the period used by [`StatusAggregator::run`].
    pub fn new(
        supervisor: Arc<Supervisor>,
        subscription: Arc<SubscriptionManager>,
        traffic: Arc<dyn TrafficSource>,
        tick: Duration,
    ) -> Self {
        let (latest, _) = watch::channel(Arc::new(StatusSnapshot::default()));
        Self {
            supervisor,
            subscription,
            traffic,
            counters: Mutex::new(TrafficCounters::default()),
            rebuild: tokio::sync::Mutex::new(()),
            latest,
            tick,
        }
    }

    /// The most recent snapshot
    pub fn current(&self) -> Arc<StatusSnapshot> {
        Arc::clone(&self.latest.borrow())
    }

    /// Receiver notified on every new snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<StatusSnapshot>> {
        self.latest.subscribe()
    }

    /// Period of the status tick
    pub fn tick_interval(&self) -> Duration {
        self.tick
    }

    /// Build and publish a new snapshot.
    ///
    /// `last_update` strictly increases from one snapshot to the next, even
    /// when two are built within the same millisecond.
    pub async fn recompute(&self) -> Arc<StatusSnapshot> {
        let _rebuild = self.rebuild.lock().await;

        let engine = self.supervisor.status();
        let sample = if engine.is_running() {
            self.traffic.sample().await
        } else {
            None
        };
        let stats = self
            .counters
            .lock()
            .observe(engine.run_id, engine.is_running(), sample);
        let subscription = self.subscription.current();

        let mut snapshot = StatusSnapshot {
            running: engine.is_running(),
            state: engine.state,
            pid: engine.pid,
            uptime: engine.uptime().as_secs(),
            stats,
            user: subscription.user.clone(),
            selected_node: subscription.selected().map(|n| n.id),
            last_exit: engine.last_exit.clone(),
            last_update: 0,
        };

        let mut published = None;
        self.latest.send_modify(|current| {
            snapshot.last_update = current_time_millis().max(current.last_update + 1);
            let next = Arc::new(snapshot);
            published = Some(Arc::clone(&next));
            *current = next;
        });
        published.unwrap_or_else(|| self.current())
    }

    /// Rebuild the snapshot on every tick and state change until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut engine = self.supervisor.subscribe();
        let mut nodes = self.subscription.subscribe();
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!("Status aggregator started (tick {:?})", self.tick);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = engine.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = engine.borrow_and_update().state;
                    tracing::debug!("Engine state changed to {}", state);
                }
                changed = nodes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    nodes.borrow_and_update();
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Status aggregator shutting down");
                    break;
                }
            }

            self.recompute().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sx_core::config::{EngineConfig, SubscriptionConfig};
    use sx_core::types::TrafficStats;

    use crate::supervisor::SupervisorSettings;

    fn aggregator() -> StatusAggregator {
        let supervisor = Arc::new(Supervisor::new(SupervisorSettings::from(
            &EngineConfig::default(),
        )));
        aggregator_with(supervisor, Arc::new(NoTraffic))
    }

    fn aggregator_with(
        supervisor: Arc<Supervisor>,
        traffic: Arc<dyn TrafficSource>,
    ) -> StatusAggregator {
        let subscription = Arc::new(
            SubscriptionManager::new(&SubscriptionConfig {
                cache_path: None,
                ..SubscriptionConfig::default()
            })
            .unwrap(),
        );
        StatusAggregator::new(supervisor, subscription, traffic, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_last_update_strictly_increases() {
        let aggregator = aggregator();
        let first = aggregator.recompute().await;
        let second = aggregator.recompute().await;
        let third = aggregator.recompute().await;

        assert!(second.last_update > first.last_update);
        assert!(third.last_update > second.last_update);
        assert_eq!(aggregator.current(), third);
    }

    #[tokio::test]
    async fn test_stopped_engine_snapshot() {
        let aggregator = aggregator();
        let snapshot = aggregator.recompute().await;

        assert!(!snapshot.running);
        assert_eq!(snapshot.uptime, 0);
        assert_eq!(snapshot.pid, None);
        assert_eq!(snapshot.stats, Default::default());
        assert!(snapshot.user.is_none());
    }

    #[tokio::test]
    async fn test_run_publishes_on_tick() {
        let aggregator = Arc::new(aggregator());
        let mut rx = aggregator.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&aggregator).run(cancel.clone()));

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(rx.borrow().last_update > 0);

        cancel.cancel();
        task.await.unwrap();
    }

    /// Traffic source whose first sample blocks until released. The first
    /// sample reports 100 bytes each way, later ones 10.
    #[cfg(unix)]
    struct HeldTraffic {
        calls: std::sync::atomic::AtomicUsize,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[cfg(unix)]
    #[async_trait::async_trait]
    impl TrafficSource for HeldTraffic {
        async fn sample(&self) -> Option<TrafficStats> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                self.entered.notify_one();
                self.release.notified().await;
                return Some(TrafficStats { upload: 100, download: 100 });
            }
            Some(TrafficStats { upload: 10, download: 10 })
        }
    }

    /// A rebuild stuck on a slow sample across a restart must not publish the
    /// old run over the new one, nor count the old run twice.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_sample_across_restart() {
        let supervisor = Arc::new(Supervisor::new(SupervisorSettings {
            binary: Some(std::path::PathBuf::from("/bin/sh")),
            args: vec!["-c".to_string(), "exec sleep 30".to_string()],
            working_dir: None,
            startup_grace: Duration::from_millis(50),
            stop_grace: Duration::from_secs(2),
            log_capacity: 10,
        }));
        let traffic = Arc::new(HeldTraffic {
            calls: Default::default(),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let aggregator = Arc::new(aggregator_with(
            Arc::clone(&supervisor),
            Arc::clone(&traffic) as Arc<dyn TrafficSource>,
        ));

        let first_pid = supervisor.start(serde_json::json!({})).await.unwrap().pid;
        let slow = tokio::spawn({
            let aggregator = Arc::clone(&aggregator);
            async move { aggregator.recompute().await }
        });
        traffic.entered.notified().await;

        let second_pid = supervisor.restart(None).await.unwrap().pid;
        assert_ne!(first_pid, second_pid);
        let fresh = tokio::spawn({
            let aggregator = Arc::clone(&aggregator);
            async move { aggregator.recompute().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        traffic.release.notify_one();

        let slow = slow.await.unwrap();
        let fresh = fresh.await.unwrap();
        assert_eq!(slow.pid, first_pid);
        assert_eq!(fresh.pid, second_pid);
        assert!(fresh.last_update > slow.last_update);
        assert_eq!(aggregator.current().pid, second_pid);

        let next = aggregator.recompute().await;
        assert_eq!(next.pid, second_pid);
        assert_eq!(next.stats, TrafficStats { upload: 110, download: 110 });

        supervisor.stop().await.unwrap();
    }
}
