//! Periodic subscription refresh
//!
//! Runs only when `subscription.auto_update` is enabled. Each tick goes
//! through the facade so that a changed node set is applied to a running
//! engine the same way a manual refresh is.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sx_core::SubscriptionError;

use crate::state::OrchestratorState;

/// Lower bound on the refresh period, whatever the config says.
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Run the auto refresh task until `cancel` fires.
pub async fn run_auto_update(
    state: Arc<OrchestratorState>,
    period: Duration,
    cancel: CancellationToken,
) {
    let period = effective_interval(period);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // The first tick completes immediately; startup already restored or fetched.
    interval.tick().await;

    tracing::info!("Starting subscription auto update (every {:?})", period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match state.refresh().await {
                    Ok(view) => tracing::debug!("Auto update fetched {} nodes", view.nodes.len()),
                    Err(SubscriptionError::NotConfigured) => {
                        tracing::debug!("Auto update skipped, no subscription configured");
                    }
                    Err(e) => tracing::warn!("Auto update failed, keeping current nodes: {}", e),
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Subscription auto update shutting down");
                break;
            }
        }
    }
}

fn effective_interval(configured: Duration) -> Duration {
    configured.max(MIN_UPDATE_INTERVAL)
}
