//! HTTP and WebSocket API
//!
//! Every HTTP response uses the `{success, data?, error?}` envelope. The
//! `/ws` endpoint streams status snapshots as JSON text frames.

mod routes;
mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::state::OrchestratorState;

/// Build the API router
pub fn router(state: Arc<OrchestratorState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/status", get(routes::status))
        .route("/subscription", get(routes::subscription).post(routes::subscribe))
        .route("/subscription/refresh", post(routes::refresh))
        .route("/nodes", get(routes::nodes))
        .route("/nodes/probe", post(routes::probe_all))
        .route("/node/select", post(routes::select_node))
        .route("/node/probe", post(routes::probe))
        .route("/singbox/start", post(routes::start))
        .route("/singbox/stop", post(routes::stop))
        .route("/singbox/restart", post(routes::restart))
        .route("/singbox/logs", get(routes::logs))
        .route("/ws", get(ws::upgrade))
        .fallback(routes::not_found)
        .with_state(state)
}

/// Serve the API on `listener` until `cancel` fires
pub async fn serve(
    listener: TcpListener,
    state: Arc<OrchestratorState>,
    cancel: CancellationToken,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    tracing::info!("API listening on {}", local_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            tracing::info!("API server shutting down");
        })
        .await
        .with_context(|| format!("API server on {} failed", local_addr))
}
