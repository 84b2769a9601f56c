//! sing-xboard orchestrator daemon
//!
//! Supervises the sing-box engine, keeps the Xboard subscription in sync and
//! serves the local HTTP/push API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sx_core::config::{self, OrchestratorConfig};
use sx_orchestrator::OrchestratorState;

#[derive(Parser)]
#[command(name = "sx-orchestrator")]
#[command(about = "sing-xboard orchestrator daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Path to the sing-box binary (overrides config)
    #[arg(long)]
    singbox: Option<PathBuf>,

    /// Subscription URL (overrides config)
    #[arg(long)]
    subscription: Option<String>,

    /// Start the engine once the subscription is loaded
    #[arg(long)]
    autostart: bool,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("sing-xboard orchestrator starting...");

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                OrchestratorConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            OrchestratorConfig::default()
        }
    };

    if let Some(listen) = args.listen {
        config.listen_address = listen;
    }
    if let Some(binary) = args.singbox {
        config.engine.binary = Some(binary);
    }
    if let Some(url) = args.subscription {
        config.subscription.url = Some(url);
    }

    let listener = TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_address))?;

    let state = Arc::new(OrchestratorState::new(config).context("Failed to initialize orchestrator")?);
    state.restore().await;

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let tasks = state.spawn_background(cancel.clone());

    if state.subscription.current().nodes.is_empty() && state.subscription.stored_source().is_some() {
        match state.refresh().await {
            Ok(view) => tracing::info!("Loaded {} nodes", view.nodes.len()),
            Err(e) => tracing::warn!("Initial subscription refresh failed: {}", e),
        }
    }

    if args.autostart {
        match state.start_engine(None).await {
            Ok(info) => tracing::info!("Engine started (pid {:?})", info.pid),
            Err(e) => tracing::error!("Autostart failed: {}", e),
        }
    }

    let served = sx_orchestrator::server::serve(listener, Arc::clone(&state), cancel.clone()).await;

    cancel.cancel();
    state.shutdown().await;
    for task in tasks {
        let _ = task.await;
    }

    served?;
    tracing::info!("Orchestrator shutdown complete");
    Ok(())
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel.cancel();
    });
}
