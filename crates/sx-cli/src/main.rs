//! sing-xboard CLI
//!
//! Client for a running sx-orchestrator:
//! - Subscription management (subscribe, refresh)
//! - Node listing, selection and probing
//! - Engine lifecycle (start, stop, restart, logs)
//! - Live status (status, watch)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sing_xboard::api::{ApiClient, DEFAULT_SERVER};
use sing_xboard::commands;
use sing_xboard::output::{print_error, print_success};

#[derive(Parser)]
#[command(name = "sing-xboard")]
#[command(author, version, about = "Control the sing-box connection orchestrator")]
#[command(propagate_version = true)]
struct Cli {
    /// Orchestrator address
    #[arg(short, long, global = true, env = "SX_SERVER", default_value = DEFAULT_SERVER)]
    server: String,

    /// Path to the orchestrator configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show engine, traffic and account status
    Status {
        /// Print the raw status snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// List nodes of the current subscription
    #[command(alias = "ls")]
    Nodes,

    /// Set the subscription URL and fetch it
    Subscribe {
        /// Subscription URL (.../api/v1/client/subscribe?token=... or .../sub/<token>)
        url: String,
        /// Token, overrides one embedded in the URL
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Re-fetch the current subscription
    Refresh,

    /// Select the node to route through
    Select {
        /// Node ID (see `sing-xboard nodes`)
        id: u64,
    },

    /// Measure node latency; probes every node when no ID is given
    Probe {
        /// Node ID
        id: Option<u64>,
    },

    /// Start the sing-box engine
    Start {
        /// sing-box config file (JSON); generated from the subscription if omitted
        #[arg(long = "engine-config", value_name = "FILE")]
        engine_config: Option<PathBuf>,
    },

    /// Stop the sing-box engine
    Stop,

    /// Restart the sing-box engine
    Restart {
        /// sing-box config file (JSON); reuses the current one if omitted
        #[arg(long = "engine-config", value_name = "FILE")]
        engine_config: Option<PathBuf>,
    },

    /// Show captured engine output
    Logs {
        /// Only show the last N lines
        #[arg(short = 'n', long)]
        tail: Option<usize>,
    },

    /// Follow status updates, reconnecting when the stream drops
    Watch,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show config file path
    Path,
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let client = ApiClient::new(&cli.server)?;

    // No command: quick health check
    let Some(command) = cli.command else {
        return show_quick_status(&client).await;
    };

    let result = match command {
        Commands::Status { json } => commands::status_command(&client, json).await,
        Commands::Nodes => commands::nodes_command(&client).await,
        Commands::Subscribe { url, token } => {
            commands::subscribe_command(&client, &url, token.as_deref()).await
        }
        Commands::Refresh => commands::refresh_command(&client).await,
        Commands::Select { id } => commands::select_command(&client, id).await,
        Commands::Probe { id } => commands::probe_command(&client, id).await,
        Commands::Start { engine_config } => {
            commands::start_command(&client, engine_config.as_deref()).await
        }
        Commands::Stop => commands::stop_command(&client).await,
        Commands::Restart { engine_config } => {
            commands::restart_command(&client, engine_config.as_deref()).await
        }
        Commands::Logs { tail } => commands::logs_command(&client, tail).await,
        Commands::Watch => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });
            commands::watch_command(&client, cancel).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(cli.config.as_deref()),
            ConfigAction::Path => commands::config_path(cli.config.as_deref()),
            ConfigAction::Init { force } => commands::config_init(cli.config.as_deref(), force),
        },
    };

    if let Err(e) = &result {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

/// Show a one-line health check when no command is given
async fn show_quick_status(client: &ApiClient) -> Result<()> {
    match client.health().await {
        Ok(health) => {
            print_success(&format!(
                "Orchestrator {} at {} ({})",
                health.status,
                client.base_url(),
                health.version
            ));
            println!();
            println!("Run 'sing-xboard --help' for available commands");
            Ok(())
        }
        Err(e) => {
            print_error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}
