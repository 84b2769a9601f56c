//! Core error types for sing-xboard

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::NodeId;

/// Top-level error type returned by the orchestrator facade
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Subscription error
    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    /// Engine process error
    #[error("Engine error: {0}")]
    Process(#[from] ProcessError),

    /// Probe error
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Subscription fetch and node selection errors
///
/// `Clone` because a single coalesced refresh hands the same result to every
/// caller that attached to it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Transport failure talking to the panel
    #[error("Network error: {0}")]
    Network(String),

    /// Panel answered with a non-success status
    #[error("Panel returned HTTP {status} for {endpoint}")]
    Http { endpoint: String, status: u16 },

    /// Fetch did not complete within the configured timeout
    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed subscription payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Subscription URL could not be understood
    #[error("Invalid subscription URL: {0}")]
    InvalidUrl(String),

    /// Refresh requested with no stored source
    #[error("No subscription configured")]
    NotConfigured,

    /// Unknown node id
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
}

impl SubscriptionError {
    /// Whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SubscriptionError::Network(_) | SubscriptionError::Timeout(_) => true,
            SubscriptionError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Engine process lifecycle errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// A start was requested while an engine is live
    #[error("Engine already running (pid {pid:?})")]
    AlreadyRunning { pid: Option<u32> },

    /// The engine could not be launched or died during startup
    #[error("Failed to spawn engine: {0}")]
    Spawn(String),

    /// No engine binary could be located
    #[error("Engine binary not found (searched: {searched})")]
    BinaryNotFound { searched: String },

    /// Start or restart without any config to launch with
    #[error("No engine configuration available")]
    NoConfig,

    /// Engine did not exit even after a forced kill
    #[error("Engine did not exit within {0:?}")]
    StopTimeout(Duration),

    /// Engine config could not be serialized
    #[error("Failed to serialize engine config: {0}")]
    Serialize(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Node probe errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Unknown node id
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Connect did not finish within the probe timeout
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    /// Endpoint refused or could not be resolved
    #[error("Unreachable: {0}")]
    Unreachable(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
