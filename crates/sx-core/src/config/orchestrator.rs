//! Orchestrator configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Configuration for the orchestrator daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Address the HTTP/push API binds to
    pub listen_address: String,

    /// Engine process settings
    pub engine: EngineConfig,

    /// Panel subscription settings
    pub subscription: SubscriptionConfig,

    /// Status aggregation settings
    pub status: StatusConfig,

    /// Node probe settings
    pub probe: ProbeConfig,

    /// Push channel settings
    pub push: PushConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:8080".to_string(),
            engine: EngineConfig::default(),
            subscription: SubscriptionConfig::default(),
            status: StatusConfig::default(),
            probe: ProbeConfig::default(),
            push: PushConfig::default(),
        }
    }
}

/// Engine subprocess settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit engine binary; searched for when unset
    pub binary: Option<PathBuf>,

    /// Arguments passed to the engine; the config is written to its stdin
    pub args: Vec<String>,

    /// Working directory for the engine process
    pub working_dir: Option<PathBuf>,

    /// How long the engine must stay alive before the start counts as successful
    #[serde(with = "duration_millis")]
    pub startup_grace: Duration,

    /// How long to wait after a graceful termination request before killing
    #[serde(with = "duration_secs")]
    pub stop_grace: Duration,

    /// Captured output lines kept for diagnostics
    pub log_capacity: usize,

    /// Engine log level written into generated configs
    pub log_level: String,

    /// Port of the local mixed (HTTP + SOCKS) inbound in generated configs
    pub inbound_port: u16,

    /// Address of the engine's Clash-compatible API, used for traffic counters
    pub clash_api: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: None,
            args: vec!["run".to_string(), "-c".to_string(), "stdin".to_string()],
            working_dir: None,
            startup_grace: Duration::from_millis(500),
            stop_grace: Duration::from_secs(5),
            log_capacity: 500,
            log_level: "info".to_string(),
            inbound_port: 7890,
            clash_api: Some("127.0.0.1:9090".to_string()),
        }
    }
}

/// Panel subscription settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Subscription URL
    pub url: Option<String>,

    /// Explicit token, overrides one embedded in the URL
    pub token: Option<String>,

    /// Overall timeout for one panel request
    #[serde(with = "duration_secs")]
    pub fetch_timeout: Duration,

    /// TCP connect timeout for panel requests
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Refresh periodically with the stored source
    pub auto_update: bool,

    /// Period of the automatic refresh
    #[serde(with = "duration_secs")]
    pub update_interval: Duration,

    /// Retry policy for transient fetch failures
    pub retry: RetryPolicy,

    /// Where the last good subscription is cached; disabled when unset
    pub cache_path: Option<PathBuf>,

    /// User-Agent sent to the panel
    pub user_agent: String,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            fetch_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            auto_update: false,
            update_interval: Duration::from_secs(3600),
            retry: RetryPolicy::default(),
            cache_path: Some(super::default_config_dir().join("subscription.json")),
            user_agent: concat!("sing-xboard/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Retry policy for subscription refreshes
///
/// Only transient failures (transport errors, timeouts, 5xx) are retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first; 0 disables retrying
    pub attempts: u32,

    /// Fixed delay between attempts
    #[serde(with = "duration_millis")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 0,
            delay: Duration::from_secs(2),
        }
    }
}

/// Status aggregation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Period of the status tick
    #[serde(with = "duration_millis")]
    pub tick_interval: Duration,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Node probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Connect timeout per probe
    #[serde(with = "duration_millis")]
    pub timeout: Duration,

    /// Maximum probes in flight at once
    pub max_in_flight: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            max_in_flight: 8,
        }
    }
}

/// Push channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Snapshots buffered per client before it counts as lagging
    pub client_buffer: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self { client_buffer: 16 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
            listen_address = "127.0.0.1:9000"

            [engine]
            stop_grace = 2

            [subscription.retry]
            attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_address, "127.0.0.1:9000");
        assert_eq!(config.engine.stop_grace, Duration::from_secs(2));
        assert_eq!(config.engine.startup_grace, Duration::from_millis(500));
        assert_eq!(config.engine.args, vec!["run", "-c", "stdin"]);
        assert_eq!(config.subscription.retry.attempts, 3);
        assert_eq!(config.subscription.retry.delay, Duration::from_secs(2));
        assert_eq!(config.probe.max_in_flight, 8);
    }

    #[test]
    fn test_default_retry_is_disabled() {
        assert_eq!(RetryPolicy::default().attempts, 0);
    }

    #[test]
    fn test_defaults_are_bounded() {
        let config = OrchestratorConfig::default();
        assert!(config.engine.stop_grace > Duration::ZERO);
        assert!(config.probe.timeout > Duration::ZERO);
        assert!(config.subscription.fetch_timeout > Duration::ZERO);
        assert!(config.status.tick_interval <= Duration::from_secs(5));
    }
}
