//! Core domain types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Panel-assigned identifier of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Create a new node ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw numeric id
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Reality TLS parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealityParams {
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub short_id: String,
    #[serde(default)]
    pub server_name: String,
}

/// Hysteria2 bandwidth and obfuscation parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hysteria2Params {
    #[serde(default)]
    pub up: String,
    #[serde(default)]
    pub down: String,
    #[serde(default)]
    pub obfs: String,
}

/// Protocol-specific connection parameters of a node
///
/// Field names follow the panel payload so the struct can be flattened
/// straight out of a server entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeParams {
    pub cipher: String,
    pub uuid: String,
    pub password: String,
    pub alter_id: u32,
    pub network: String,
    pub path: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub tls: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub skip_cert: bool,
    pub sni: String,
    pub flow: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reality: Option<RealityParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hysteria2: Option<Hysteria2Params>,
}

/// Panels send flags as booleans, 0/1 or strings.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => b,
        Raw::Int(i) => i != 0,
        Raw::Str(s) => matches!(s.trim(), "1" | "true"),
    })
}

/// One candidate proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Panel identifier
    pub id: NodeId,
    /// Display name, also used as the engine outbound tag
    pub name: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Protocol type (shadowsocks, vmess, vless, trojan, hysteria2)
    pub protocol: String,
    /// Protocol parameters
    pub params: NodeParams,
    /// Last measured latency, `None` when unmeasured or unreachable
    pub latency_ms: Option<u64>,
    /// Whether this is the node the engine should route through
    pub selected: bool,
}

impl Node {
    /// `host:port` of the node endpoint
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Account information reported by the panel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub email: String,
    /// Uploaded bytes this period
    pub upload: u64,
    /// Downloaded bytes this period
    pub download: u64,
    /// Quota in bytes, 0 when unlimited
    pub total: u64,
    /// Expiry as unix seconds, `None` when the plan never expires
    pub expire_at: Option<i64>,
    /// Account is within quota and not expired
    pub active: bool,
}

impl UserInfo {
    /// Bytes consumed against the quota
    pub fn used(&self) -> u64 {
        self.upload.saturating_add(self.download)
    }
}

/// Lifecycle state of the engine process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl EngineState {
    /// Whether a process handle exists in this state
    pub fn has_process(&self) -> bool {
        matches!(
            self,
            EngineState::Starting | EngineState::Running | EngineState::Stopping
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Starting => write!(f, "starting"),
            EngineState::Running => write!(f, "running"),
            EngineState::Stopping => write!(f, "stopping"),
            EngineState::Crashed => write!(f, "crashed"),
        }
    }
}

/// How the last engine run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitReport {
    /// Exit code, absent when killed by a signal
    pub code: Option<i32>,
    /// Human readable description
    pub reason: String,
    /// Whether the exit was requested through `stop()`
    pub requested: bool,
    /// Unix millis of the exit
    pub at: u64,
}

/// Cumulative traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficStats {
    pub upload: u64,
    pub download: u64,
}

/// Immutable point-in-time projection pushed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Whether the engine is running
    pub running: bool,
    /// Detailed engine state
    pub state: EngineState,
    /// Engine pid while a process exists
    pub pid: Option<u32>,
    /// Seconds since the current engine run started
    pub uptime: u64,
    /// Cumulative traffic
    pub stats: TrafficStats,
    /// Account information from the last successful refresh
    pub user: Option<UserInfo>,
    /// Currently selected node
    pub selected_node: Option<NodeId>,
    /// How the previous run ended
    pub last_exit: Option<ExitReport>,
    /// Unix millis at which this snapshot was built
    pub last_update: u64,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            running: false,
            state: EngineState::Stopped,
            pid: None,
            uptime: 0,
            stats: TrafficStats::default(),
            user: None,
            selected_node: None,
            last_exit: None,
            last_update: 0,
        }
    }
}
