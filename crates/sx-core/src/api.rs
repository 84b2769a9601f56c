//! HTTP and push API contract between the orchestrator and its clients
//!
//! Every HTTP response is wrapped in [`ApiResponse`]. Request bodies use
//! snake_case field names, response payloads use camelCase. The `/ws` stream
//! carries [`PushMessage`] frames encoded as JSON text.

use serde::{Deserialize, Serialize};

use crate::types::{EngineState, Node, NodeId, StatusSnapshot};

/// Uniform response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying data
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response carrying an error message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Convert into a `Result`, treating `success == false` as an error
    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "request failed without an error message".to_string()))
        }
    }
}

impl ApiResponse<()> {
    /// Successful response without data
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }
}

/// `POST /subscription` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Subscription URL, either `.../api/v1/client/subscribe?token=...` or `.../sub/<token>`
    pub url: String,
    /// Explicit token, overrides one embedded in the URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// `POST /node/select` body
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectNodeRequest {
    pub node_id: NodeId,
}

/// `POST /node/probe` body
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub node_id: NodeId,
}

/// `POST /singbox/start` and `/singbox/restart` body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRequest {
    /// Raw engine config; generated from the subscription when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Node as presented to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub id: NodeId,
    pub name: String,
    pub address: String,
    pub protocol: String,
    pub latency: Option<u64>,
    pub selected: bool,
}

impl From<&Node> for NodeView {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
            address: node.address(),
            protocol: node.protocol.clone(),
            latency: node.latency_ms,
            selected: node.selected,
        }
    }
}

/// `GET /subscription` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    /// Panel base URL of the current source
    pub source: Option<String>,
    /// Unix millis of the last successful fetch
    pub last_update: Option<u64>,
    pub nodes: Vec<NodeView>,
}

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub node_id: NodeId,
    pub reachable: bool,
    pub latency: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Engine state returned by lifecycle operations
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInfo {
    pub state: EngineState,
    pub pid: Option<u32>,
}

/// Which engine stream a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// One captured engine output line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub stream: LogStream,
    pub line: String,
    /// Unix millis when the line was read
    pub at: u64,
}

/// Frame sent over the `/ws` push stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// Full current status
    Status(StatusSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrafficStats;

    #[test]
    fn test_envelope_omits_empty_fields() {
        let json = serde_json::to_string(&ApiResponse::empty()).unwrap();
        assert_eq!(json, r#"{"success":true}"#);

        let json = serde_json::to_string(&ApiResponse::<()>::error("boom")).unwrap();
        assert_eq!(json, r#"{"success":false,"error":"boom"}"#);
    }

    #[test]
    fn test_envelope_into_result() {
        let resp: ApiResponse<u32> = serde_json::from_str(r#"{"success":true,"data":3}"#).unwrap();
        assert_eq!(resp.into_result(), Ok(Some(3)));

        let resp: ApiResponse<u32> =
            serde_json::from_str(r#"{"success":false,"error":"nope"}"#).unwrap();
        assert_eq!(resp.into_result(), Err("nope".to_string()));
    }

    #[test]
    fn test_push_message_is_flat_status() {
        let snapshot = StatusSnapshot {
            running: true,
            uptime: 12,
            stats: TrafficStats {
                upload: 5,
                download: 9,
            },
            ..StatusSnapshot::default()
        };
        let json = serde_json::to_value(PushMessage::Status(snapshot)).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["running"], true);
        assert_eq!(json["uptime"], 12);
        assert_eq!(json["stats"]["download"], 9);
    }

    #[test]
    fn test_select_request_uses_snake_case() {
        let req: SelectNodeRequest = serde_json::from_str(r#"{"node_id":12}"#).unwrap();
        assert_eq!(req.node_id, NodeId(12));
    }
}
