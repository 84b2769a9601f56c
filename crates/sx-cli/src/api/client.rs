//! HTTP client for the orchestrator API

use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sx_core::api::{
    ApiResponse, EngineInfo, LogLine, NodeView, ProbeReport, ProbeRequest, SelectNodeRequest,
    StartRequest, SubscribeRequest, SubscriptionView,
};
use sx_core::types::{NodeId, StatusSnapshot};

/// Orchestrator address used when none is given
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

/// Refreshes and probes can legitimately take a while
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// `GET /health` payload
#[derive(Debug, Clone, Deserialize)]
pub struct HealthInfo {
    pub status: String,
    pub version: String,
}

/// Client for the orchestrator HTTP API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    /// Create a client for the orchestrator at `server`.
    ///
    /// Accepts a full URL or a bare `host:port`.
    pub fn new(server: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base: normalize_base(server),
        })
    }

    /// Base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// URL of the `/ws` push stream
    pub fn push_url(&self) -> String {
        let ws = if let Some(rest) = self.base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base.clone()
        };
        format!("{}/ws", ws)
    }

    pub async fn health(&self) -> Result<HealthInfo> {
        self.get("/health").await
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        self.get("/status").await
    }

    pub async fn subscription(&self) -> Result<SubscriptionView> {
        self.get("/subscription").await
    }

    pub async fn nodes(&self) -> Result<Vec<NodeView>> {
        self.get("/nodes").await
    }

    /// Switch the orchestrator to a new subscription
    pub async fn subscribe(&self, url: &str, token: Option<&str>) -> Result<SubscriptionView> {
        let request = SubscribeRequest {
            url: url.to_string(),
            token: token.map(String::from),
        };
        self.post("/subscription", Some(&request)).await
    }

    /// Re-fetch the stored subscription
    pub async fn refresh(&self) -> Result<SubscriptionView> {
        self.post::<(), _>("/subscription/refresh", None).await
    }

    pub async fn select_node(&self, node_id: NodeId) -> Result<SubscriptionView> {
        self.post("/node/select", Some(&SelectNodeRequest { node_id }))
            .await
    }

    pub async fn probe(&self, node_id: NodeId) -> Result<ProbeReport> {
        self.post("/node/probe", Some(&ProbeRequest { node_id })).await
    }

    pub async fn probe_all(&self) -> Result<Vec<ProbeReport>> {
        self.post::<(), _>("/nodes/probe", None).await
    }

    /// Start the engine, with a generated config when `config` is `None`
    pub async fn start(&self, config: Option<Value>) -> Result<EngineInfo> {
        self.post("/singbox/start", Some(&StartRequest { config }))
            .await
    }

    pub async fn stop(&self) -> Result<EngineInfo> {
        self.post::<(), _>("/singbox/stop", None).await
    }

    pub async fn restart(&self, config: Option<Value>) -> Result<EngineInfo> {
        self.post("/singbox/restart", Some(&StartRequest { config }))
            .await
    }

    /// Captured engine output, the last `tail` lines when given
    pub async fn logs(&self, tail: Option<usize>) -> Result<Vec<LogLine>> {
        match tail {
            Some(n) => self.get(&format!("/singbox/logs?tail={}", n)).await,
            None => self.get("/singbox/logs").await,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        tracing::debug!("GET {}", url);

        let response = self.http.get(&url).send().await.with_context(|| {
            format!(
                "Failed to reach orchestrator at {}. Is it running?",
                self.base
            )
        })?;
        unwrap_envelope(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        tracing::debug!("POST {}", url);

        let mut request = self.http.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.with_context(|| {
            format!(
                "Failed to reach orchestrator at {}. Is it running?",
                self.base
            )
        })?;
        unwrap_envelope(response).await
    }
}

/// Decode the response envelope; a failed envelope becomes an error carrying
/// the server's message.
async fn unwrap_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .context("Failed to read orchestrator response")?;

    let envelope: ApiResponse<T> = serde_json::from_slice(&bytes)
        .with_context(|| format!("Unexpected response from orchestrator ({})", status))?;

    match envelope.into_result() {
        Ok(Some(data)) => Ok(data),
        Ok(None) => anyhow::bail!("Orchestrator response carried no data ({})", status),
        Err(message) => anyhow::bail!("{}", message),
    }
}

fn normalize_base(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.contains("://") {
        server.to_string()
    } else {
        format!("http://{}", server)
    }
}
