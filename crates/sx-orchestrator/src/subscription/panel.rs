//! Xboard panel client
//!
//! A refresh needs both the server list and the account info; the two
//! requests run concurrently and either failure fails the whole fetch.

use std::collections::HashSet;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use sx_core::config::SubscriptionConfig;
use sx_core::time::{current_time_secs, parse_timestamp};
use sx_core::types::{Node, NodeId, NodeParams, UserInfo};
use sx_core::SubscriptionError;

use super::source::{SubscriptionSource, SUBSCRIBE_PATH, USER_INFO_PATH};

/// Panels answer either with the bare object or wrapped in `data`
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

#[derive(Deserialize)]
struct PanelSubscription {
    servers: Vec<PanelServer>,
}

#[derive(Deserialize)]
struct PanelServer {
    id: u64,
    #[serde(default)]
    name: String,
    host: String,
    port: u16,
    #[serde(rename = "type")]
    protocol: String,
    #[serde(flatten)]
    params: NodeParams,
}

#[derive(Deserialize)]
struct PanelUserInfo {
    #[serde(default)]
    email: String,
    #[serde(default, alias = "u")]
    upload: u64,
    #[serde(default, alias = "d")]
    download: u64,
    #[serde(default, alias = "transfer_enable")]
    total: u64,
    #[serde(default, alias = "expired_at")]
    expire_time: Option<serde_json::Value>,
}

/// Parsed result of one successful fetch
#[derive(Debug, Clone)]
pub struct FetchedSubscription {
    pub nodes: Vec<Node>,
    pub user: UserInfo,
}

/// HTTP client for the panel API
pub struct PanelClient {
    http: reqwest::Client,
    fetch_timeout: Duration,
}

impl PanelClient {
    /// Build a client from subscription settings
    pub fn new(config: &SubscriptionConfig) -> Result<Self, SubscriptionError> {
        // The engine may be the system proxy; panel traffic must not loop through it.
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(config.fetch_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SubscriptionError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            fetch_timeout: config.fetch_timeout,
        })
    }

    /// Fetch and parse servers and account info from `source`
    pub async fn fetch(
        &self,
        source: &SubscriptionSource,
    ) -> Result<FetchedSubscription, SubscriptionError> {
        let (subscription, user) = tokio::try_join!(
            self.get_json::<Envelope<PanelSubscription>>(source, SUBSCRIBE_PATH),
            self.get_json::<Envelope<PanelUserInfo>>(source, USER_INFO_PATH),
        )?;

        let nodes = parse_servers(subscription.into_inner().servers)?;
        let user = parse_user(user.into_inner())?;
        Ok(FetchedSubscription { nodes, user })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        source: &SubscriptionSource,
        path: &str,
    ) -> Result<T, SubscriptionError> {
        let response = self
            .http
            .get(source.endpoint(path))
            .query(&[("token", source.token.as_str())])
            .bearer_auth(&source.token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubscriptionError::Http {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&body)
            .map_err(|e| SubscriptionError::Parse(format!("{}: {}", path, e)))
    }

    fn transport_error(&self, e: reqwest::Error) -> SubscriptionError {
        if e.is_timeout() {
            SubscriptionError::Timeout(self.fetch_timeout)
        } else if e.is_connect() {
            SubscriptionError::Network(format!("connection failed: {}", e))
        } else {
            SubscriptionError::Network(e.to_string())
        }
    }
}

fn parse_servers(servers: Vec<PanelServer>) -> Result<Vec<Node>, SubscriptionError> {
    if servers.is_empty() {
        return Err(SubscriptionError::Parse(
            "subscription contains no servers".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(servers.len());
    let mut nodes = Vec::with_capacity(servers.len());
    for server in servers {
        if !seen.insert(server.id) {
            return Err(SubscriptionError::Parse(format!(
                "duplicate server id {}",
                server.id
            )));
        }
        if server.host.trim().is_empty() || server.port == 0 {
            return Err(SubscriptionError::Parse(format!(
                "server {} has no usable endpoint",
                server.id
            )));
        }

        let name = if server.name.trim().is_empty() {
            format!("{}-{}", server.protocol, server.id)
        } else {
            server.name
        };

        nodes.push(Node {
            id: NodeId(server.id),
            name,
            host: server.host,
            port: server.port,
            protocol: server.protocol,
            params: server.params,
            latency_ms: None,
            selected: false,
        });
    }
    Ok(nodes)
}

fn parse_user(raw: PanelUserInfo) -> Result<UserInfo, SubscriptionError> {
    let expire_at = match raw.expire_time {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(0) => None,
            Some(secs) => Some(secs),
            None => {
                return Err(SubscriptionError::Parse(format!(
                    "invalid expire_time {}",
                    n
                )))
            }
        },
        Some(serde_json::Value::String(s)) => match parse_timestamp(&s) {
            Some(secs) => Some(secs),
            None if s.trim().is_empty() => None,
            None => {
                return Err(SubscriptionError::Parse(format!(
                    "invalid expire_time '{}'",
                    s
                )))
            }
        },
        Some(other) => {
            return Err(SubscriptionError::Parse(format!(
                "invalid expire_time {}",
                other
            )))
        }
    };

    let used = raw.upload.saturating_add(raw.download);
    let within_quota = raw.total == 0 || used < raw.total;
    let not_expired = expire_at.map_or(true, |at| at > current_time_secs());

    Ok(UserInfo {
        email: raw.email,
        upload: raw.upload,
        download: raw.download,
        total: raw.total,
        expire_at,
        active: within_quota && not_expired,
    })
}
