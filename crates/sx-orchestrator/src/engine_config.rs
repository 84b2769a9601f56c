//! sing-box configuration generated from the subscription
//!
//! Layout of the generated config:
//!
//! ```text
//! inbound  mixed-in (127.0.0.1:<port>)
//!    |
//! route -> proxy (selector: select | direct)
//!             |
//!          select (selector: auto | <node>...; default = selected node)
//!             |
//!          auto (urltest over every node)
//! ```
//!
//! DNS queries are answered through the proxy, private ranges go direct.

use std::collections::HashSet;

use serde_json::{json, Map, Value};

use sx_core::config::EngineConfig;
use sx_core::types::Node;
use sx_core::ProcessError;

/// Tags used by the fixed part of the config
const RESERVED_TAGS: &[&str] = &["direct", "block", "dns-out", "auto", "select", "proxy"];

const URLTEST_URL: &str = "https://www.gstatic.com/generate_204";

/// Inputs that shape the generated config besides the nodes
#[derive(Debug, Clone)]
pub struct EngineConfigOptions {
    /// Port of the local mixed inbound
    pub inbound_port: u16,
    /// Engine log level
    pub log_level: String,
    /// Clash API listen address, omitted when `None`
    pub clash_api: Option<String>,
}

impl From<&EngineConfig> for EngineConfigOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            inbound_port: config.inbound_port,
            log_level: config.log_level.clone(),
            clash_api: config.clash_api.clone(),
        }
    }
}

/// Build an engine config routing through `nodes`.
///
/// Nodes with a protocol the engine config can't express are skipped. Fails
/// with [`ProcessError::NoConfig`] when no usable node remains.
pub fn build_engine_config(
    nodes: &[Node],
    options: &EngineConfigOptions,
) -> Result<Value, ProcessError> {
    let mut tags = HashSet::new();
    let mut node_outbounds = Vec::with_capacity(nodes.len());
    let mut node_tags = Vec::with_capacity(nodes.len());
    let mut default_tag = None;

    for node in nodes {
        let tag = unique_tag(node, &mut tags);
        let Some(outbound) = node_outbound(node, &tag) else {
            tracing::warn!(
                "Skipping node {} ({}): unsupported protocol '{}'",
                node.id,
                node.name,
                node.protocol
            );
            continue;
        };
        if node.selected {
            default_tag = Some(tag.clone());
        }
        node_outbounds.push(outbound);
        node_tags.push(tag);
    }

    if node_outbounds.is_empty() {
        return Err(ProcessError::NoConfig);
    }

    let default_tag = default_tag.unwrap_or_else(|| "auto".to_string());
    let mut select_members = vec![Value::from("auto")];
    select_members.extend(node_tags.iter().cloned().map(Value::from));

    let mut outbounds = vec![
        json!({ "type": "selector", "tag": "proxy", "outbounds": ["select", "direct"], "default": "select" }),
        json!({
            "type": "selector",
            "tag": "select",
            "outbounds": select_members,
            "default": default_tag,
        }),
        json!({
            "type": "urltest",
            "tag": "auto",
            "outbounds": node_tags,
            "url": URLTEST_URL,
            "interval": "5m",
            "tolerance": 50,
        }),
    ];
    outbounds.extend(node_outbounds);
    outbounds.push(json!({ "type": "direct", "tag": "direct" }));
    outbounds.push(json!({ "type": "block", "tag": "block" }));
    outbounds.push(json!({ "type": "dns", "tag": "dns-out" }));

    let mut config = json!({
        "log": { "level": options.log_level, "timestamp": true },
        "dns": {
            "servers": [
                { "tag": "remote", "address": "https://1.1.1.1/dns-query", "detour": "proxy" },
                { "tag": "local", "address": "223.5.5.5", "detour": "direct" },
            ],
            "final": "remote",
        },
        "inbounds": [{
            "type": "mixed",
            "tag": "mixed-in",
            "listen": "127.0.0.1",
            "listen_port": options.inbound_port,
            "sniff": true,
        }],
        "outbounds": outbounds,
        "route": {
            "rules": [
                { "protocol": "dns", "outbound": "dns-out" },
                { "ip_is_private": true, "outbound": "direct" },
            ],
            "final": "proxy",
            "auto_detect_interface": true,
        },
    });

    if let Some(controller) = &options.clash_api {
        config["experimental"] = json!({
            "clash_api": { "external_controller": controller }
        });
    }

    Ok(config)
}

/// Outbound tag for a node: its name, made unique across the config.
fn unique_tag(node: &Node, taken: &mut HashSet<String>) -> String {
    let base = node.name.trim();
    let base = if base.is_empty() {
        format!("{}-{}", node.protocol, node.id)
    } else {
        base.to_string()
    };

    let mut tag = base.clone();
    let mut n = 1;
    while RESERVED_TAGS.contains(&tag.as_str()) || taken.contains(&tag) {
        n += 1;
        tag = format!("{} ({})", base, n);
    }
    taken.insert(tag.clone());
    tag
}

fn node_outbound(node: &Node, tag: &str) -> Option<Value> {
    let p = &node.params;
    let mut out = Map::new();
    out.insert("tag".into(), tag.into());
    out.insert("server".into(), node.host.clone().into());
    out.insert("server_port".into(), node.port.into());

    match node.protocol.as_str() {
        "shadowsocks" | "ss" => {
            out.insert("type".into(), "shadowsocks".into());
            out.insert("method".into(), p.cipher.clone().into());
            out.insert("password".into(), p.password.clone().into());
        }
        "vmess" => {
            out.insert("type".into(), "vmess".into());
            out.insert("uuid".into(), p.uuid.clone().into());
            out.insert("alter_id".into(), p.alter_id.into());
            let security = if p.cipher.is_empty() { "auto" } else { p.cipher.as_str() };
            out.insert("security".into(), security.into());
            if p.tls {
                out.insert("tls".into(), tls(node));
            }
            insert_transport(&mut out, node);
        }
        "vless" => {
            out.insert("type".into(), "vless".into());
            out.insert("uuid".into(), p.uuid.clone().into());
            if !p.flow.is_empty() {
                out.insert("flow".into(), p.flow.clone().into());
            }
            if let Some(reality) = &p.reality {
                out.insert(
                    "tls".into(),
                    json!({
                        "enabled": true,
                        "server_name": reality.server_name,
                        "utls": { "enabled": true, "fingerprint": "chrome" },
                        "reality": {
                            "enabled": true,
                            "public_key": reality.public_key,
                            "short_id": reality.short_id,
                        },
                    }),
                );
            } else if p.tls {
                out.insert("tls".into(), tls(node));
            }
            insert_transport(&mut out, node);
        }
        "trojan" => {
            out.insert("type".into(), "trojan".into());
            out.insert("password".into(), p.password.clone().into());
            out.insert("tls".into(), tls(node));
            insert_transport(&mut out, node);
        }
        "hysteria2" | "hy2" => {
            out.insert("type".into(), "hysteria2".into());
            out.insert("password".into(), p.password.clone().into());
            if let Some(hy) = &p.hysteria2 {
                if let Some(up) = parse_mbps(&hy.up) {
                    out.insert("up_mbps".into(), up.into());
                }
                if let Some(down) = parse_mbps(&hy.down) {
                    out.insert("down_mbps".into(), down.into());
                }
                if !hy.obfs.is_empty() {
                    out.insert(
                        "obfs".into(),
                        json!({ "type": "salamander", "password": hy.obfs }),
                    );
                }
            }
            out.insert("tls".into(), tls(node));
        }
        _ => return None,
    }

    Some(Value::Object(out))
}

fn tls(node: &Node) -> Value {
    let mut tls = json!({ "enabled": true, "insecure": node.params.skip_cert });
    if !node.params.sni.is_empty() {
        tls["server_name"] = node.params.sni.clone().into();
    }
    tls
}

fn insert_transport(out: &mut Map<String, Value>, node: &Node) {
    let p = &node.params;
    let transport = match p.network.as_str() {
        "" | "tcp" => return,
        "ws" => {
            let path = if p.path.is_empty() { "/" } else { p.path.as_str() };
            let mut ws = json!({ "type": "ws", "path": path });
            let host = if p.sni.is_empty() { &node.host } else { &p.sni };
            ws["headers"] = json!({ "Host": host });
            ws
        }
        "grpc" => json!({ "type": "grpc", "service_name": p.path }),
        "http" | "h2" => json!({ "type": "http", "path": p.path }),
        other => json!({ "type": other }),
    };
    out.insert("transport".into(), transport);
}

/// Leading integer of a bandwidth string such as `"100 Mbps"`.
fn parse_mbps(s: &str) -> Option<u64> {
    let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok().filter(|&n| n > 0)
}
