//! Node prober tests against local listeners

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::{timeout, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sx_core::config::{ProbeConfig, SubscriptionConfig};
use sx_core::types::NodeId;
use sx_core::ProbeError;
use sx_orchestrator::prober::NodeProber;
use sx_orchestrator::subscription::{
    SubscriptionManager, SubscriptionSource, SUBSCRIBE_PATH, USER_INFO_PATH,
};

/// Manager subscribed to a panel serving `servers`
async fn subscription(servers: serde_json::Value) -> (MockServer, Arc<SubscriptionManager>) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SUBSCRIBE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "servers": servers })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(USER_INFO_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "p@example.com"})))
        .mount(&server)
        .await;

    let manager = Arc::new(
        SubscriptionManager::new(&SubscriptionConfig {
            cache_path: None,
            ..SubscriptionConfig::default()
        })
        .unwrap(),
    );
    let source = SubscriptionSource::parse(&format!("{}/sub/t", server.uri()), None).unwrap();
    manager.refresh(source).await.unwrap();

    (server, manager)
}

/// Subscription with node 1 listening and node 2 refusing connections
async fn setup() -> (MockServer, Arc<SubscriptionManager>, TcpListener) {
    let open = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let (server, manager) = subscription(json!([
        {"id": 1, "name": "open", "host": "127.0.0.1", "port": open.local_addr().unwrap().port(), "type": "trojan"},
        {"id": 2, "name": "closed", "host": "127.0.0.1", "port": closed_port, "type": "trojan"}
    ]))
    .await;

    (server, manager, open)
}

/// Listener with a full accept queue. The kernel drops further SYNs, so new
/// connects hang until their timeout.
#[cfg(target_os = "linux")]
async fn stalled_listener() -> (TcpListener, Vec<TcpStream>) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(0).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut backlog = Vec::new();
    for _ in 0..4 {
        if let Ok(Ok(stream)) = timeout(Duration::from_millis(100), TcpStream::connect(addr)).await {
            backlog.push(stream);
        }
    }
    (listener, backlog)
}

fn prober(manager: &Arc<SubscriptionManager>) -> NodeProber {
    NodeProber::new(
        Arc::clone(manager),
        &ProbeConfig {
            timeout: Duration::from_secs(2),
            max_in_flight: 1,
        },
    )
}

#[tokio::test]
async fn test_probe_records_latency() {
    let (_server, manager, _open) = setup().await;
    let prober = prober(&manager);

    let report = prober.probe(NodeId(1)).await.unwrap();
    assert!(report.reachable);
    assert!(report.latency.is_some());
    assert_eq!(manager.node(NodeId(1)).unwrap().latency_ms, report.latency);
}

#[tokio::test]
async fn test_unreachable_node_clears_latency() {
    let (_server, manager, _open) = setup().await;
    let prober = prober(&manager);

    let report = prober.probe(NodeId(2)).await.unwrap();
    assert!(!report.reachable);
    assert!(report.error.is_some());
    assert_eq!(manager.node(NodeId(2)).unwrap().latency_ms, None);
}

#[tokio::test]
async fn test_probe_unknown_node() {
    let (_server, manager, _open) = setup().await;
    let err = prober(&manager).probe(NodeId(99)).await.unwrap_err();
    assert_eq!(err, ProbeError::NodeNotFound(NodeId(99)));
}

#[tokio::test]
async fn test_probe_all_leaves_selection() {
    let (_server, manager, _open) = setup().await;
    manager.select_node(NodeId(2)).await.unwrap();

    let reports = prober(&manager).probe_all().await;
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().any(|r| r.node_id == NodeId(1) && r.reachable));
    assert!(reports.iter().any(|r| r.node_id == NodeId(2) && !r.reachable));

    let state = manager.current();
    assert_eq!(state.selected().map(|n| n.id), Some(NodeId(2)));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_connect_timeout_clears_latency() {
    let (listener, _backlog) = stalled_listener().await;
    let port = listener.local_addr().unwrap().port();
    let (_server, manager) = subscription(json!([
        {"id": 1, "name": "stalled", "host": "127.0.0.1", "port": port, "type": "vless"}
    ]))
    .await;
    assert!(manager.record_latency(NodeId(1), Some(35)));

    let prober = NodeProber::new(
        Arc::clone(&manager),
        &ProbeConfig {
            timeout: Duration::from_millis(200),
            max_in_flight: 4,
        },
    );
    let report = prober.probe(NodeId(1)).await.unwrap();

    assert!(!report.reachable);
    assert_eq!(report.latency, None);
    let error = report.error.unwrap();
    assert!(error.contains("timed out"), "{}", error);
    assert_eq!(manager.node(NodeId(1)).unwrap().latency_ms, None);
}

/// With two connects allowed at a time, four stalled nodes take two full
/// timeouts: more than one, less than four.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_latency_checks_limit_connects_in_flight() {
    let (listener, _backlog) = stalled_listener().await;
    let port = listener.local_addr().unwrap().port();
    let servers: Vec<_> = (1..=4)
        .map(|id| json!({"id": id, "name": format!("n{}", id), "host": "127.0.0.1", "port": port, "type": "trojan"}))
        .collect();
    let (_server, manager) = subscription(serde_json::Value::Array(servers)).await;

    let per_connect = Duration::from_millis(250);
    let prober = NodeProber::new(
        Arc::clone(&manager),
        &ProbeConfig {
            timeout: per_connect,
            max_in_flight: 2,
        },
    );

    let started = Instant::now();
    let reports = prober.probe_all().await;
    let elapsed = started.elapsed();

    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|r| !r.reachable && r.latency.is_none()));
    assert!(elapsed >= per_connect * 2, "{:?}", elapsed);
    assert!(elapsed < per_connect * 4, "{:?}", elapsed);
}
