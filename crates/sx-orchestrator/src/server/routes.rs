//! HTTP handlers

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sx_core::api::{
    ApiResponse, EngineInfo, LogLine, NodeView, ProbeReport, ProbeRequest, SelectNodeRequest,
    StartRequest, SubscribeRequest, SubscriptionView,
};
use sx_core::types::StatusSnapshot;
use sx_core::{ProbeError, ProcessError, SubscriptionError};

use crate::state::OrchestratorState;
use crate::supervisor::StopOutcome;

type AppState = State<Arc<OrchestratorState>>;
type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T>(data: T) -> ApiResult<T> {
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

fn fail<T>(status: StatusCode, message: impl Into<String>) -> ApiResult<T> {
    (status, Json(ApiResponse::error(message)))
}

fn subscription_status(e: &SubscriptionError) -> StatusCode {
    match e {
        SubscriptionError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        SubscriptionError::NotConfigured => StatusCode::CONFLICT,
        SubscriptionError::NodeNotFound(_) => StatusCode::NOT_FOUND,
        SubscriptionError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        SubscriptionError::Network(_)
        | SubscriptionError::Http { .. }
        | SubscriptionError::Parse(_) => StatusCode::BAD_GATEWAY,
    }
}

fn process_status(e: &ProcessError) -> StatusCode {
    match e {
        ProcessError::AlreadyRunning { .. } | ProcessError::NoConfig => StatusCode::CONFLICT,
        ProcessError::Serialize(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn probe_status(e: &ProbeError) -> StatusCode {
    match e {
        ProbeError::NodeNotFound(_) => StatusCode::NOT_FOUND,
        ProbeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ProbeError::Unreachable(_) => StatusCode::BAD_GATEWAY,
    }
}

fn subscription_result<T>(result: Result<T, SubscriptionError>) -> ApiResult<T> {
    match result {
        Ok(data) => ok(data),
        Err(e) => fail(subscription_status(&e), e.to_string()),
    }
}

fn process_result<T>(result: Result<T, ProcessError>) -> ApiResult<T> {
    match result {
        Ok(data) => ok(data),
        Err(e) => fail(process_status(&e), e.to_string()),
    }
}

fn bad_body<T>(rejection: JsonRejection) -> ApiResult<T> {
    fail(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", rejection.body_text()))
}

#[derive(Serialize)]
pub(super) struct Health {
    status: &'static str,
    version: &'static str,
}

pub(super) async fn health() -> ApiResult<Health> {
    ok(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(super) async fn status(State(state): AppState) -> ApiResult<StatusSnapshot> {
    ok(state.status().as_ref().clone())
}

pub(super) async fn subscription(State(state): AppState) -> ApiResult<SubscriptionView> {
    ok(state.subscription_view())
}

pub(super) async fn subscribe(
    State(state): AppState,
    body: Result<Json<SubscribeRequest>, JsonRejection>,
) -> ApiResult<SubscriptionView> {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    subscription_result(state.subscribe(&request.url, request.token.as_deref()).await)
}

pub(super) async fn refresh(State(state): AppState) -> ApiResult<SubscriptionView> {
    subscription_result(state.refresh().await)
}

pub(super) async fn nodes(State(state): AppState) -> ApiResult<Vec<NodeView>> {
    ok(state.nodes())
}

pub(super) async fn select_node(
    State(state): AppState,
    body: Result<Json<SelectNodeRequest>, JsonRejection>,
) -> ApiResult<SubscriptionView> {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    subscription_result(state.select_node(request.node_id).await)
}

pub(super) async fn probe(
    State(state): AppState,
    body: Result<Json<ProbeRequest>, JsonRejection>,
) -> ApiResult<ProbeReport> {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    match state.probe(request.node_id).await {
        Ok(report) => ok(report),
        Err(e) => fail(probe_status(&e), e.to_string()),
    }
}

pub(super) async fn probe_all(State(state): AppState) -> ApiResult<Vec<ProbeReport>> {
    ok(state.probe_all().await)
}

/// Start and restart accept an empty body or `{"config": ...}`.
fn start_request(body: &Bytes) -> Result<Option<Value>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<StartRequest>(body)
        .map(|r| r.config)
        .map_err(|e| format!("Invalid request body: {}", e))
}

pub(super) async fn start(State(state): AppState, body: Bytes) -> ApiResult<EngineInfo> {
    match start_request(&body) {
        Ok(config) => process_result(state.start_engine(config).await),
        Err(message) => fail(StatusCode::BAD_REQUEST, message),
    }
}

pub(super) async fn restart(State(state): AppState, body: Bytes) -> ApiResult<EngineInfo> {
    match start_request(&body) {
        Ok(config) => process_result(state.restart_engine(config).await),
        Err(message) => fail(StatusCode::BAD_REQUEST, message),
    }
}

pub(super) async fn stop(State(state): AppState) -> ApiResult<EngineInfo> {
    match state.stop_engine().await {
        Ok(StopOutcome::NotRunning) | Ok(StopOutcome::Stopped(_)) => {
            ok(state.supervisor.status().info())
        }
        Err(e) => fail(process_status(&e), e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct LogsQuery {
    tail: Option<usize>,
}

pub(super) async fn logs(
    State(state): AppState,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Vec<LogLine>> {
    ok(state.engine_logs(query.tail))
}

pub(super) async fn not_found() -> ApiResult<()> {
    fail(StatusCode::NOT_FOUND, "Not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sx_core::types::NodeId;

    #[test]
    fn test_empty_start_body() {
        assert_eq!(start_request(&Bytes::new()), Ok(None));
        assert_eq!(start_request(&Bytes::from_static(b" \n")), Ok(None));
        assert_eq!(start_request(&Bytes::from_static(b"{}")), Ok(None));
    }

    #[test]
    fn test_start_body_with_config() {
        let config = start_request(&Bytes::from_static(br#"{"config":{"log":{}}}"#)).unwrap();
        assert_eq!(config, Some(serde_json::json!({"log": {}})));
        assert!(start_request(&Bytes::from_static(b"{nope")).is_err());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            subscription_status(&SubscriptionError::NodeNotFound(NodeId(1))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            subscription_status(&SubscriptionError::Timeout(std::time::Duration::from_secs(1))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            process_status(&ProcessError::AlreadyRunning { pid: Some(1) }),
            StatusCode::CONFLICT
        );
    }
}
