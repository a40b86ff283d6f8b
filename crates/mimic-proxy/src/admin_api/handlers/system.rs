//! System handlers: health, metrics, stats, config values, interceptor UI.

use crate::admin_api::types::{
    build_response_with_headers, empty_response, error_response, json_response, parse_json_body,
    SetValueRequest, WorkspaceStats,
};
use crate::config::ValueStore;
use crate::interceptor::RequestInterceptor;
use crate::metrics::collect_metrics;
use crate::store::Store;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{error, info};

/// GET /health
pub fn handle_health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &serde_json::json!({"status": "ok"}))
}

/// GET /metrics - Prometheus metrics
pub fn handle_metrics() -> Response<Full<Bytes>> {
    build_response_with_headers(
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        collect_metrics(),
    )
}

/// GET /api/w/:ws/stats
pub fn handle_stats(store: &Store) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &workspace_stats(store))
}

/// Rule and in-memory request counts, per service and in total.
pub fn workspace_stats(store: &Store) -> WorkspaceStats {
    let mut stats = WorkspaceStats::default();

    for (service, rules) in store.get_all_rules() {
        stats.total_rules += rules.len();
        stats.services.entry(service).or_default().rules = rules.len();
    }
    for entry in store.get_traffic(usize::MAX, None) {
        stats.total_requests += 1;
        stats.services.entry(entry.service).or_default().requests += 1;
    }
    stats
}

/// GET /api/config
pub fn handle_list_values(values: &ValueStore) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &values.masked())
}

/// PUT /api/config/:key
pub async fn handle_set_value(
    key: &str,
    req: Request<Incoming>,
    values: &ValueStore,
) -> Response<Full<Bytes>> {
    if key.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "key must not be empty");
    }
    let body: SetValueRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match values.set(key, body.value) {
        Ok(()) => {
            info!(key = %key, "Config value set");
            json_response(StatusCode::OK, &serde_json::json!({ "key": key }))
        }
        Err(e) => {
            error!(key = %key, "Failed to persist config value: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// DELETE /api/config/:key
pub fn handle_delete_value(key: &str, values: &ValueStore) -> Response<Full<Bytes>> {
    match values.delete(key) {
        Ok(true) => {
            info!(key = %key, "Config value deleted");
            json_response(StatusCode::OK, &serde_json::json!({ "key": key }))
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, &format!("key '{key}' not found")),
        Err(e) => {
            error!(key = %key, "Failed to persist config value: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// GET /api/interceptor/ui - 204 when there is nothing to show
pub fn handle_interceptor_ui(
    interceptor: Option<&Arc<dyn RequestInterceptor>>,
) -> Response<Full<Bytes>> {
    match interceptor.and_then(|i| i.describe_ui()) {
        Some(ui) => json_response(StatusCode::OK, &ui),
        None => empty_response(StatusCode::NO_CONTENT),
    }
}
