//! Workspace lifecycle handlers.

use crate::admin_api::types::{
    json_response, parse_json_body, store_error_response, WorkspaceNameRequest,
};
use crate::store::WorkspaceRegistry;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use tracing::info;

/// GET /api/workspaces
pub fn handle_list(registry: &WorkspaceRegistry) -> Response<Full<Bytes>> {
    match registry.list() {
        Ok(workspaces) => json_response(StatusCode::OK, &workspaces),
        Err(e) => store_error_response(&e),
    }
}

/// POST /api/workspaces
pub async fn handle_create(
    req: Request<Incoming>,
    registry: &WorkspaceRegistry,
) -> Response<Full<Bytes>> {
    let body: WorkspaceNameRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match registry.create(&body.name) {
        Ok(summary) => {
            info!(workspace = %summary.name, "Created workspace");
            json_response(StatusCode::CREATED, &summary)
        }
        Err(e) => store_error_response(&e),
    }
}

/// DELETE /api/workspaces/:name
pub fn handle_disable(name: &str, registry: &WorkspaceRegistry) -> Response<Full<Bytes>> {
    match registry.disable(name) {
        Ok(()) => {
            info!(workspace = %name, "Disabled workspace");
            json_response(StatusCode::OK, &serde_json::json!({ "disabled": name }))
        }
        Err(e) => store_error_response(&e),
    }
}

/// POST /api/workspaces/:name/enable
pub fn handle_enable(name: &str, registry: &WorkspaceRegistry) -> Response<Full<Bytes>> {
    match registry.enable(name) {
        Ok(()) => {
            info!(workspace = %name, "Enabled workspace");
            json_response(StatusCode::OK, &serde_json::json!({ "enabled": name }))
        }
        Err(e) => store_error_response(&e),
    }
}

/// POST /api/workspaces/:name/duplicate
pub async fn handle_duplicate(
    source: &str,
    req: Request<Incoming>,
    registry: &WorkspaceRegistry,
) -> Response<Full<Bytes>> {
    let body: WorkspaceNameRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match registry.duplicate(source, &body.name) {
        Ok(summary) => {
            info!(source = %source, workspace = %summary.name, "Duplicated workspace");
            json_response(StatusCode::CREATED, &summary)
        }
        Err(e) => store_error_response(&e),
    }
}
