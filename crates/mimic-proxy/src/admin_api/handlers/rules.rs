//! Rule management handlers.

use crate::admin_api::types::{
    build_response_with_headers, json_response, parse_json_body, store_error_response,
    AddRuleRequest, IndexedRule, MoveRuleRequest,
};
use crate::model::Rule;
use crate::store::Store;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use tracing::info;

/// GET /api/w/:ws/rules
pub fn handle_get_all(store: &Store) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &store.get_all_rules())
}

/// GET /api/w/:ws/rules/:service
pub fn handle_get_service(store: &Store, service: &str) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &store.get_rules(service))
}

/// GET /api/w/:ws/rules/:service/raw
pub fn handle_get_raw(store: &Store, service: &str) -> Response<Full<Bytes>> {
    match store.raw_rules(service) {
        Ok(raw) => build_response_with_headers(
            StatusCode::OK,
            [("Content-Type", "application/yaml")],
            raw,
        ),
        Err(e) => store_error_response(&e),
    }
}

/// POST /api/w/:ws/rules/:service
pub async fn handle_add(
    store: &Store,
    service: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body: AddRuleRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let rule = body.rule.clone();
    match store.add_rule(service, body.rule, body.index) {
        Ok(index) => {
            info!(workspace = %store.name(), service = %service, rule_index = index, "Added rule");
            json_response(
                StatusCode::CREATED,
                &IndexedRule {
                    service: service.to_string(),
                    index,
                    rule,
                },
            )
        }
        Err(e) => store_error_response(&e),
    }
}

/// PUT /api/w/:ws/rules/:service/:index
pub async fn handle_update(
    store: &Store,
    service: &str,
    index: usize,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let rule: Rule = match parse_json_body(req).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match store.update_rule(service, index, rule.clone()) {
        Ok(()) => {
            info!(workspace = %store.name(), service = %service, rule_index = index, "Updated rule");
            json_response(
                StatusCode::OK,
                &IndexedRule {
                    service: service.to_string(),
                    index,
                    rule,
                },
            )
        }
        Err(e) => store_error_response(&e),
    }
}

/// DELETE /api/w/:ws/rules/:service/:index
pub fn handle_delete(store: &Store, service: &str, index: usize) -> Response<Full<Bytes>> {
    match store.delete_rule(service, index) {
        Ok(rule) => {
            info!(workspace = %store.name(), service = %service, rule_index = index, "Deleted rule");
            json_response(
                StatusCode::OK,
                &IndexedRule {
                    service: service.to_string(),
                    index,
                    rule,
                },
            )
        }
        Err(e) => store_error_response(&e),
    }
}

/// POST /api/w/:ws/rules/:service/:index/move
pub async fn handle_move(
    store: &Store,
    service: &str,
    index: usize,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body: MoveRuleRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match store.move_rule(service, index, body.direction) {
        Ok(new_index) => json_response(
            StatusCode::OK,
            &serde_json::json!({ "service": service, "index": new_index }),
        ),
        Err(e) => store_error_response(&e),
    }
}

/// DELETE /api/w/:ws/rules/:service
pub fn handle_disable_service(store: &Store, service: &str) -> Response<Full<Bytes>> {
    match store.disable_service(service) {
        Ok(path) => {
            info!(workspace = %store.name(), service = %service, "Disabled service");
            json_response(
                StatusCode::OK,
                &serde_json::json!({ "service": service, "disabled_file": path.display().to_string() }),
            )
        }
        Err(e) => store_error_response(&e),
    }
}
