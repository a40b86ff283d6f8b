//! Request/response bodies and response helpers for the admin API.

use crate::model::Rule;
use crate::store::{MoveDirection, StoreError};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_TRAFFIC_LIMIT: usize = 100;

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// `POST /api/workspaces` and `.../duplicate`
#[derive(Debug, Deserialize)]
pub struct WorkspaceNameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddRuleRequest {
    pub rule: Rule,
    #[serde(default)]
    pub index: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct MoveRuleRequest {
    pub direction: MoveDirection,
}

#[derive(Debug, Deserialize)]
pub struct SetValueRequest {
    pub value: String,
}

/// A rule together with the index it currently sits at.
#[derive(Debug, Serialize)]
pub struct IndexedRule {
    pub service: String,
    pub index: usize,
    pub rule: Rule,
}

#[derive(Debug, Default, Serialize)]
pub struct ServiceStats {
    pub rules: usize,
    pub requests: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct WorkspaceStats {
    pub total_requests: usize,
    pub total_rules: usize,
    pub services: BTreeMap<String, ServiceStats>,
}

/// `limit` and `service` query parameters of the traffic listing.
#[derive(Debug, PartialEq, Eq)]
pub struct TrafficQuery {
    pub limit: usize,
    pub service: Option<String>,
}

impl TrafficQuery {
    pub fn parse(query: Option<&str>) -> Self {
        let mut params = Self {
            limit: DEFAULT_TRAFFIC_LIMIT,
            service: None,
        };
        let Some(query) = query else {
            return params;
        };
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            match key {
                "limit" => {
                    if let Ok(limit) = value.parse::<usize>() {
                        if limit > 0 {
                            params.limit = limit;
                        }
                    }
                }
                "service" if !value.is_empty() => params.service = Some(value),
                _ => {}
            }
        }
        params
    }
}

// =============================================================================
// Response helper functions
// =============================================================================

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// Build an HTTP response with headers, falling back to a bare 500 if the
/// builder rejects them.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder.body(Full::new(body.into())).unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

pub fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    build_response_with_headers(status, std::iter::empty::<(&str, &str)>(), Bytes::new())
}

/// Create an error response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: status.as_str().to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

/// NotFound is 404, Validation is 400, everything else is 500.
pub fn store_error_response(err: &StoreError) -> Response<Full<Bytes>> {
    let status = match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &err.to_string())
}

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    use http_body_util::BodyExt;
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}

/// Read and deserialize a JSON request body, answering 400 on failure.
pub async fn parse_json_body<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, Response<Full<Bytes>>> {
    let body = collect_body(req)
        .await
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e))?;
    serde_json::from_slice(&body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {e}")))
}
