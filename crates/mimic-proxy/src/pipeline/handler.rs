//! Per-request orchestration.
//!
//! Resolve the workspace, give the interceptor first refusal, match the
//! service's rules, then mock, proxy or report that nothing matched. Every
//! outcome is masked, recorded and broadcast through the workspace's store.

use super::client::HttpClient;
use super::forwarding::{error_response, forward_request};
use super::masking::Masker;
use super::mock::mock_response;
use super::route::{self, Route};
use crate::interceptor::{InterceptedResponse, RequestInterceptor};
use crate::matcher::find_match;
use crate::metrics;
use crate::model::{RequestContext, ResolutionKind, RuleAction, TrafficEntry, TrafficResponse};
use crate::store::{Store, StoreError, WorkspaceRegistry};
use crate::template::Renderer;
use chrono::Utc;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, Method, Response, Uri};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

pub const NO_MATCH_STATUS: u16 = 504;
pub const NO_MATCH_BODY: &str = "No matching rule found";

/// A fully buffered inbound request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
}

impl InboundRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }
}

/// What the client receives plus what gets recorded.
#[derive(Debug)]
pub struct Exchange {
    pub response: Response<Full<Bytes>>,
    pub recorded: TrafficResponse,
}

impl Exchange {
    /// JSON `{"error": message}` response.
    pub fn error(status: u16, message: &str) -> Self {
        let response = error_response(status, message);
        let recorded = TrafficResponse {
            status_code: response.status().as_u16(),
            headers: BTreeMap::from([("Content-Type".into(), "application/json".into())]),
            body: serde_json::json!({ "error": message }).to_string(),
            delay_ms: 0,
        };
        Self { response, recorded }
    }

    /// Plain text response.
    pub fn text(status: u16, body: &str) -> Self {
        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() =
            hyper::StatusCode::from_u16(status).unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        let recorded = TrafficResponse {
            status_code: response.status().as_u16(),
            headers: BTreeMap::from([(
                "Content-Type".into(),
                "text/plain; charset=utf-8".into(),
            )]),
            body: body.to_string(),
            delay_ms: 0,
        };
        Self { response, recorded }
    }

    fn intercepted(answer: InterceptedResponse, delay_ms: u64) -> Self {
        let mut exchange = Self::text(answer.status, &answer.body);
        exchange.response.headers_mut().remove(CONTENT_TYPE);
        exchange.recorded.headers.clear();
        let rejected = super::headers::insert_all(
            exchange.response.headers_mut(),
            answer.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        for name in rejected {
            warn!(header = %name, "Skipping invalid interceptor header");
        }
        exchange.recorded.headers = answer.headers;
        exchange.recorded.delay_ms = delay_ms;
        exchange
    }
}

/// Shared state for handling proxied requests
pub struct Pipeline {
    registry: Arc<WorkspaceRegistry>,
    renderer: Renderer,
    client: HttpClient,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    localhost_alias: Option<String>,
}

impl Pipeline {
    pub fn new(registry: Arc<WorkspaceRegistry>, renderer: Renderer, client: HttpClient) -> Self {
        Self {
            registry,
            renderer,
            client,
            interceptor: None,
            localhost_alias: None,
        }
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn with_localhost_alias(mut self, alias: Option<String>) -> Self {
        self.localhost_alias = alias.filter(|a| !a.is_empty());
        self
    }

    pub fn registry(&self) -> &Arc<WorkspaceRegistry> {
        &self.registry
    }

    pub fn interceptor(&self) -> Option<&Arc<dyn RequestInterceptor>> {
        self.interceptor.as_ref()
    }

    /// Handle one request end to end.
    pub async fn handle(&self, req: InboundRequest) -> Response<Full<Bytes>> {
        let start = Instant::now();
        let timestamp = Utc::now();
        let route = route::resolve(req.uri.path());

        debug!(workspace = %route.workspace, path = %route.path, "Received request: {} {}", req.method, req.uri);

        let store = match self.registry.get_store(&route.workspace) {
            Ok(store) => store,
            Err(StoreError::NotFound(_)) | Err(StoreError::Validation(_)) => {
                return Exchange::text(404, &format!("Workspace {} not found", route.workspace))
                    .response;
            }
            Err(e) => {
                error!(workspace = %route.workspace, "Failed to open workspace: {}", e);
                return error_response(500, "Failed to open workspace");
            }
        };

        let ctx = RequestContext::new(
            req.method.as_str(),
            &route.path,
            req.uri.query(),
            &req.headers,
            &req.body,
        );

        let (exchange, kind, matched_rule) = self.resolve(&store, &req, &route, &ctx, start).await;

        let entry = self.traffic_entry(&route, &ctx, timestamp, &exchange, kind, matched_rule);
        if let Err(e) = store.add_traffic(entry) {
            warn!(workspace = %route.workspace, "Failed to persist traffic entry: {}", e);
        }

        metrics::record_request(kind.as_str(), start.elapsed().as_secs_f64() * 1000.0);
        exchange.response
    }

    async fn resolve(
        &self,
        store: &Store,
        req: &InboundRequest,
        route: &Route,
        ctx: &RequestContext,
        start: Instant,
    ) -> (Exchange, ResolutionKind, Option<usize>) {
        if let Some(interceptor) = &self.interceptor {
            match interceptor.attempt_handle(ctx).await {
                Ok(Some(answer)) => {
                    let delay_ms = start.elapsed().as_millis() as u64;
                    return (
                        Exchange::intercepted(answer, delay_ms),
                        ResolutionKind::Plugin,
                        None,
                    );
                }
                Ok(None) => {}
                Err(e) => warn!(path = %route.path, "Interceptor error, continuing: {}", e),
            }
        }

        let rules = store.get_rules(&route.service);

        let matched =
            find_match(&rules, ctx).and_then(|(index, rule)| rule.action().map(|a| (index, a)));

        match matched {
            Some((index, RuleAction::Proxy { target, headers })) => {
                debug!(service = %route.service, rule_index = index, "Proxying");
                let exchange = forward_request(
                    &self.client,
                    &self.renderer,
                    self.localhost_alias.as_deref(),
                    target,
                    headers,
                    req,
                    route,
                    ctx,
                )
                .await;
                (exchange, ResolutionKind::Proxy, Some(index))
            }
            Some((index, RuleAction::Mock { response })) => {
                debug!(service = %route.service, rule_index = index, "Mocking");
                let exchange = mock_response(&self.renderer, response, ctx).await;
                (exchange, ResolutionKind::Mock, Some(index))
            }
            None => {
                debug!(service = %route.service, path = %route.path, "No matching rule");
                (
                    Exchange::text(NO_MATCH_STATUS, NO_MATCH_BODY),
                    ResolutionKind::Timeout,
                    None,
                )
            }
        }
    }

    fn traffic_entry(
        &self,
        route: &Route,
        ctx: &RequestContext,
        timestamp: chrono::DateTime<Utc>,
        exchange: &Exchange,
        kind: ResolutionKind,
        matched_rule: Option<usize>,
    ) -> TrafficEntry {
        let masker = Masker::new(self.renderer.values().all());
        let mut headers = ctx.headers.clone();
        masker.mask_headers(&mut headers);

        TrafficEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            service: route.service.clone(),
            method: ctx.method.clone(),
            path: ctx.path.clone(),
            query: ctx.query.clone(),
            headers,
            body: masker.mask_body(ctx.body.clone()),
            response: exchange.recorded.clone(),
            matched_rule,
            rule_type: kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionPoolConfig, ValueStore};
    use crate::interceptor::{InterceptorError, UiDescriptor};
    use crate::model::Rule;
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir, values: BTreeMap<String, String>) -> Pipeline {
        let registry = Arc::new(WorkspaceRegistry::new(dir.path(), 100, 16).unwrap());
        let renderer = Renderer::new(Arc::new(ValueStore::new(values)));
        let client = create_client();
        Pipeline::new(registry, renderer, client)
    }

    fn create_client() -> HttpClient {
        crate::pipeline::create_http_client(&ConnectionPoolConfig::default())
    }

    fn request(method: Method, uri: &str) -> InboundRequest {
        InboundRequest::new(method, uri.parse().unwrap())
    }

    async fn body_of(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_mock_rule_answers_and_is_recorded() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, BTreeMap::new());
        let store = pipeline.registry().get_store("default").unwrap();
        store
            .add_rule("users", Rule::mock("GET", "/users/*", "[201]\nbody:\nhello"), None)
            .unwrap();

        let response = pipeline.handle(request(Method::GET, "/users/7")).await;
        assert_eq!(response.status(), 201);
        assert_eq!(body_of(response).await, "hello");

        let traffic = store.get_traffic(10, None);
        assert_eq!(traffic.len(), 1);
        assert_eq!(traffic[0].rule_type, ResolutionKind::Mock);
        assert_eq!(traffic[0].service, "users");
        assert_eq!(traffic[0].matched_rule, Some(0));
        assert_eq!(traffic[0].response.status_code, 201);
    }

    #[tokio::test]
    async fn test_no_match_is_gateway_timeout() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, BTreeMap::new());

        let response = pipeline.handle(request(Method::GET, "/orders/1")).await;
        assert_eq!(response.status(), 504);
        assert_eq!(body_of(response).await, NO_MATCH_BODY);

        let store = pipeline.registry().get_store("default").unwrap();
        let traffic = store.get_traffic(10, Some("orders"));
        assert_eq!(traffic.len(), 1);
        assert_eq!(traffic[0].rule_type, ResolutionKind::Timeout);
        assert!(traffic[0].matched_rule.is_none());
    }

    #[tokio::test]
    async fn test_unknown_workspace_is_not_found() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, BTreeMap::new());

        let response = pipeline.handle(request(Method::GET, "/w/ghost/users")).await;
        assert_eq!(response.status(), 404);
        assert_eq!(body_of(response).await, "Workspace ghost not found");
    }

    #[tokio::test]
    async fn test_named_workspace_uses_logical_path() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, BTreeMap::new());
        pipeline.registry().create("team").unwrap();
        let store = pipeline.registry().get_store("team").unwrap();
        store
            .add_rule("users", Rule::mock("GET", "/users", "body:\nteam"), None)
            .unwrap();

        let response = pipeline.handle(request(Method::GET, "/w/team/users")).await;
        assert_eq!(response.status(), 200);
        assert_eq!(body_of(response).await, "team");
        assert_eq!(store.get_traffic(10, None)[0].path, "/users");
    }

    #[tokio::test]
    async fn test_rule_without_action_is_skipped() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, BTreeMap::new());
        let store = pipeline.registry().get_store("default").unwrap();
        std::fs::write(
            store.dir().join(crate::store::RULES_DIR).join("users.yaml"),
            "rules:\n  - match:\n      path: /users\n",
        )
        .unwrap();
        store
            .reload_rule_file(&store.dir().join(crate::store::RULES_DIR).join("users.yaml"))
            .unwrap();

        let response = pipeline.handle(request(Method::GET, "/users")).await;
        assert_eq!(response.status(), 504);

        std::fs::write(
            store.dir().join(crate::store::RULES_DIR).join("users.yaml"),
            "rules:\n  - match:\n      method: GET\n      path: /users\n  - match:\n      method: GET\n      path: /users\n    response: \"[201]\"\n",
        )
        .unwrap();
        store
            .reload_rule_file(&store.dir().join(crate::store::RULES_DIR).join("users.yaml"))
            .unwrap();

        let response = pipeline.handle(request(Method::GET, "/users")).await;
        assert_eq!(response.status(), 201);
        assert_eq!(store.get_traffic(1, None)[0].matched_rule, Some(1));
    }

    #[tokio::test]
    async fn test_recorded_request_is_masked() {
        let dir = TempDir::new().unwrap();
        let values = BTreeMap::from([("API_KEY".to_string(), "s3cr3t".to_string())]);
        let pipeline = pipeline(&dir, values);

        let mut req = request(Method::POST, "/billing/charge");
        req.headers
            .insert("authorization", HeaderValue::from_static("Bearer s3cr3t"));
        req.body = Bytes::from(r#"{"key":"s3cr3t"}"#);
        pipeline.handle(req).await;

        let store = pipeline.registry().get_store("default").unwrap();
        let entry = &store.get_traffic(1, None)[0];
        assert_eq!(entry.headers["Authorization"], vec!["Bearer API_KEY"]);
        assert_eq!(entry.body, Some(serde_json::json!({"key": "API_KEY"})));
    }

    struct Teapot;

    #[async_trait]
    impl RequestInterceptor for Teapot {
        async fn attempt_handle(
            &self,
            ctx: &RequestContext,
        ) -> Result<Option<InterceptedResponse>, InterceptorError> {
            if ctx.path == "/tea" {
                return Ok(Some(InterceptedResponse {
                    status: 418,
                    headers: BTreeMap::from([("X-Pot".to_string(), "short".to_string())]),
                    body: "teapot".into(),
                }));
            }
            if ctx.path == "/broken" {
                return Err(InterceptorError::Failed {
                    name: "teapot".into(),
                    message: "boom".into(),
                });
            }
            Ok(None)
        }

        fn describe_ui(&self) -> Option<UiDescriptor> {
            None
        }
    }

    #[tokio::test]
    async fn test_interceptor_answer_short_circuits() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, BTreeMap::new()).with_interceptor(Arc::new(Teapot));

        let response = pipeline.handle(request(Method::GET, "/tea")).await;
        assert_eq!(response.status(), 418);
        assert_eq!(response.headers().get("x-pot").unwrap(), "short");
        assert_eq!(body_of(response).await, "teapot");

        let store = pipeline.registry().get_store("default").unwrap();
        let entry = &store.get_traffic(1, None)[0];
        assert_eq!(entry.rule_type, ResolutionKind::Plugin);
        assert_eq!(entry.response.headers["X-Pot"], "short");
    }

    #[tokio::test]
    async fn test_interceptor_error_falls_through_to_rules() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, BTreeMap::new()).with_interceptor(Arc::new(Teapot));

        let response = pipeline.handle(request(Method::GET, "/broken")).await;
        assert_eq!(response.status(), 504);
    }

    #[tokio::test]
    async fn test_subscriber_sees_handled_request() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, BTreeMap::new());
        let store = pipeline.registry().get_store("default").unwrap();
        let mut subscription = store.subscribe();

        pipeline.handle(request(Method::DELETE, "/users/1")).await;
        let entry = subscription.receiver.recv().await.unwrap();
        assert_eq!(entry.method, "DELETE");
    }
}
