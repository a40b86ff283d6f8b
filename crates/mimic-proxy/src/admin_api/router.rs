//! Route dispatch for the admin API.

use crate::admin_api::handlers::{rules, system, traffic, workspaces};
use crate::admin_api::server::AdminState;
use crate::admin_api::types::{not_found, store_error_response};
use crate::pipeline::{ResponseBody, ResponseExt};
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

/// Routes under `/api/w/:ws`
#[derive(Debug, PartialEq, Eq)]
enum WorkspaceRoute {
    /// GET /rules
    AllRules,
    /// GET/POST/DELETE /rules/:service
    ServiceRules(String),
    /// GET /rules/:service/raw
    RawRules(String),
    /// PUT/DELETE /rules/:service/:index
    RuleByIndex(String, usize),
    /// POST /rules/:service/:index/move
    MoveRule(String, usize),
    /// GET /traffic
    Traffic,
    /// GET /traffic/stream
    TrafficStream,
    /// GET /traffic/:id
    TrafficById(String),
    /// POST /traffic/:id/rule
    RuleFromTraffic(String),
    /// GET /stats
    Stats,
}

impl WorkspaceRoute {
    /// Parse route from path segments after `/api/w/:ws`
    fn parse(segments: &[String]) -> Option<Self> {
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        match segments.as_slice() {
            ["rules"] => Some(Self::AllRules),
            ["rules", service] => Some(Self::ServiceRules(service.to_string())),
            ["rules", service, "raw"] => Some(Self::RawRules(service.to_string())),
            ["rules", service, index] => index
                .parse()
                .ok()
                .map(|i| Self::RuleByIndex(service.to_string(), i)),
            ["rules", service, index, "move"] => index
                .parse()
                .ok()
                .map(|i| Self::MoveRule(service.to_string(), i)),
            ["traffic"] => Some(Self::Traffic),
            ["traffic", "stream"] => Some(Self::TrafficStream),
            ["traffic", id] => Some(Self::TrafficById(id.to_string())),
            ["traffic", id, "rule"] => Some(Self::RuleFromTraffic(id.to_string())),
            ["stats"] => Some(Self::Stats),
            _ => None,
        }
    }
}

/// Split a path into percent-decoded, non-empty segments.
fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect()
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    state: Arc<AdminState>,
) -> Result<Response<ResponseBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Admin API: {} {}", method, path);

    let segments = segments(&path);
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    let response = match (&method, segments.as_slice()) {
        (&Method::GET, ["health"]) => system::handle_health(),
        (&Method::GET, ["metrics"]) => system::handle_metrics(),

        (&Method::GET, ["api", "workspaces"]) => workspaces::handle_list(&state.registry),
        (&Method::POST, ["api", "workspaces"]) => {
            workspaces::handle_create(req, &state.registry).await
        }
        (&Method::DELETE, ["api", "workspaces", name]) => {
            workspaces::handle_disable(name, &state.registry)
        }
        (&Method::POST, ["api", "workspaces", name, "enable"]) => {
            workspaces::handle_enable(name, &state.registry)
        }
        (&Method::POST, ["api", "workspaces", name, "duplicate"]) => {
            let name = name.to_string();
            workspaces::handle_duplicate(&name, req, &state.registry).await
        }

        (&Method::GET, ["api", "config"]) => system::handle_list_values(&state.values),
        (&Method::PUT, ["api", "config", key]) => {
            let key = key.to_string();
            system::handle_set_value(&key, req, &state.values).await
        }
        (&Method::DELETE, ["api", "config", key]) => {
            system::handle_delete_value(key, &state.values)
        }

        (&Method::GET, ["api", "interceptor", "ui"]) => {
            system::handle_interceptor_ui(state.interceptor.as_ref())
        }

        (_, ["api", "w", workspace, rest @ ..]) => {
            let workspace = workspace.to_string();
            let rest: Vec<String> = rest.iter().map(|s| s.to_string()).collect();
            return Ok(route_workspace(&method, &workspace, &rest, req, &state).await);
        }

        _ => not_found(),
    };

    Ok(response.into_boxed())
}

/// Route workspace-scoped requests
async fn route_workspace(
    method: &Method,
    workspace: &str,
    segments: &[String],
    req: Request<Incoming>,
    state: &AdminState,
) -> Response<ResponseBody> {
    let Some(route) = WorkspaceRoute::parse(segments) else {
        return not_found().into_boxed();
    };

    let store = match state.registry.get_store(workspace) {
        Ok(store) => store,
        Err(e) => return store_error_response(&e).into_boxed(),
    };

    let query = req.uri().query().map(str::to_string);

    let response = match (method, route) {
        (&Method::GET, WorkspaceRoute::AllRules) => rules::handle_get_all(&store),
        (&Method::GET, WorkspaceRoute::ServiceRules(service)) => {
            rules::handle_get_service(&store, &service)
        }
        (&Method::POST, WorkspaceRoute::ServiceRules(service)) => {
            rules::handle_add(&store, &service, req).await
        }
        (&Method::DELETE, WorkspaceRoute::ServiceRules(service)) => {
            rules::handle_disable_service(&store, &service)
        }
        (&Method::GET, WorkspaceRoute::RawRules(service)) => rules::handle_get_raw(&store, &service),
        (&Method::PUT, WorkspaceRoute::RuleByIndex(service, index)) => {
            rules::handle_update(&store, &service, index, req).await
        }
        (&Method::DELETE, WorkspaceRoute::RuleByIndex(service, index)) => {
            rules::handle_delete(&store, &service, index)
        }
        (&Method::POST, WorkspaceRoute::MoveRule(service, index)) => {
            rules::handle_move(&store, &service, index, req).await
        }

        (&Method::GET, WorkspaceRoute::Traffic) => traffic::handle_list(&store, query.as_deref()),
        (&Method::GET, WorkspaceRoute::TrafficStream) => return traffic::handle_stream(store),
        (&Method::GET, WorkspaceRoute::TrafficById(id)) => traffic::handle_get(&store, &id),
        (&Method::POST, WorkspaceRoute::RuleFromTraffic(id)) => {
            traffic::handle_create_rule(&store, &id)
        }

        (&Method::GET, WorkspaceRoute::Stats) => system::handle_stats(&store),

        _ => not_found(),
    };

    response.into_boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str) -> Option<WorkspaceRoute> {
        WorkspaceRoute::parse(&segments(path))
    }

    #[test]
    fn test_workspace_route_parse() {
        assert_eq!(parse("rules"), Some(WorkspaceRoute::AllRules));
        assert_eq!(
            parse("rules/users"),
            Some(WorkspaceRoute::ServiceRules("users".into()))
        );
        assert_eq!(
            parse("rules/users/raw"),
            Some(WorkspaceRoute::RawRules("users".into()))
        );
        assert_eq!(
            parse("rules/users/3"),
            Some(WorkspaceRoute::RuleByIndex("users".into(), 3))
        );
        assert_eq!(
            parse("rules/users/0/move"),
            Some(WorkspaceRoute::MoveRule("users".into(), 0))
        );
        assert_eq!(parse("traffic"), Some(WorkspaceRoute::Traffic));
        assert_eq!(parse("traffic/stream"), Some(WorkspaceRoute::TrafficStream));
        assert_eq!(
            parse("traffic/abc-123"),
            Some(WorkspaceRoute::TrafficById("abc-123".into()))
        );
        assert_eq!(
            parse("traffic/abc-123/rule"),
            Some(WorkspaceRoute::RuleFromTraffic("abc-123".into()))
        );
        assert_eq!(parse("stats"), Some(WorkspaceRoute::Stats));

        // Invalid routes
        assert!(parse("rules/users/first").is_none());
        assert!(parse("rules/users/x/move").is_none());
        assert!(parse("unknown").is_none());
    }

    #[test]
    fn test_segments_are_decoded() {
        assert_eq!(segments("/api//w/my%20ws/"), vec!["api", "w", "my ws"]);
    }
}
