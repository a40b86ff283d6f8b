//! Workspace and service resolution from the request path.
//!
//! `/w/<workspace>/<rest>` addresses a named workspace with logical path
//! `/<rest>`; every other path belongs to `default`. The service is the first
//! segment of the logical path.

use crate::store::DEFAULT_WORKSPACE;

const WORKSPACE_PREFIX: &str = "/w/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub workspace: String,
    pub path: String,
    pub service: String,
}

pub fn resolve(path: &str) -> Route {
    let (workspace, logical) = match path.strip_prefix(WORKSPACE_PREFIX) {
        Some(rest) => {
            let (name, tail) = match rest.split_once('/') {
                Some((name, tail)) => (name, Some(tail)),
                None => (rest, None),
            };
            if name.is_empty() {
                (DEFAULT_WORKSPACE, path.to_string())
            } else {
                let logical = match tail {
                    Some(tail) => format!("/{tail}"),
                    None => "/".to_string(),
                };
                (name, logical)
            }
        }
        None => (DEFAULT_WORKSPACE, path.to_string()),
    };

    Route {
        workspace: workspace.to_string(),
        service: service_of(&logical).to_string(),
        path: logical,
    }
}

/// First non-empty segment of `path`, or `""`.
pub fn service_of(path: &str) -> &str {
    path.trim_start_matches('/').split('/').next().unwrap_or("")
}

/// `path` without its leading `/<service>` segment; `""` when nothing is left.
pub fn strip_service(path: &str, service: &str) -> String {
    if service.is_empty() {
        return path.to_string();
    }
    let prefix = format!("/{service}");
    match path.strip_prefix(&prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.to_string(),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_workspace() {
        let route = resolve("/users/42");
        assert_eq!(route.workspace, "default");
        assert_eq!(route.path, "/users/42");
        assert_eq!(route.service, "users");
    }

    #[test]
    fn test_named_workspace() {
        let route = resolve("/w/team/orders/7");
        assert_eq!(route.workspace, "team");
        assert_eq!(route.path, "/orders/7");
        assert_eq!(route.service, "orders");
    }

    #[test]
    fn test_workspace_root() {
        let route = resolve("/w/team");
        assert_eq!(route.workspace, "team");
        assert_eq!(route.path, "/");
        assert_eq!(route.service, "");
    }

    #[test]
    fn test_empty_workspace_name_falls_back_to_default() {
        let route = resolve("/w//x");
        assert_eq!(route.workspace, "default");
        assert_eq!(route.path, "/w//x");
    }

    #[test]
    fn test_strip_service() {
        assert_eq!(strip_service("/users/42", "users"), "/42");
        assert_eq!(strip_service("/users", "users"), "");
        assert_eq!(strip_service("/usersx/1", "users"), "/usersx/1");
        assert_eq!(strip_service("/", ""), "/");
    }
}
