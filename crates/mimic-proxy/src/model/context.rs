//! Per-request context consumed by the matcher and the template renderer.

use hyper::HeaderMap;
use serde_json::Value;
use std::collections::BTreeMap;

/// Ephemeral view of one inbound request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub method: String,
    /// Logical path, workspace prefix already removed.
    pub path: String,
    pub path_segments: Vec<String>,
    pub query: BTreeMap<String, Vec<String>>,
    pub headers: BTreeMap<String, Vec<String>>,
    /// Parsed JSON when the body is valid JSON, a string otherwise, `None` when empty.
    pub body: Option<Value>,
}

impl RequestContext {
    /// Build a context from decoded request parts.
    pub fn new(
        method: &str,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Self {
        let mut header_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in headers.iter() {
            if let Ok(v) = value.to_str() {
                header_map
                    .entry(title_case(name.as_str()))
                    .or_default()
                    .push(v.to_string());
            }
        }

        Self {
            method: method.to_string(),
            path: path.to_string(),
            path_segments: split_segments(path),
            query: parse_query(query),
            headers: header_map,
            body: parse_body(body),
        }
    }

    /// First value of a header, case-insensitive name lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Zero-based path segment.
    pub fn path_param(&self, index: usize) -> Option<&str> {
        self.path_segments.get(index).map(String::as_str)
    }

    /// Body as text: strings verbatim, JSON re-serialized.
    pub fn body_text(&self) -> Option<String> {
        match &self.body {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Turn hyper's lowercase header names into `Content-Type` form.
pub(crate) fn title_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

fn split_segments(path: &str) -> Vec<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').map(str::to_string).collect()
}

/// Multi-valued query parsing; keys and values are percent-decoded.
pub(crate) fn parse_query(query: Option<&str>) -> BTreeMap<String, Vec<String>> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let Some(query) = query else {
        return params;
    };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params
            .entry(decode_component(key))
            .or_default()
            .push(decode_component(value));
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

fn parse_body(body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(json) => Some(json),
        Err(_) => Some(Value::String(String::from_utf8_lossy(body).into_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_context_from_parts() {
        let ctx = RequestContext::new(
            "POST",
            "/users/42/posts",
            Some("page=2&tag=a&tag=b&q=hello%20world"),
            &headers(&[("content-type", "application/json"), ("x-multi", "1"), ("x-multi", "2")]),
            br#"{"name":"bob"}"#,
        );

        assert_eq!(ctx.path_segments, vec!["users", "42", "posts"]);
        assert_eq!(ctx.query_param("page"), Some("2"));
        assert_eq!(ctx.query["tag"], vec!["a", "b"]);
        assert_eq!(ctx.query_param("q"), Some("hello world"));
        assert_eq!(ctx.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(ctx.headers["X-Multi"], vec!["1", "2"]);
        assert_eq!(ctx.body, Some(serde_json::json!({"name": "bob"})));
    }

    #[test]
    fn test_body_falls_back_to_string() {
        let ctx = RequestContext::new("POST", "/", None, &HeaderMap::new(), b"plain text");
        assert_eq!(ctx.body, Some(Value::String("plain text".into())));
        assert_eq!(ctx.body_text().as_deref(), Some("plain text"));
    }

    #[test]
    fn test_empty_body_is_none() {
        let ctx = RequestContext::new("GET", "/", None, &HeaderMap::new(), b"");
        assert!(ctx.body.is_none());
        assert!(ctx.path_segments.is_empty());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("content-type"), "Content-Type");
        assert_eq!(title_case("x-request-id"), "X-Request-Id");
        assert_eq!(title_case("accept"), "Accept");
    }
}
