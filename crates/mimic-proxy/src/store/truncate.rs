//! Content-type driven body truncation for recorded traffic.

use crate::model::TrafficEntry;
use serde_json::Value;

/// Cap for bodies whose content type is text-like.
pub const MAX_TEXT_BODY_BYTES: usize = 2 * 1024 * 1024;
/// Cap for everything else.
pub const MAX_BINARY_BODY_BYTES: usize = 1024;
pub const TRUNCATION_MARKER: &str = "...[truncated]";

const TEXT_CONTENT_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/x-yaml",
    "application/yaml",
    "text/",
    "application/javascript",
    "application/x-www-form-urlencoded",
    "application/graphql",
];

/// Substring, case-insensitive. A missing content type counts as text.
pub fn is_text_content(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) if ct.is_empty() => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            TEXT_CONTENT_TYPES.iter().any(|t| ct.contains(t))
        }
    }
}

fn cap_for(content_type: Option<&str>) -> usize {
    if is_text_content(content_type) {
        MAX_TEXT_BODY_BYTES
    } else {
        MAX_BINARY_BODY_BYTES
    }
}

/// Cut `body` to `cap` bytes (on a char boundary) and append the marker.
fn cut(body: &str, cap: usize) -> Option<String> {
    if body.len() <= cap {
        return None;
    }
    let mut end = cap;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    Some(format!("{}{TRUNCATION_MARKER}", &body[..end]))
}

pub fn truncate_text(body: &str, content_type: Option<&str>) -> Option<String> {
    cut(body, cap_for(content_type))
}

/// Structured JSON bodies always use the text cap; an oversized body is
/// replaced by its truncated serialization.
pub fn truncate_value(body: &Value, content_type: Option<&str>) -> Option<Value> {
    match body {
        Value::String(s) => truncate_text(s, content_type).map(Value::String),
        Value::Object(_) | Value::Array(_) => {
            cut(&body.to_string(), MAX_TEXT_BODY_BYTES).map(Value::String)
        }
        _ => None,
    }
}

/// Apply both caps to an entry in place.
pub fn truncate_entry(entry: &mut TrafficEntry) {
    let request_type = entry.request_content_type().map(str::to_string);
    if let Some(body) = &entry.body {
        if let Some(truncated) = truncate_value(body, request_type.as_deref()) {
            entry.body = Some(truncated);
        }
    }

    let response_type = entry.response_content_type().map(str::to_string);
    if let Some(truncated) = truncate_text(&entry.response.body, response_type.as_deref()) {
        entry.response.body = truncated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResolutionKind, TrafficResponse};
    use std::collections::BTreeMap;

    #[test]
    fn test_text_content_detection() {
        assert!(is_text_content(None));
        assert!(is_text_content(Some("")));
        assert!(is_text_content(Some("Application/JSON; charset=utf-8")));
        assert!(is_text_content(Some("text/html")));
        assert!(!is_text_content(Some("application/vnd.api+json")));
        assert!(is_text_content(Some("application/graphql")));
        assert!(!is_text_content(Some("image/png")));
        assert!(!is_text_content(Some("application/octet-stream")));
    }

    #[test]
    fn test_text_body_at_cap_untouched() {
        let body = "a".repeat(MAX_TEXT_BODY_BYTES);
        assert!(truncate_text(&body, Some("text/plain")).is_none());
    }

    #[test]
    fn test_text_body_over_cap_truncated() {
        let body = "a".repeat(MAX_TEXT_BODY_BYTES + 1);
        let truncated = truncate_text(&body, Some("text/plain")).unwrap();
        assert_eq!(truncated.len(), MAX_TEXT_BODY_BYTES + TRUNCATION_MARKER.len());
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        assert!(truncated[..MAX_TEXT_BODY_BYTES].bytes().all(|b| b == b'a'));
    }

    #[test]
    fn test_binary_cap() {
        let body = "x".repeat(MAX_BINARY_BODY_BYTES + 10);
        let truncated = truncate_text(&body, Some("image/png")).unwrap();
        assert_eq!(truncated.len(), MAX_BINARY_BODY_BYTES + TRUNCATION_MARKER.len());
        assert!(truncate_text(&"x".repeat(MAX_BINARY_BODY_BYTES), Some("image/png")).is_none());
    }

    #[test]
    fn test_cut_respects_char_boundary() {
        let body = "é".repeat(600);
        let truncated = truncate_text(&body, Some("application/pdf")).unwrap();
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        assert_eq!(truncated.len() - TRUNCATION_MARKER.len(), MAX_BINARY_BODY_BYTES);
    }

    #[test]
    fn test_json_value_uses_text_cap() {
        let small = serde_json::json!({"a": "x".repeat(5000)});
        assert!(truncate_value(&small, Some("image/png")).is_none());

        let big = serde_json::json!({"a": "x".repeat(MAX_TEXT_BODY_BYTES)});
        let truncated = truncate_value(&big, None).unwrap();
        assert!(truncated.as_str().unwrap().ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_entry_uses_each_side_content_type() {
        let mut entry = TrafficEntry {
            id: "1".into(),
            timestamp: chrono::Utc::now(),
            service: "svc".into(),
            method: "POST".into(),
            path: "/svc".into(),
            query: BTreeMap::new(),
            headers: BTreeMap::from([(
                "Content-Type".to_string(),
                vec!["application/octet-stream".to_string()],
            )]),
            body: Some(Value::String("b".repeat(2000))),
            response: TrafficResponse {
                status_code: 200,
                headers: BTreeMap::from([(
                    "Content-Type".to_string(),
                    "application/json".to_string(),
                )]),
                body: "r".repeat(2000),
                delay_ms: 0,
            },
            matched_rule: None,
            rule_type: ResolutionKind::Proxy,
        };
        truncate_entry(&mut entry);

        let request_body = entry.body.as_ref().and_then(Value::as_str).unwrap();
        assert!(request_body.ends_with(TRUNCATION_MARKER));
        assert_eq!(entry.response.body.len(), 2000);
    }
}
