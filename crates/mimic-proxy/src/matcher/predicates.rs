//! Method, header, body and query predicates.

use super::regex_cache;
use super::MatchError;
use crate::model::RequestContext;
use std::collections::BTreeMap;

/// Case-insensitive membership; an empty list accepts every method.
pub fn method_matches(methods: &[String], method: &str) -> bool {
    methods.is_empty() || methods.iter().any(|m| m.eq_ignore_ascii_case(method))
}

/// Every expected header must be present and its first value must equal
/// the expected one.
pub fn headers_match(expected: &BTreeMap<String, String>, ctx: &RequestContext) -> bool {
    expected
        .iter()
        .all(|(name, value)| ctx.header(name) == Some(value.as_str()))
}

/// Unanchored regex search over the body text. An empty pattern always holds;
/// a missing body never satisfies a pattern.
pub fn body_matches(pattern: &str, ctx: &RequestContext) -> Result<bool, MatchError> {
    if pattern.is_empty() {
        return Ok(true);
    }
    let Some(body) = ctx.body_text() else {
        return Ok(false);
    };
    Ok(regex_cache::get(pattern)?.is_match(&body))
}

/// Each pattern is searched in the parameter's first value; absent
/// parameters read as the empty string.
pub fn query_matches(
    expected: &BTreeMap<String, String>,
    ctx: &RequestContext,
) -> Result<bool, MatchError> {
    for (name, pattern) in expected {
        let value = ctx.query_param(name).unwrap_or("");
        if !regex_cache::get(pattern)?.is_match(value) {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::HeaderMap;

    fn ctx_with_query(query: &str) -> RequestContext {
        RequestContext::new("GET", "/", Some(query), &HeaderMap::new(), b"")
    }

    fn expect(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_method_matching() {
        assert!(method_matches(&[], "PATCH"));
        assert!(method_matches(&["get".into(), "POST".into()], "GET"));
        assert!(!method_matches(&["GET".into()], "POST"));
    }

    #[test]
    fn test_headers_first_value_exact() {
        let mut headers = HeaderMap::new();
        headers.append("x-env", "prod".parse().unwrap());
        headers.append("x-env", "staging".parse().unwrap());
        let ctx = RequestContext::new("GET", "/", None, &headers, b"");

        assert!(headers_match(&expect(&[("X-ENV", "prod")]), &ctx));
        assert!(!headers_match(&expect(&[("x-env", "staging")]), &ctx));
        assert!(!headers_match(&expect(&[("x-missing", "v")]), &ctx));
        assert!(!headers_match(&expect(&[("x-missing", "")]), &ctx));

        let mut blank = HeaderMap::new();
        blank.insert("x-empty", "".parse().unwrap());
        let ctx = RequestContext::new("GET", "/", None, &blank, b"");
        assert!(headers_match(&expect(&[("x-empty", "")]), &ctx));
    }

    #[test]
    fn test_body_regex_on_string_and_json() {
        let text = RequestContext::new("POST", "/", None, &HeaderMap::new(), b"order id=77");
        assert!(body_matches(r"id=\d+", &text).unwrap());
        assert!(!body_matches(r"^id", &text).unwrap());

        let json = RequestContext::new("POST", "/", None, &HeaderMap::new(), br#"{"a": 1}"#);
        assert!(body_matches(r#""a":1"#, &json).unwrap());

        let empty = RequestContext::new("POST", "/", None, &HeaderMap::new(), b"");
        assert!(!body_matches("anything", &empty).unwrap());
        assert!(body_matches("", &empty).unwrap());
    }

    #[test]
    fn test_body_invalid_regex_is_error() {
        let text = RequestContext::new("POST", "/", None, &HeaderMap::new(), b"x");
        assert!(body_matches("[", &text).is_err());
    }

    #[test]
    fn test_query_absent_key_reads_empty() {
        let ctx = ctx_with_query("other=1");
        assert!(query_matches(&expect(&[("param", ".*")]), &ctx).unwrap());
        assert!(!query_matches(&expect(&[("param", "value1")]), &ctx).unwrap());
    }

    #[test]
    fn test_query_present_key_uses_first_value() {
        let ctx = ctx_with_query("param=value1&param=value2");
        assert!(query_matches(&expect(&[("param", "value1")]), &ctx).unwrap());
        assert!(!query_matches(&expect(&[("param", "^value2$")]), &ctx).unwrap());
        assert!(query_matches(&expect(&[("param", "value")]), &ctx).unwrap());
    }
}
