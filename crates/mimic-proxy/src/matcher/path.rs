//! Path pattern forms.

use super::regex_cache;
use super::MatchError;
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| Regex::new(r"\{[^}]+\}").expect("Invalid placeholder regex"))
}

/// A compiled rule path.
///
/// Forms are checked in priority order: `/**` suffix, `/*` segment
/// wildcard, `{name}` placeholders, then plain equality.
#[derive(Debug, Clone)]
pub enum PathPattern {
    Any,
    Exact(String),
    /// `/api/**`: the stripped prefix itself or anything below it.
    Prefix(String),
    /// `/users/*` or `/users/{id}`: anchored, one segment per wildcard.
    Segments(Regex),
}

impl PathPattern {
    pub fn compile(pattern: &str) -> Result<Self, MatchError> {
        if pattern.is_empty() {
            return Ok(PathPattern::Any);
        }
        if let Some(prefix) = pattern.strip_suffix("/**") {
            return Ok(PathPattern::Prefix(prefix.to_string()));
        }
        if pattern.contains("/*") && !pattern.contains("/**") {
            let body = pattern
                .split("/*")
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join("/[^/]+");
            return regex_cache::get(&format!("^{body}$")).map(PathPattern::Segments);
        }
        if pattern.contains('{') && pattern.contains('}') {
            let mut body = String::with_capacity(pattern.len() + 16);
            let mut last = 0;
            for placeholder in placeholder_regex().find_iter(pattern) {
                body.push_str(&regex::escape(&pattern[last..placeholder.start()]));
                body.push_str("[^/]+");
                last = placeholder.end();
            }
            body.push_str(&regex::escape(&pattern[last..]));
            return regex_cache::get(&format!("^{body}$")).map(PathPattern::Segments);
        }
        Ok(PathPattern::Exact(pattern.to_string()))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Any => true,
            PathPattern::Exact(exact) => exact == path,
            PathPattern::Prefix(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            PathPattern::Segments(regex) => regex.is_match(path),
        }
    }

    /// Compile and evaluate in one step. Equality always matches.
    pub fn matches_str(pattern: &str, path: &str) -> bool {
        if pattern.is_empty() || pattern == path {
            return true;
        }
        match Self::compile(pattern) {
            Ok(compiled) => compiled.matches(path),
            Err(e) => {
                warn!("Path pattern '{}' ignored: {}", pattern, e);
                false
            }
        }
    }
}
