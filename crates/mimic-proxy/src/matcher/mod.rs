//! Rule matching.
//!
//! Rules are evaluated in list order and the first rule whose predicates all
//! hold wins. Matching never fails: a malformed pattern only disqualifies the
//! rule that carries it.
//!
//! ## Module Structure
//!
//! - `path` - Path pattern forms (exact, `/**` prefix, `/*` wildcard, `{name}` placeholder)
//! - `predicates` - Method, header, body and query predicates
//! - `regex_cache` - Shared cache of compiled user patterns

mod path;
mod predicates;
mod regex_cache;

use crate::model::{RequestContext, Rule};
use tracing::warn;

pub use path::PathPattern;
#[allow(unused_imports)]
pub use predicates::{body_matches, headers_match, method_matches, query_matches};

/// Errors raised while evaluating a rule. Never escape the matcher.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Return the first rule matching `ctx` together with its index. Rules
/// without an action never match.
pub fn find_match<'a>(rules: &'a [Rule], ctx: &RequestContext) -> Option<(usize, &'a Rule)> {
    rules
        .iter()
        .enumerate()
        .find(|(_, rule)| rule_matches(rule, ctx))
}

/// Evaluate every predicate of one rule against the request.
pub fn rule_matches(rule: &Rule, ctx: &RequestContext) -> bool {
    if !rule.is_enabled() {
        return false;
    }
    let condition = &rule.condition;

    if !method_matches(&condition.method, &ctx.method) {
        return false;
    }
    if !PathPattern::matches_str(&condition.path, &ctx.path) {
        return false;
    }
    if !headers_match(&condition.headers, ctx) {
        return false;
    }

    let body = condition
        .body
        .as_ref()
        .map(|b| b.matches.as_str())
        .unwrap_or("");
    let checks = body_matches(body, ctx).and_then(|ok| {
        if ok {
            query_matches(&condition.query, ctx)
        } else {
            Ok(false)
        }
    });

    match checks {
        Ok(true) if rule.action().is_none() => {
            warn!(path = %condition.path, "Rule has neither proxyto nor response, skipping");
            false
        }
        Ok(matched) => matched,
        Err(e) => {
            warn!(path = %condition.path, "Rule skipped: {}", e);
            false
        }
    }
}
