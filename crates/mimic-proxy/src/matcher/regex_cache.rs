//! Cache of compiled user-supplied patterns.
//!
//! Rules are re-read from the store on every request, so patterns would
//! otherwise be recompiled per request. `Regex` clones share their program.

use super::MatchError;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const MAX_CACHED_PATTERNS: usize = 1024;

static CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

fn cache() -> &'static RwLock<HashMap<String, Regex>> {
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Compiled regex for `pattern`. Failures are not cached.
pub(crate) fn get(pattern: &str) -> Result<Regex, MatchError> {
    if let Some(regex) = cache().read().get(pattern) {
        return Ok(regex.clone());
    }

    let regex = Regex::new(pattern).map_err(|source| MatchError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut cache = cache().write();
    if cache.len() >= MAX_CACHED_PATTERNS {
        cache.clear();
    }
    cache.insert(pattern.to_string(), regex.clone());
    Ok(regex)
}
