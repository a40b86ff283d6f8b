//! Rule definitions.
//!
//! A service's rules live in `_rules/<service>.yaml` under a top-level
//! `rules:` list. List order is evaluation order.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Body predicate: an unanchored regex searched in the request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyMatch {
    #[serde(default)]
    pub matches: String,
}

/// Match predicates of a rule. Every unset predicate holds vacuously.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCondition {
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub method: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyMatch>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
}

/// One declarative rule: match condition plus exactly one action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "match", default)]
    pub condition: MatchCondition,
    #[serde(rename = "proxyto", default, skip_serializing_if = "Option::is_none")]
    pub proxy_to: Option<String>,
    /// Headers injected into proxied requests (values are templates).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Mock response in the response DSL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// The action a matched rule resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction<'a> {
    Proxy {
        target: &'a str,
        headers: &'a BTreeMap<String, String>,
    },
    Mock {
        response: &'a str,
    },
}

impl Rule {
    /// Build a mock rule for `method path`.
    pub fn mock(method: &str, path: &str, response: impl Into<String>) -> Self {
        Self {
            condition: MatchCondition {
                method: vec![method.to_string()],
                path: path.to_string(),
                ..Default::default()
            },
            response: Some(response.into()),
            ..Default::default()
        }
    }

    /// Absent `enabled` means enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Resolve the rule's action. Proxy wins if both are set; `None` if neither is.
    pub fn action(&self) -> Option<RuleAction<'_>> {
        if let Some(target) = self.proxy_to.as_deref().filter(|t| !t.is_empty()) {
            return Some(RuleAction::Proxy {
                target,
                headers: &self.headers,
            });
        }
        self.response
            .as_deref()
            .map(|response| RuleAction::Mock { response })
    }

    /// Check that the rule declares exactly one action and that its regex
    /// predicates compile.
    pub fn validate(&self) -> Result<(), String> {
        let has_proxy = self.proxy_to.as_deref().is_some_and(|t| !t.is_empty());
        let has_response = self.response.is_some();
        match (has_proxy, has_response) {
            (true, true) => return Err("rule must not set both 'proxyto' and 'response'".into()),
            (false, false) => return Err("rule must set either 'proxyto' or 'response'".into()),
            _ => {}
        }

        if let Some(body) = &self.condition.body {
            if !body.matches.is_empty() {
                Regex::new(&body.matches)
                    .map_err(|e| format!("invalid body regex '{}': {e}", body.matches))?;
            }
        }
        for (key, pattern) in &self.condition.query {
            Regex::new(pattern)
                .map_err(|e| format!("invalid query regex for '{key}': {e}"))?;
        }
        Ok(())
    }
}

/// Contents of one service rule file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRules {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Accept `method: GET` as well as `method: [GET, POST]`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(method)) => vec![method],
        Some(OneOrMany::Many(methods)) => methods,
    })
}
