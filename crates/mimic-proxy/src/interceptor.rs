//! Request interceptors.
//!
//! An interceptor gets first refusal on every proxied request, before any
//! rule is consulted. Returning a response short-circuits the pipeline; the
//! exchange is still recorded with the `plugin` resolution kind. Scripting
//! engines plug in by implementing [`RequestInterceptor`].

use crate::model::RequestContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error raised by an interceptor. The pipeline logs it and continues as if
/// the interceptor had declined.
#[derive(Error, Debug)]
pub enum InterceptorError {
    #[error("interceptor '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

/// Response produced by an interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptedResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

fn default_status() -> u16 {
    200
}

/// One entry of an interceptor's UI panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    /// Markdown
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub actions: Vec<serde_json::Value>,
}

/// UI description an interceptor may publish for the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub items: Vec<UiItem>,
}

#[async_trait]
pub trait RequestInterceptor: Send + Sync + 'static {
    /// Offer a request to the interceptor.
    ///
    /// # Returns
    /// `Ok(None)` to decline, `Ok(Some(response))` to answer the request.
    async fn attempt_handle(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<InterceptedResponse>, InterceptorError>;

    /// Optional UI description.
    fn describe_ui(&self) -> Option<UiDescriptor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intercepted_response_defaults() {
        let response: InterceptedResponse = serde_json::from_str(r#"{"body": "hi"}"#).unwrap();
        assert_eq!(response.status, 200);
        assert!(response.headers.is_empty());
    }

    #[test]
    fn test_ui_descriptor_kind_serializes_as_type() {
        let ui = UiDescriptor {
            kind: "list".into(),
            items: Vec::new(),
        };
        let json = serde_json::to_value(&ui).unwrap();
        assert_eq!(json["type"], "list");
    }
}
