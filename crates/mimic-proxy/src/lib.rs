//! mimic: a programmable HTTP intermediary.
//!
//! Requests arriving on the proxy listener are matched against per-service
//! rules of a workspace and answered with a templated mock, forwarded to an
//! upstream, or rejected with 504. Every exchange is recorded, persisted and
//! streamed to live subscribers.

pub mod admin_api;
pub mod config;
pub mod dsl;
pub mod interceptor;
pub mod logging;
pub mod matcher;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod template;
