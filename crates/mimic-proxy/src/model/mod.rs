//! Shared data model.
//!
//! ## Module Structure
//!
//! - `rule` - Rule definitions as stored in per-service YAML files
//! - `traffic` - Recorded request/response pairs
//! - `context` - Per-request view consumed by the matcher and the renderer

mod context;
mod rule;
mod traffic;

pub use context::RequestContext;
pub(crate) use context::title_case;
pub use rule::{BodyMatch, MatchCondition, Rule, RuleAction, ServiceRules};
pub use traffic::{ResolutionKind, TrafficEntry, TrafficResponse};
