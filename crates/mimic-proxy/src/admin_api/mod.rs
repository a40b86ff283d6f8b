//! Administrative REST API.
//!
//! Served on its own port; manages workspaces, rules, recorded traffic and
//! configuration values, and streams live traffic as server-sent events.
//! Errors use the `{"errors": [{"code", "message"}]}` shape.
//!
//! ## Module Structure
//!
//! - `server` - Listener, accept loop and shared `AdminState`
//! - `router` - Path and method dispatch
//! - `types` - Request/response bodies and response helpers
//! - `handlers` - One module per resource

mod handlers;
mod router;
mod server;
mod types;

pub use server::{AdminApiServer, AdminState};
