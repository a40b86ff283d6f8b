//! Request pipeline for the proxy listener.
//!
//! Every inbound request is routed to a workspace, offered to the
//! interceptor, matched against the service's rules and answered by a mock,
//! an upstream or a 504. The exchange is then recorded in the workspace's
//! store.
//!
//! ## Module Structure
//!
//! - `server` - Listener and accept loop with graceful drain
//! - `handler` - Per-request orchestration (`Pipeline`)
//! - `route` - Workspace and service resolution from the path
//! - `forwarding` - Upstream forwarding and response capture
//! - `mock` - Mock responses built from the response DSL
//! - `masking` - Secret masking for recorded requests
//! - `headers` - Hop-by-hop stripping and header helpers
//! - `client` - Pooled upstream HTTP client
//! - `network` - Listener socket setup
//! - `response_ext` - Body boxing shared with the admin API

mod client;
mod forwarding;
mod handler;
mod headers;
mod masking;
mod mock;
mod network;
mod response_ext;
mod route;
mod server;

#[allow(unused_imports)]
pub use client::{create_http_client, HttpClient};
#[allow(unused_imports)]
pub use forwarding::{apply_localhost_alias, build_upstream_uri, error_response};
#[allow(unused_imports)]
pub use handler::{Exchange, InboundRequest, Pipeline, NO_MATCH_BODY, NO_MATCH_STATUS};
#[allow(unused_imports)]
pub use masking::Masker;
pub use network::create_reusable_listener;
pub use response_ext::{full_body, ResponseBody, ResponseExt};
#[allow(unused_imports)]
pub use route::{resolve as resolve_route, Route};
pub use server::{ProxyServer, DRAIN_TIMEOUT};
