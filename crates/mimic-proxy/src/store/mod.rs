//! Per-workspace rule and traffic storage.
//!
//! This module provides:
//! - `Store`: one workspace's rules (hot reloaded from YAML), bounded
//!   traffic history with an append-only log, and live traffic fan-out
//! - `WorkspaceRegistry`: lazily opened stores plus workspace lifecycle
//!   (create, disable, enable, duplicate, list)
//!
//! ## Module Structure
//!
//! - `types`: errors and value types shared by store and registry
//! - `persistence`: on-disk layout and file I/O
//! - `truncate`: content-type driven body caps for recorded traffic
//! - `watcher`: rules directory watcher feeding reloads into the store
//! - `core`: the Store itself
//! - `registry`: WorkspaceRegistry

mod core;
mod persistence;
mod registry;
mod truncate;
mod types;
mod watcher;


pub use core::{rule_from_traffic, Store};
pub use registry::{validate_workspace_name, WorkspaceRegistry, DEFAULT_WORKSPACE, DISABLED_SUFFIX};
#[allow(unused_imports)]
pub use truncate::{
    is_text_content, truncate_entry, MAX_BINARY_BODY_BYTES, MAX_TEXT_BODY_BYTES,
    TRUNCATION_MARKER,
};
pub use types::{MoveDirection, StoreError, TrafficSubscription, WorkspaceMetadata, WorkspaceSummary};
#[allow(unused_imports)]
pub use persistence::{METADATA_FILE, RULES_DIR, TRAFFIC_FILE};
