//! Admin API handlers grouped by resource.

pub mod rules;
pub mod system;
pub mod traffic;
pub mod workspaces;
