//! Error and value types shared by the store and the workspace registry.

use crate::model::TrafficEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Direction for swapping a rule with its neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

impl FromStr for MoveDirection {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(MoveDirection::Up),
            "down" => Ok(MoveDirection::Down),
            other => Err(StoreError::Validation(format!(
                "invalid direction '{other}' (expected 'up' or 'down')"
            ))),
        }
    }
}

/// `metadata.json` of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    pub icon: String,
    pub created: DateTime<Utc>,
}

/// One row of the workspace listing, recomputed from disk.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceSummary {
    pub name: String,
    pub icon: String,
    pub created: Option<DateTime<Utc>>,
    pub rule_count: usize,
    pub traffic_count: usize,
}

/// A live traffic feed. Dropping the receiver or calling
/// [`Store::unsubscribe`](super::Store::unsubscribe) ends it; so does closing
/// the store.
#[derive(Debug)]
pub struct TrafficSubscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<TrafficEntry>,
}
