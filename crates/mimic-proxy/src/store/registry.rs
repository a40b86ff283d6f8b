//! WorkspaceRegistry - lifecycle management for workspaces.
//!
//! Each workspace is a directory under the registry root. Stores are opened
//! lazily on first access and kept until the workspace is disabled or the
//! registry is closed. Listing and duplication work from disk only, so they
//! do not depend on which stores happen to be loaded.

use super::core::Store;
use super::persistence;
use super::types::{StoreError, WorkspaceMetadata, WorkspaceSummary};
use chrono::Utc;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_WORKSPACE: &str = "default";
pub const DISABLED_SUFFIX: &str = ".disabled";
const ICON_PALETTE_SIZE: usize = 18;

/// File name of palette entry `index` (zero-based).
pub fn palette_icon(index: usize) -> String {
    format!("icon{:02}.svg", index % ICON_PALETTE_SIZE + 1)
}

fn random_icon() -> String {
    palette_icon(rand::thread_rng().gen_range(0..ICON_PALETTE_SIZE))
}

/// Workspace names become directory names.
pub fn validate_workspace_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::Validation("workspace name must not be empty".into()));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StoreError::Validation(format!(
            "invalid workspace name '{name}'"
        )));
    }
    if name.ends_with(DISABLED_SUFFIX) {
        return Err(StoreError::Validation(format!(
            "workspace name must not end with '{DISABLED_SUFFIX}'"
        )));
    }
    Ok(())
}

/// Manages the stores of all workspaces
#[derive(Debug)]
pub struct WorkspaceRegistry {
    root: PathBuf,
    max_traffic: usize,
    subscriber_buffer: usize,
    stores: RwLock<HashMap<String, Arc<Store>>>,
    closed: AtomicBool,
}

impl WorkspaceRegistry {
    /// Create a registry rooted at `root`, making sure `default` exists.
    pub fn new(
        root: impl Into<PathBuf>,
        max_traffic: usize,
        subscriber_buffer: usize,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        let default_dir = root.join(DEFAULT_WORKSPACE);
        persistence::ensure_layout(&default_dir)?;
        if persistence::read_metadata(&default_dir).is_none() {
            persistence::write_metadata(
                &default_dir,
                &WorkspaceMetadata {
                    icon: palette_icon(0),
                    created: Utc::now(),
                },
            )?;
        }
        info!(root = %root.display(), "Workspace registry ready");

        Ok(Self {
            root,
            max_traffic,
            subscriber_buffer,
            stores: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn workspace_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn disabled_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{DISABLED_SUFFIX}"))
    }

    /// Store for `name`, opening it on first access. Concurrent first
    /// accesses share a single instance. Nothing opens after `close_all`.
    pub fn get_store(&self, name: &str) -> Result<Arc<Store>, StoreError> {
        validate_workspace_name(name)?;

        if let Some(store) = self.stores.read().get(name) {
            return Ok(store.clone());
        }

        let mut stores = self.stores.write();
        if let Some(store) = stores.get(name) {
            return Ok(store.clone());
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::NotFound(format!("workspace '{name}'")));
        }

        let dir = self.workspace_dir(name);
        if !dir.is_dir() {
            return Err(StoreError::NotFound(format!("workspace '{name}'")));
        }
        let store = Store::open(&dir, name, self.max_traffic, self.subscriber_buffer)?;
        stores.insert(name.to_string(), store.clone());
        Ok(store)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.stores.read().contains_key(name)
    }

    /// Active workspaces with counts read from disk, sorted by name.
    pub fn list(&self) -> Result<Vec<WorkspaceSummary>, StoreError> {
        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.ends_with(DISABLED_SUFFIX) {
                continue;
            }
            summaries.push(self.summary(&name));
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    fn summary(&self, name: &str) -> WorkspaceSummary {
        let dir = self.workspace_dir(name);
        let metadata = persistence::read_metadata(&dir);
        WorkspaceSummary {
            name: name.to_string(),
            icon: metadata
                .as_ref()
                .map(|m| m.icon.clone())
                .unwrap_or_else(|| palette_icon(0)),
            created: metadata.map(|m| m.created),
            rule_count: persistence::count_rules(&persistence::rules_dir(&dir)),
            traffic_count: persistence::count_traffic(&persistence::traffic_path(&dir)),
        }
    }

    /// Create a workspace seeded with the rules of `default`.
    pub fn create(&self, name: &str) -> Result<WorkspaceSummary, StoreError> {
        validate_workspace_name(name)?;
        self.ensure_available(name)?;

        let dir = self.workspace_dir(name);
        persistence::ensure_layout(&dir)?;
        let copied = persistence::copy_rule_files(
            &persistence::rules_dir(&self.workspace_dir(DEFAULT_WORKSPACE)),
            &persistence::rules_dir(&dir),
        )?;
        persistence::write_metadata(
            &dir,
            &WorkspaceMetadata {
                icon: random_icon(),
                created: Utc::now(),
            },
        )?;
        info!(workspace = %name, rule_files = copied, "Created workspace");
        Ok(self.summary(name))
    }

    /// Soft-delete a workspace by renaming its directory.
    pub fn disable(&self, name: &str) -> Result<(), StoreError> {
        validate_workspace_name(name)?;
        if name == DEFAULT_WORKSPACE {
            return Err(StoreError::Validation(
                "the default workspace cannot be disabled".into(),
            ));
        }
        let dir = self.workspace_dir(name);
        if !dir.is_dir() {
            return Err(StoreError::NotFound(format!("workspace '{name}'")));
        }
        let target = self.disabled_dir(name);
        if target.exists() {
            return Err(StoreError::Validation(format!(
                "a disabled copy of workspace '{name}' already exists"
            )));
        }

        // Held across the rename so get_store cannot reopen the old directory.
        let mut stores = self.stores.write();
        if let Some(store) = stores.remove(name) {
            store.close();
        }
        fs::rename(&dir, &target)?;
        drop(stores);
        info!(workspace = %name, "Disabled workspace");
        Ok(())
    }

    pub fn enable(&self, name: &str) -> Result<(), StoreError> {
        validate_workspace_name(name)?;
        let source = self.disabled_dir(name);
        if !source.is_dir() {
            return Err(StoreError::NotFound(format!("disabled workspace '{name}'")));
        }
        let dir = self.workspace_dir(name);
        if dir.exists() {
            return Err(StoreError::Validation(format!(
                "workspace '{name}' already exists"
            )));
        }
        let stores = self.stores.write();
        fs::rename(&source, &dir)?;
        drop(stores);
        info!(workspace = %name, "Enabled workspace");
        Ok(())
    }

    /// Copy a workspace on disk. The copy is not opened until first access.
    pub fn duplicate(&self, source: &str, dest: &str) -> Result<WorkspaceSummary, StoreError> {
        validate_workspace_name(source)?;
        validate_workspace_name(dest)?;
        let source_dir = self.workspace_dir(source);
        if !source_dir.is_dir() {
            return Err(StoreError::NotFound(format!("workspace '{source}'")));
        }
        self.ensure_available(dest)?;

        let dest_dir = self.workspace_dir(dest);
        persistence::ensure_layout(&dest_dir)?;
        persistence::copy_rule_files(
            &persistence::rules_dir(&source_dir),
            &persistence::rules_dir(&dest_dir),
        )?;

        match fs::copy(
            persistence::traffic_path(&source_dir),
            persistence::traffic_path(&dest_dir),
        ) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                source = %source,
                dest = %dest,
                "Traffic log not copied: {}",
                e
            ),
        }

        let metadata = persistence::read_metadata(&source_dir).unwrap_or_else(|| {
            debug!(source = %source, "No metadata to copy, generating fresh metadata");
            WorkspaceMetadata {
                icon: random_icon(),
                created: Utc::now(),
            }
        });
        persistence::write_metadata(&dest_dir, &metadata)?;

        info!(source = %source, dest = %dest, "Duplicated workspace");
        Ok(self.summary(dest))
    }

    fn ensure_available(&self, name: &str) -> Result<(), StoreError> {
        if self.workspace_dir(name).exists() {
            return Err(StoreError::Validation(format!(
                "workspace '{name}' already exists"
            )));
        }
        if self.disabled_dir(name).exists() {
            return Err(StoreError::Validation(format!(
                "workspace '{name}' exists but is disabled"
            )));
        }
        Ok(())
    }

    /// Close every loaded store, ending all live subscriptions. Later
    /// `get_store` calls report NotFound.
    pub fn close_all(&self) {
        let stores: Vec<Arc<Store>> = {
            let mut loaded = self.stores.write();
            self.closed.store(true, Ordering::Release);
            loaded.drain().map(|(_, s)| s).collect()
        };
        for store in &stores {
            store.close();
        }
        info!(count = stores.len(), "Closed all workspaces");
    }
}
