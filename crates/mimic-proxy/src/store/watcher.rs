//! Rules directory watcher.
//!
//! The notify callback only forwards changed rule file paths over a channel.
//! A dedicated thread drains it and hands each path to
//! [`Store::reload_rule_file`], so reloads go through the same write lock as
//! every other rule mutation.

use super::core::Store;
use super::persistence::service_from_path;
use super::types::StoreError;
use crate::metrics;
use crossbeam::channel::{unbounded, Receiver};
use notify::{RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Weak;
use tracing::{debug, error, warn};

/// Keeps the OS watcher alive. Dropping it closes the event channel, which
/// ends the reload thread.
pub struct RulesWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl std::fmt::Debug for RulesWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesWatcher").finish_non_exhaustive()
    }
}

impl RulesWatcher {
    pub fn start(rules_dir: &Path, store: Weak<Store>) -> Result<Self, StoreError> {
        let (tx, rx) = unbounded::<PathBuf>();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if !(event.kind.is_modify() || event.kind.is_create()) {
                            return;
                        }
                        for path in event.paths {
                            if service_from_path(&path).is_some() {
                                debug!(path = %path.display(), "Rule file changed: {:?}", event.kind);
                                let _ = tx.send(path);
                            }
                        }
                    }
                    Err(e) => error!("Rules watch error: {:?}", e),
                }
            })?;

        watcher.watch(rules_dir, RecursiveMode::NonRecursive)?;

        std::thread::Builder::new()
            .name("mimic-rules-watcher".into())
            .spawn(move || reload_loop(rx, store))?;

        Ok(Self { _watcher: watcher })
    }
}

fn reload_loop(rx: Receiver<PathBuf>, store: Weak<Store>) {
    for path in rx {
        let Some(store) = store.upgrade() else {
            break;
        };
        if store.is_closed() {
            break;
        }
        match store.reload_rule_file(&path) {
            Ok(Some(service)) => {
                metrics::record_rule_reload(true);
                debug!(workspace = %store.name(), service = %service, "Reloaded rules");
            }
            Ok(None) => {}
            Err(e) => {
                metrics::record_rule_reload(false);
                warn!(
                    workspace = %store.name(),
                    path = %path.display(),
                    "Keeping previous rules, reload failed: {}",
                    e
                );
            }
        }
    }
    debug!("Rules watcher stopped");
}
