//! Core Store struct and implementation.
//!
//! A Store owns one workspace: the service rule lists backed by
//! `_rules/*.yaml`, a bounded window of recent traffic backed by an
//! append-only `traffic.ndjson`, and the live traffic subscribers.
//!
//! All state sits behind a single reader/writer lock. Readers get copies.
//! Rule mutations hold the write lock across the file rewrite so a returned
//! call is always durable.

use super::persistence::{self, validate_service_name};
use super::truncate::truncate_entry;
use super::types::{MoveDirection, StoreError, TrafficSubscription};
use super::watcher::RulesWatcher;
use crate::dsl::{self, ParsedTemplate};
use crate::metrics;
use crate::model::{MatchCondition, Rule, TrafficEntry};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

/// Response headers left out of rules generated from recorded traffic.
const GENERATED_RULE_SKIPPED_HEADERS: &[&str] = &[
    "connection",
    "content-encoding",
    "content-length",
    "date",
    "keep-alive",
    "transfer-encoding",
];

#[derive(Debug, Default)]
struct StoreState {
    rules: HashMap<String, Vec<Rule>>,
    traffic: VecDeque<TrafficEntry>,
    subscribers: HashMap<u64, mpsc::Sender<TrafficEntry>>,
    next_subscriber_id: u64,
    closed: bool,
}

/// Runtime state of one workspace
#[derive(Debug)]
pub struct Store {
    name: String,
    dir: PathBuf,
    rules_dir: PathBuf,
    traffic_path: PathBuf,
    max_traffic: usize,
    subscriber_buffer: usize,
    state: RwLock<StoreState>,
    watcher: Mutex<Option<RulesWatcher>>,
}

impl Store {
    /// Load the workspace at `dir` and start watching its rules directory.
    pub fn open(
        dir: &Path,
        name: &str,
        max_traffic: usize,
        subscriber_buffer: usize,
    ) -> Result<Arc<Self>, StoreError> {
        persistence::ensure_layout(dir)?;
        let rules_dir = persistence::rules_dir(dir);
        let traffic_path = persistence::traffic_path(dir);

        let rules = persistence::load_all_rules(&rules_dir)?;
        let traffic = persistence::load_traffic(&traffic_path, max_traffic)?;
        info!(
            workspace = %name,
            services = rules.len(),
            traffic = traffic.len(),
            "Opened workspace"
        );

        let store = Arc::new(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            rules_dir,
            traffic_path,
            max_traffic,
            subscriber_buffer: subscriber_buffer.max(1),
            state: RwLock::new(StoreState {
                rules,
                traffic,
                ..Default::default()
            }),
            watcher: Mutex::new(None),
        });

        let watcher = RulesWatcher::start(&store.rules_dir, Arc::downgrade(&store))?;
        *store.watcher.lock() = Some(watcher);
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ---- rules -------------------------------------------------------------

    /// Copy of a service's rules; empty for an unknown service.
    pub fn get_rules(&self, service: &str) -> Vec<Rule> {
        self.state
            .read()
            .rules
            .get(service)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_all_rules(&self) -> BTreeMap<String, Vec<Rule>> {
        self.state
            .read()
            .rules
            .iter()
            .map(|(service, rules)| (service.clone(), rules.clone()))
            .collect()
    }

    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.state.read().rules.keys().cloned().collect();
        services.sort();
        services
    }

    /// Insert a rule, at the front unless `index` is given. Returns the index
    /// the rule landed at. Creates the service when it does not exist yet.
    pub fn add_rule(
        &self,
        service: &str,
        rule: Rule,
        index: Option<usize>,
    ) -> Result<usize, StoreError> {
        validate_service_name(service)?;
        rule.validate().map_err(StoreError::Validation)?;

        let mut state = self.state.write();
        let mut rules = state.rules.get(service).cloned().unwrap_or_default();
        let index = index.unwrap_or(0);
        if index > rules.len() {
            return Err(StoreError::Validation(format!(
                "index {index} out of range (service '{service}' has {} rules)",
                rules.len()
            )));
        }
        rules.insert(index, rule);
        self.commit(&mut state, service, rules)?;
        debug!(workspace = %self.name, service = %service, rule_index = index, "Added rule");
        Ok(index)
    }

    pub fn update_rule(&self, service: &str, index: usize, rule: Rule) -> Result<(), StoreError> {
        rule.validate().map_err(StoreError::Validation)?;

        let mut state = self.state.write();
        let mut rules = Self::existing(&state, service)?;
        let slot = rules
            .get_mut(index)
            .ok_or_else(|| StoreError::NotFound(format!("rule index {index}")))?;
        *slot = rule;
        self.commit(&mut state, service, rules)?;
        debug!(workspace = %self.name, service = %service, rule_index = index, "Updated rule");
        Ok(())
    }

    /// Remove and return the rule at `index`.
    pub fn delete_rule(&self, service: &str, index: usize) -> Result<Rule, StoreError> {
        let mut state = self.state.write();
        let mut rules = Self::existing(&state, service)?;
        if index >= rules.len() {
            return Err(StoreError::NotFound(format!("rule index {index}")));
        }
        let removed = rules.remove(index);
        self.commit(&mut state, service, rules)?;
        debug!(workspace = %self.name, service = %service, rule_index = index, "Deleted rule");
        Ok(removed)
    }

    /// Swap a rule with its neighbour. Returns the rule's new index.
    pub fn move_rule(
        &self,
        service: &str,
        index: usize,
        direction: MoveDirection,
    ) -> Result<usize, StoreError> {
        let mut state = self.state.write();
        let mut rules = Self::existing(&state, service)?;
        if index >= rules.len() {
            return Err(StoreError::NotFound(format!("rule index {index}")));
        }
        let target = match direction {
            MoveDirection::Up if index == 0 => {
                return Err(StoreError::Validation(
                    "cannot move the first rule up".into(),
                ))
            }
            MoveDirection::Down if index + 1 == rules.len() => {
                return Err(StoreError::Validation(
                    "cannot move the last rule down".into(),
                ))
            }
            MoveDirection::Up => index - 1,
            MoveDirection::Down => index + 1,
        };
        rules.swap(index, target);
        self.commit(&mut state, service, rules)?;
        Ok(target)
    }

    /// Rename the service's rule file out of the way and forget its rules.
    /// Returns the new file path.
    pub fn disable_service(&self, service: &str) -> Result<PathBuf, StoreError> {
        let mut state = self.state.write();
        if !state.rules.contains_key(service) {
            return Err(StoreError::NotFound(format!("service '{service}'")));
        }
        let target = persistence::disable_rule_file(&self.rules_dir, service, chrono::Utc::now())?;
        state.rules.remove(service);
        info!(workspace = %self.name, service = %service, "Disabled service");
        Ok(target)
    }

    /// Current contents of a service's rule file.
    pub fn raw_rules(&self, service: &str) -> Result<String, StoreError> {
        validate_service_name(service)?;
        let _state = self.state.read();
        let path = persistence::rule_file(&self.rules_dir, service);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("service '{service}'")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-read one rule file and replace that service's rules. Returns the
    /// service name, or `None` when the path is not a live rule file.
    pub fn reload_rule_file(&self, path: &Path) -> Result<Option<String>, StoreError> {
        let Some(service) = persistence::service_from_path(path) else {
            return Ok(None);
        };
        let mut state = self.state.write();
        if state.closed || !path.exists() {
            return Ok(None);
        }
        let rules = persistence::load_rule_file(path)?;
        state.rules.insert(service.clone(), rules);
        Ok(Some(service))
    }

    fn existing(state: &StoreState, service: &str) -> Result<Vec<Rule>, StoreError> {
        state
            .rules
            .get(service)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("service '{service}'")))
    }

    /// Persist first, then publish, so a failed write leaves memory untouched.
    fn commit(
        &self,
        state: &mut StoreState,
        service: &str,
        rules: Vec<Rule>,
    ) -> Result<(), StoreError> {
        persistence::write_rule_file(&self.rules_dir, service, &rules)?;
        state.rules.insert(service.to_string(), rules);
        Ok(())
    }

    // ---- traffic -----------------------------------------------------------

    /// Record one request. The entry is truncated, kept in the in-memory
    /// window, appended to the log and offered to every subscriber without
    /// waiting. A log write failure is returned after the entry has still been
    /// kept and broadcast.
    pub fn add_traffic(&self, mut entry: TrafficEntry) -> Result<(), StoreError> {
        truncate_entry(&mut entry);

        let mut state = self.state.write();
        state.traffic.push_back(entry.clone());
        while state.traffic.len() > self.max_traffic {
            state.traffic.pop_front();
        }

        let persisted = persistence::append_traffic(&self.traffic_path, &entry);

        let mut gone = Vec::new();
        for (id, sender) in &state.subscribers {
            match sender.try_send(entry.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => metrics::record_traffic_dropped(),
                Err(TrySendError::Closed(_)) => gone.push(*id),
            }
        }
        for id in gone {
            state.subscribers.remove(&id);
        }

        persisted
    }

    /// Newest first, optionally restricted to one service.
    pub fn get_traffic(&self, limit: usize, service: Option<&str>) -> Vec<TrafficEntry> {
        self.state
            .read()
            .traffic
            .iter()
            .rev()
            .filter(|entry| service.map_or(true, |s| entry.service == s))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get_traffic_by_id(&self, id: &str) -> Option<TrafficEntry> {
        self.state
            .read()
            .traffic
            .iter()
            .rev()
            .find(|entry| entry.id == id)
            .cloned()
    }

    /// Entries in the in-memory window.
    pub fn traffic_count(&self, service: Option<&str>) -> usize {
        let state = self.state.read();
        match service {
            None => state.traffic.len(),
            Some(s) => state.traffic.iter().filter(|e| e.service == s).count(),
        }
    }

    /// Turn a recorded exchange into a mock rule for its service and insert it
    /// with the normal insertion policy. Returns the service and index.
    pub fn add_rule_from_traffic(&self, id: &str) -> Result<(String, usize), StoreError> {
        let entry = self
            .get_traffic_by_id(id)
            .ok_or_else(|| StoreError::NotFound(format!("traffic entry '{id}'")))?;
        let rule = rule_from_traffic(&entry);
        let index = self.add_rule(&entry.service, rule, None)?;
        Ok((entry.service, index))
    }

    // ---- pub/sub -----------------------------------------------------------

    pub fn subscribe(&self) -> TrafficSubscription {
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        let mut state = self.state.write();
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        if !state.closed {
            state.subscribers.insert(id, tx);
        }
        TrafficSubscription { id, receiver: rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        self.state.write().subscribers.remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.read().subscribers.len()
    }

    /// Stop the watcher and end every subscription. Safe to call repeatedly.
    pub fn close(&self) {
        {
            let mut state = self.state.write();
            if state.closed {
                return;
            }
            state.closed = true;
            state.subscribers.clear();
        }
        self.watcher.lock().take();
        info!(workspace = %self.name, "Closed workspace");
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }
}

/// Mock rule replaying a recorded response for the same method and path.
pub fn rule_from_traffic(entry: &TrafficEntry) -> Rule {
    let template = ParsedTemplate {
        status_code: entry.response.status_code,
        headers: entry
            .response
            .headers
            .iter()
            .filter(|(name, _)| {
                !GENERATED_RULE_SKIPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str())
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
        body: entry.response.body.clone(),
        ..Default::default()
    };

    Rule {
        condition: MatchCondition {
            method: vec![entry.method.clone()],
            path: entry.path.clone(),
            ..Default::default()
        },
        response: Some(dsl::format(&template)),
        ..Default::default()
    }
}
