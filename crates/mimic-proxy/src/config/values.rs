//! Runtime key/value store backing `config` lookups and secret masking.

use super::ConfigError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const MASK_PREFIX_LEN: usize = 7;
const MASK_SUFFIX: &str = "***";

/// Shared configuration values. When a persistence path is set, `set` and
/// `delete` rewrite it synchronously as a JSON object.
#[derive(Debug, Default)]
pub struct ValueStore {
    values: RwLock<BTreeMap<String, String>>,
    path: Option<PathBuf>,
}

impl ValueStore {
    /// In-memory store seeded with `initial`.
    pub fn new(initial: BTreeMap<String, String>) -> Self {
        Self {
            values: RwLock::new(initial),
            path: None,
        }
    }

    /// Store seeded with `initial`, overlaid with the contents of `path`
    /// when that file exists, and persisted back to `path` on change.
    pub fn load(initial: BTreeMap<String, String>, path: &Path) -> Result<Self, ConfigError> {
        let mut values = initial;
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let stored: BTreeMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
            values.extend(stored);
        }
        Ok(Self {
            values: RwLock::new(values),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    /// Insert without persisting.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }

    /// Insert and persist. The new value is visible only once written.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), ConfigError> {
        let mut values = self.values.write();
        let mut next = values.clone();
        next.insert(key.into(), value.into());
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    /// Remove a key. Returns whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool, ConfigError> {
        let mut values = self.values.write();
        if !values.contains_key(key) {
            return Ok(false);
        }
        let mut next = values.clone();
        next.remove(key);
        self.persist(&next)?;
        *values = next;
        Ok(true)
    }

    /// Snapshot of all values, unmasked.
    pub fn all(&self) -> BTreeMap<String, String> {
        self.values.read().clone()
    }

    /// Snapshot of all values with every value masked.
    pub fn masked(&self) -> BTreeMap<String, String> {
        self.values
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), mask_value(v)))
            .collect()
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(values)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Keep a short recognizable prefix of longer values.
pub fn mask_value(value: &str) -> String {
    if value.chars().count() <= MASK_PREFIX_LEN {
        return MASK_SUFFIX.to_string();
    }
    let prefix: String = value.chars().take(MASK_PREFIX_LEN).collect();
    format!("{prefix}{MASK_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mask_value() {
        assert_eq!(mask_value("sk-live-1234567"), "sk-live***");
        assert_eq!(mask_value("short"), "***");
        assert_eq!(mask_value("exactly"), "***");
        assert_eq!(mask_value(""), "***");
    }

    #[test]
    fn test_get_set_delete_in_memory() {
        let store = ValueStore::default();
        store.set("A", "1").unwrap();
        assert_eq!(store.get("A").as_deref(), Some("1"));
        assert!(store.delete("A").unwrap());
        assert!(!store.delete("A").unwrap());
        assert!(store.get("A").is_none());
    }

    #[test]
    fn test_masked_listing() {
        let store = ValueStore::new(BTreeMap::from([
            ("API_KEY".to_string(), "abcdefghijkl".to_string()),
            ("PIN".to_string(), "1234".to_string()),
        ]));
        let masked = store.masked();
        assert_eq!(masked["API_KEY"], "abcdefg***");
        assert_eq!(masked["PIN"], "***");
        assert_eq!(store.all()["API_KEY"], "abcdefghijkl");
    }

    #[test]
    fn test_persistence_overlays_initial_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("values.json");

        let store = ValueStore::load(BTreeMap::from([("A".into(), "from-config".into())]), &path)
            .unwrap();
        store.set("B", "persisted").unwrap();
        store.set("A", "overridden").unwrap();

        let reloaded =
            ValueStore::load(BTreeMap::from([("A".into(), "from-config".into())]), &path).unwrap();
        assert_eq!(reloaded.get("A").as_deref(), Some("overridden"));
        assert_eq!(reloaded.get("B").as_deref(), Some("persisted"));
    }

    #[test]
    fn test_failed_write_leaves_values_unchanged() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let store = ValueStore::load(
            BTreeMap::from([("A".into(), "1".into())]),
            &blocker.join("values.json"),
        )
        .unwrap();

        assert!(store.set("B", "2").is_err());
        assert!(store.get("B").is_none());
        assert!(store.delete("A").is_err());
        assert_eq!(store.get("A").as_deref(), Some("1"));
    }

    #[test]
    fn test_corrupt_values_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("values.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ValueStore::load(BTreeMap::new(), &path),
            Err(ConfigError::Parse(_))
        ));
    }
}
