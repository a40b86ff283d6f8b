//! On-disk layout of a workspace.
//!
//! ```text
//! <workspace>/_rules/<service>.yaml
//! <workspace>/traffic.ndjson
//! <workspace>/metadata.json
//! ```

use super::types::{StoreError, WorkspaceMetadata};
use crate::model::{Rule, ServiceRules, TrafficEntry};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const RULES_DIR: &str = "_rules";
pub const TRAFFIC_FILE: &str = "traffic.ndjson";
pub const METADATA_FILE: &str = "metadata.json";
pub const RULE_FILE_EXTENSION: &str = "yaml";

pub fn rules_dir(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(RULES_DIR)
}

pub fn traffic_path(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(TRAFFIC_FILE)
}

pub fn metadata_path(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(METADATA_FILE)
}

pub fn rule_file(rules_dir: &Path, service: &str) -> PathBuf {
    rules_dir.join(format!("{service}.{RULE_FILE_EXTENSION}"))
}

pub fn ensure_layout(workspace_dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(rules_dir(workspace_dir))?;
    Ok(())
}

/// Service name for a rule file path; `None` for anything but `*.yaml`.
pub fn service_from_path(path: &Path) -> Option<String> {
    if path.extension()? != RULE_FILE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Services become file names, so they must be a single path component.
pub fn validate_service_name(service: &str) -> Result<(), StoreError> {
    if service.is_empty()
        || service.starts_with('.')
        || service.contains(['/', '\\'])
        || service.contains("..")
    {
        return Err(StoreError::Validation(format!(
            "invalid service name '{service}'"
        )));
    }
    Ok(())
}

pub fn load_rule_file(path: &Path) -> Result<Vec<Rule>, StoreError> {
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: ServiceRules = serde_yaml::from_str(&contents)?;
    Ok(parsed.rules)
}

/// Load every rule file in `rules_dir`. Files that fail to parse are logged
/// and skipped.
pub fn load_all_rules(rules_dir: &Path) -> Result<HashMap<String, Vec<Rule>>, StoreError> {
    let mut rules = HashMap::new();
    for entry in fs::read_dir(rules_dir)? {
        let path = entry?.path();
        let Some(service) = service_from_path(&path) else {
            continue;
        };
        match load_rule_file(&path) {
            Ok(loaded) => {
                debug!(service = %service, count = loaded.len(), "Loaded rules");
                rules.insert(service, loaded);
            }
            Err(e) => warn!(path = %path.display(), "Skipping unreadable rule file: {}", e),
        }
    }
    Ok(rules)
}

/// Rewrite a service's rule file. The content is written to a sibling temp
/// file and renamed into place so readers never see a partial document.
pub fn write_rule_file(rules_dir: &Path, service: &str, rules: &[Rule]) -> Result<(), StoreError> {
    let yaml = serde_yaml::to_string(&ServiceRules {
        rules: rules.to_vec(),
    })?;
    let target = rule_file(rules_dir, service);
    let tmp = rules_dir.join(format!(".{service}.{RULE_FILE_EXTENSION}.tmp"));
    fs::write(&tmp, yaml)?;
    fs::rename(&tmp, &target)?;
    Ok(())
}

/// Rename `<service>.yaml` to `<service>.yaml.disabled-YYYYMMDD-HHMMSS`.
pub fn disable_rule_file(
    rules_dir: &Path,
    service: &str,
    at: DateTime<Utc>,
) -> Result<PathBuf, StoreError> {
    let source = rule_file(rules_dir, service);
    let target = rules_dir.join(format!(
        "{service}.{RULE_FILE_EXTENSION}.disabled-{}",
        at.format("%Y%m%d-%H%M%S")
    ));
    fs::rename(&source, &target)?;
    Ok(target)
}

/// Read the traffic log, keeping the newest `max` entries. Malformed lines are
/// logged and skipped.
pub fn load_traffic(path: &Path, max: usize) -> Result<VecDeque<TrafficEntry>, StoreError> {
    let mut traffic = VecDeque::with_capacity(max.min(1024));
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(traffic),
        Err(e) => return Err(e.into()),
    };

    for (line_number, line) in BufReader::new(file).split(b'\n').enumerate() {
        let line = line?;
        if line.trim_ascii().is_empty() {
            continue;
        }
        match serde_json::from_slice::<TrafficEntry>(&line) {
            Ok(entry) => {
                traffic.push_back(entry);
                if traffic.len() > max {
                    traffic.pop_front();
                }
            }
            Err(e) => warn!(
                path = %path.display(),
                line = line_number + 1,
                "Skipping malformed traffic entry: {}",
                e
            ),
        }
    }
    Ok(traffic)
}

/// Append one entry as a JSON line, creating the log on first write.
pub fn append_traffic(path: &Path, entry: &TrafficEntry) -> Result<(), StoreError> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Number of rules across all readable rule files.
pub fn count_rules(rules_dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(rules_dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| service_from_path(path).is_some())
        .filter_map(|path| load_rule_file(&path).ok())
        .map(|rules| rules.len())
        .sum()
}

/// Number of non-empty lines in the traffic log.
pub fn count_traffic(path: &Path) -> usize {
    let Ok(file) = fs::File::open(path) else {
        return 0;
    };
    BufReader::new(file)
        .split(b'\n')
        .map_while(Result::ok)
        .filter(|line| !line.trim_ascii().is_empty())
        .count()
}

/// Copy every `*.yaml` file from one rules directory to another.
pub fn copy_rule_files(from: &Path, to: &Path) -> Result<usize, StoreError> {
    fs::create_dir_all(to)?;
    let mut copied = 0;
    let entries = match fs::read_dir(from) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path = entry?.path();
        if service_from_path(&path).is_none() {
            continue;
        }
        if let Some(name) = path.file_name() {
            fs::copy(&path, to.join(name))?;
            copied += 1;
        }
    }
    Ok(copied)
}

pub fn read_metadata(workspace_dir: &Path) -> Option<WorkspaceMetadata> {
    let contents = fs::read_to_string(metadata_path(workspace_dir)).ok()?;
    serde_json::from_str(&contents).ok()
}

pub fn write_metadata(workspace_dir: &Path, metadata: &WorkspaceMetadata) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(metadata_path(workspace_dir), json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResolutionKind, TrafficResponse};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn entry(id: &str) -> TrafficEntry {
        TrafficEntry {
            id: id.to_string(),
            timestamp: Utc::now(),
            service: "svc".into(),
            method: "GET".into(),
            path: "/svc".into(),
            query: Default::default(),
            headers: Default::default(),
            body: None,
            response: TrafficResponse {
                status_code: 200,
                ..Default::default()
            },
            matched_rule: Some(0),
            rule_type: ResolutionKind::Mock,
        }
    }

    #[test]
    fn test_service_from_path() {
        assert_eq!(service_from_path(Path::new("/x/users.yaml")).as_deref(), Some("users"));
        assert!(service_from_path(Path::new("/x/users.yml")).is_none());
        assert!(service_from_path(Path::new("/x/users.yaml.disabled-20240101-000000")).is_none());
        assert!(service_from_path(Path::new("/x/.users.yaml.tmp")).is_none());
    }

    #[test]
    fn test_validate_service_name() {
        assert!(validate_service_name("users").is_ok());
        assert!(validate_service_name("").is_err());
        assert!(validate_service_name("a/b").is_err());
        assert!(validate_service_name("..").is_err());
        assert!(validate_service_name(".hidden").is_err());
    }

    #[test]
    fn test_write_and_load_rule_file() {
        let dir = TempDir::new().unwrap();
        let rules = vec![Rule::mock("GET", "/svc/a", "[200]\nbody:\nhi")];
        write_rule_file(dir.path(), "svc", &rules).unwrap();
        assert_eq!(load_rule_file(&rule_file(dir.path(), "svc")).unwrap(), rules);
        assert!(!dir.path().join(".svc.yaml.tmp").exists());
    }

    #[test]
    fn test_load_all_rules_skips_broken_files() {
        let dir = TempDir::new().unwrap();
        write_rule_file(dir.path(), "good", &[Rule::mock("GET", "/good", "[200]")]).unwrap();
        fs::write(dir.path().join("bad.yaml"), "rules: [unclosed").unwrap();
        fs::write(dir.path().join("empty.yaml"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = load_all_rules(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["good"].len(), 1);
        assert!(loaded["empty"].is_empty());
    }

    #[test]
    fn test_disable_rule_file_name() {
        let dir = TempDir::new().unwrap();
        write_rule_file(dir.path(), "svc", &[]).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let target = disable_rule_file(dir.path(), "svc", at).unwrap();
        assert_eq!(
            target.file_name().unwrap().to_str().unwrap(),
            "svc.yaml.disabled-20240305-140709"
        );
        assert!(!rule_file(dir.path(), "svc").exists());
    }

    #[test]
    fn test_traffic_append_and_bounded_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TRAFFIC_FILE);
        for i in 0..5 {
            append_traffic(&path, &entry(&i.to_string())).unwrap();
        }
        fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{not json}\n\n")
            .unwrap();

        let loaded = load_traffic(&path, 3).unwrap();
        let ids: Vec<&str> = loaded.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "4"]);
        assert_eq!(count_traffic(&path), 6);
    }

    #[test]
    fn test_load_traffic_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(load_traffic(&dir.path().join(TRAFFIC_FILE), 10).unwrap().is_empty());
    }

    #[test]
    fn test_count_and_copy_rules() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_rule_file(src.path(), "a", &vec![Rule::mock("GET", "/a", "[200]"); 2]).unwrap();
        write_rule_file(src.path(), "b", &[Rule::mock("GET", "/b", "[200]")]).unwrap();
        assert_eq!(count_rules(src.path()), 3);

        let target = dst.path().join(RULES_DIR);
        assert_eq!(copy_rule_files(src.path(), &target).unwrap(), 2);
        assert_eq!(count_rules(&target), 3);
    }

    #[test]
    fn test_metadata_round_trip() {
        let dir = TempDir::new().unwrap();
        assert!(read_metadata(dir.path()).is_none());
        let metadata = WorkspaceMetadata {
            icon: "icon03.svg".into(),
            created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        write_metadata(dir.path(), &metadata).unwrap();
        assert_eq!(read_metadata(dir.path()), Some(metadata));
    }
}
