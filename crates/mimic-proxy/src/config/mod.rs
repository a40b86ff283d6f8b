//! Process configuration.
//!
//! Every field has a default, so the config file is optional. Command-line
//! flags are applied on top of the loaded file by the binary.

mod listen;
mod values;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[allow(unused_imports)]
pub use listen::{ConnectionPoolConfig, ListenConfig, LogConfig, LogFormat};
pub use values::{mask_value, ValueStore};

/// File holding values set at runtime, relative to the data directory.
pub const VALUES_FILE: &str = "values.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,

    /// Root holding `workspaces/` and the values file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// In-memory traffic window per workspace.
    #[serde(default = "default_max_traffic_entries")]
    pub max_traffic_entries: usize,

    /// Buffered entries per live traffic subscriber.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Host substituted for `localhost`/`127.0.0.1` in proxy targets, for
    /// running inside a container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localhost_alias: Option<String>,

    /// Initial values for `config` lookups and secret masking.
    #[serde(default)]
    pub values: BTreeMap<String, String>,

    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            data_dir: default_data_dir(),
            max_traffic_entries: default_max_traffic_entries(),
            subscriber_buffer: default_subscriber_buffer(),
            localhost_alias: None,
            values: BTreeMap::new(),
            connection_pool: ConnectionPoolConfig::default(),
            log: LogConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("mimic")
}

fn default_max_traffic_entries() -> usize {
    5000
}

fn default_subscriber_buffer() -> usize {
    10
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.proxy_port == 0 || self.listen.admin_port == 0 {
            return Err(ConfigError::Invalid("ports must be non-zero".into()));
        }
        if self.listen.proxy_port == self.listen.admin_port {
            return Err(ConfigError::Invalid(format!(
                "proxy and admin listeners both use port {}",
                self.listen.proxy_port
            )));
        }
        if self.max_traffic_entries == 0 {
            return Err(ConfigError::Invalid(
                "max_traffic_entries must be at least 1".into(),
            ));
        }
        if self.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid(
                "subscriber_buffer must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.data_dir.join("workspaces")
    }

    pub fn values_path(&self) -> PathBuf {
        self.data_dir.join(VALUES_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.listen.proxy_port, 6625);
        assert_eq!(config.listen.admin_port, 6626);
        assert_eq!(config.max_traffic_entries, 5000);
        assert_eq!(config.subscriber_buffer, 10);
        assert_eq!(config.log.format, LogFormat::Console);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
listen:
  host: 127.0.0.1
  proxy_port: 8080
  admin_port: 8081
data_dir: /tmp/mimic
max_traffic_entries: 100
localhost_alias: host.docker.internal
values:
  API_KEY: sk-test-123456
connection_pool:
  connect_timeout_secs: 2
log:
  format: json
  level: debug
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen.host, "127.0.0.1");
        assert_eq!(config.listen.proxy_port, 8080);
        assert_eq!(config.workspaces_dir(), PathBuf::from("/tmp/mimic/workspaces"));
        assert_eq!(config.localhost_alias.as_deref(), Some("host.docker.internal"));
        assert_eq!(config.values["API_KEY"], "sk-test-123456");
        assert_eq!(config.connection_pool.connect_timeout_secs, 2);
        assert_eq!(config.connection_pool.idle_timeout_secs, 90);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_validate_rejects_port_clash() {
        let mut config = Config::default();
        config.listen.admin_port = config.listen.proxy_port;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = Config {
            max_traffic_entries: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mimic.yaml");
        std::fs::write(&path, "listen:\n  proxy_port: 7000\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.listen.proxy_port, 7000);

        std::fs::write(&path, "listen: [").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse(_))));
        assert!(matches!(
            Config::from_file(dir.path().join("missing.yaml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Console);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
