use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file '{path}': {source}")]
  Read {
    path: String,
    source: std::io::Error,
  },

  #[error("failed to parse config file '{path}': {source}")]
  Parse {
    path: String,
    source: toml::de::Error,
  },

  #[error("invalid config: {0}")]
  Invalid(String),
}

/// Log configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
  /// Log file path, if not set, logs will be printed to stdout
  pub file: Option<String>,
  /// Log level, default is "info"
  #[serde(default = "default_log_level")]
  pub level: String,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      file: None,
      level: default_log_level(),
    }
  }
}

/// Which record store implementation backs the server
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
  /// Durable RocksDB table
  #[default]
  Rocksdb,
  /// Process-local map, lost on exit
  Memory,
}

/// Record store configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
  #[serde(default)]
  pub backend: Backend,

  /// RocksDB data directory. Without it the rocksdb backend is unavailable.
  pub data_path: Option<String>,

  /// Table name (a column family in RocksDB)
  #[serde(default = "default_table")]
  pub table: String,

  /// Partition key shared by every record
  #[serde(default = "default_partition")]
  pub partition: String,

  /// Upper bound for a single store call, in milliseconds
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
}

fn default_table() -> String {
  "UserData".to_string()
}

fn default_partition() -> String {
  "Users".to_string()
}

fn default_timeout_ms() -> u64 {
  5000
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      backend: Backend::default(),
      data_path: None,
      table: default_table(),
      partition: default_partition(),
      timeout_ms: default_timeout_ms(),
    }
  }
}

impl StoreConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

/// RecordDB configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
  /// HTTP listening address
  #[serde(default = "default_server_addr")]
  pub server_addr: String,

  /// Log configuration
  #[serde(default)]
  pub log: LogConfig,

  /// Record store configuration
  #[serde(default)]
  pub store: StoreConfig,
}

fn default_server_addr() -> String {
  "0.0.0.0:8000".to_string()
}

impl Default for Config {
  fn default() -> Self {
    Self {
      server_addr: default_server_addr(),
      log: LogConfig::default(),
      store: StoreConfig::default(),
    }
  }
}

impl Config {
  /// Load configuration from TOML file
  pub fn from_file(path: &str) -> Result<Self, ConfigError> {
    let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_string(),
      source,
    })?;

    Self::from_toml(&config_str).map_err(|e| match e {
      ConfigError::Parse { source, .. } => ConfigError::Parse {
        path: path.to_string(),
        source,
      },
      other => other,
    })
  }

  /// Parse and validate configuration from a TOML string
  pub fn from_toml(config_str: &str) -> Result<Self, ConfigError> {
    let config: Config = toml::from_str(config_str).map_err(|source| ConfigError::Parse {
      path: "<inline>".to_string(),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.store.table.trim().is_empty() {
      return Err(ConfigError::Invalid("store.table must not be empty".into()));
    }
    if self.store.partition.is_empty() {
      return Err(ConfigError::Invalid(
        "store.partition must not be empty".into(),
      ));
    }
    if self.store.timeout_ms == 0 {
      return Err(ConfigError::Invalid(
        "store.timeout_ms must be greater than zero".into(),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config() {
    let config_str = r#"
server_addr = "127.0.0.1:9000"

[log]
level = "debug"

[store]
backend = "rocksdb"
data_path = "/tmp/recorddb/node1"
timeout_ms = 250
"#;

    let config = Config::from_toml(config_str).unwrap();
    assert_eq!(config.server_addr, "127.0.0.1:9000");
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.log.file, None);
    assert_eq!(config.store.backend, Backend::Rocksdb);
    assert_eq!(config.store.data_path.as_deref(), Some("/tmp/recorddb/node1"));
    assert_eq!(config.store.table, "UserData");
    assert_eq!(config.store.partition, "Users");
    assert_eq!(config.store.timeout(), Duration::from_millis(250));
  }

  #[test]
  fn test_empty_file_uses_defaults() {
    let config = Config::from_toml("").unwrap();
    assert_eq!(config.server_addr, "0.0.0.0:8000");
    assert_eq!(config.log.level, "info");
    assert_eq!(config.store.backend, Backend::Rocksdb);
    assert!(config.store.data_path.is_none());
    assert_eq!(config.store.timeout_ms, 5000);
  }

  #[test]
  fn test_memory_backend() {
    let config = Config::from_toml("[store]\nbackend = \"memory\"\n").unwrap();
    assert_eq!(config.store.backend, Backend::Memory);
  }

  #[test]
  fn test_rejects_zero_timeout() {
    let err = Config::from_toml("[store]\ntimeout_ms = 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
  }

  #[test]
  fn test_rejects_empty_table() {
    let err = Config::from_toml("[store]\ntable = \"  \"\n").unwrap_err();
    assert!(err.to_string().contains("store.table"));
  }

  #[test]
  fn test_missing_file() {
    let err = Config::from_file("/nonexistent/recorddb.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
  }

  #[test]
  fn test_parse_error_names_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "server_addr = [").unwrap();

    let path = path.to_str().unwrap();
    let err = Config::from_file(path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains(path));
  }
}
