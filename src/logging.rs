//! Logging bootstrap
//!
//! `RUST_LOG` wins over the configured level. When a log file is configured
//! output is appended there without ANSI colors, otherwise it goes to stdout.

use anyhow::{Context, anyhow};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Build the filter from `RUST_LOG`, falling back to `level`
fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
  match EnvFilter::try_from_default_env() {
    Ok(filter) => Ok(filter),
    Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level '{}'", level)),
  }
}

/// Install the global tracing subscriber
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
  let filter = env_filter(&config.level)?;
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .with_thread_ids(true);

  match &config.file {
    Some(path) => {
      let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file '{}'", path))?;
      builder
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {}", e))
    }
    None => builder
      .try_init()
      .map_err(|e| anyhow!("failed to install logger: {}", e)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_level_filter_accepts_known_levels() {
    for level in ["trace", "debug", "info", "warn", "error", "recorddb=debug"] {
      assert!(EnvFilter::try_new(level).is_ok(), "level {}", level);
    }
  }

  #[test]
  fn test_log_file_must_be_openable() {
    let config = LogConfig {
      file: Some("/nonexistent-dir/recorddb.log".to_string()),
      level: "info".to_string(),
    };
    let err = init(&config).unwrap_err();
    assert!(err.to_string().contains("failed to open log file"));
  }
}
