//! Record store
//!
//! A key-value table holding records under one fixed partition. Records are
//! created once and read by id; there is no update or delete.
//!
//! Two backends implement [`RecordStore`]: [`RocksStore`] keeps the table in a
//! RocksDB column family, [`MemoryStore`] keeps it in process memory.
//! Conflicting creates are resolved by the backend itself: the first writer
//! for an id wins and every later writer observes [`StoreError::DuplicateKey`].

mod memory;
mod rocks;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{Backend, StoreConfig};
use crate::encoding::DecodeError;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

/// Named string columns of a record
pub type Fields = BTreeMap<String, String>;

/// A stored record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
  /// Partition the record lives in
  pub partition: String,
  pub id: String,
  pub fields: Fields,
  /// Creation time in milliseconds, assigned by the store
  pub timestamp_ms: u64,
}

/// Record store errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
  #[error("record id must not be empty")]
  EmptyId,

  #[error("record '{0}' already exists")]
  DuplicateKey(String),

  #[error("record '{0}' not found")]
  NotFound(String),

  #[error("store call timed out after {0:?}")]
  Timeout(Duration),

  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("store backend error: {0}")]
  Backend(String),

  #[error("corrupt row: {0}")]
  Corrupt(#[from] DecodeError),
}

impl From<rocksdb::Error> for StoreError {
  fn from(e: rocksdb::Error) -> Self {
    StoreError::Backend(e.into_string())
  }
}

/// Existence-checked create and point lookup over a single partition
#[async_trait]
pub trait RecordStore: Send + Sync {
  /// Name of the table records live in
  fn table(&self) -> &str;

  /// Partition shared by every record
  fn partition(&self) -> &str;

  /// Insert a new record. Fails with `DuplicateKey` without touching the
  /// existing record when `id` is taken.
  async fn create(&self, id: &str, fields: Fields) -> Result<Record, StoreError>;

  /// Fetch the record stored under `id`
  async fn get(&self, id: &str) -> Result<Record, StoreError>;
}

/// Open the configured backend, creating its table if needed
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, StoreError> {
  match config.backend {
    Backend::Memory => {
      info!(
        "Using in-memory record store, table '{}' partition '{}'",
        config.table, config.partition
      );
      Ok(Arc::new(MemoryStore::new(&config.table, &config.partition)))
    }
    Backend::Rocksdb => {
      let path = config
        .data_path
        .clone()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| StoreError::Unavailable("no data path configured".to_string()))?;
      let table = config.table.clone();
      let partition = config.partition.clone();
      let timeout = config.timeout();

      let store = tokio::task::spawn_blocking(move || {
        RocksStore::open(&path, &table, &partition, timeout)
      })
      .await
      .map_err(|e| StoreError::Backend(format!("store open task failed: {}", e)))??;
      Ok(Arc::new(store))
    }
  }
}

fn check_id(id: &str) -> Result<(), StoreError> {
  if id.is_empty() {
    return Err(StoreError::EmptyId);
  }
  Ok(())
}
