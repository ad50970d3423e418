use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::RwLock;

use super::{Fields, Record, RecordStore, StoreError, check_id};
use crate::util::now_ms;

/// In-memory record store
pub struct MemoryStore {
  table: String,
  partition: String,
  data: RwLock<HashMap<String, Record>>,
}

impl MemoryStore {
  /// Create a new empty store
  pub fn new(table: impl Into<String>, partition: impl Into<String>) -> Self {
    Self {
      table: table.into(),
      partition: partition.into(),
      data: RwLock::new(HashMap::new()),
    }
  }

  fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new("UserData", "Users")
  }
}

#[async_trait]
impl RecordStore for MemoryStore {
  fn table(&self) -> &str {
    &self.table
  }

  fn partition(&self) -> &str {
    &self.partition
  }

  async fn create(&self, id: &str, fields: Fields) -> Result<Record, StoreError> {
    check_id(id)?;
    let mut data = self.data.write().map_err(|_| Self::poisoned())?;
    match data.entry(id.to_string()) {
      Entry::Occupied(_) => Err(StoreError::DuplicateKey(id.to_string())),
      Entry::Vacant(slot) => {
        let record = Record {
          partition: self.partition.clone(),
          id: id.to_string(),
          fields,
          timestamp_ms: now_ms(),
        };
        slot.insert(record.clone());
        Ok(record)
      }
    }
  }

  async fn get(&self, id: &str) -> Result<Record, StoreError> {
    check_id(id)?;
    let data = self.data.read().map_err(|_| Self::poisoned())?;
    data
      .get(id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(id.to_string()))
  }
}
