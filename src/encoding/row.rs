//! Row key and row value encoding

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Address of a row: partition key plus row key.
///
/// Encoded as `[partition_len: u32 BE][partition][row_key]` so that every
/// row of a partition shares one byte prefix and no separator byte has to be
/// reserved in either part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey<'a> {
  pub partition: &'a str,
  pub row_key: &'a str,
}

impl<'a> RowKey<'a> {
  pub fn new(partition: &'a str, row_key: &'a str) -> Self {
    Self { partition, row_key }
  }

  /// Serialize to bytes
  pub fn encode(&self) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + self.partition.len() + self.row_key.len());
    buf.extend_from_slice(&(self.partition.len() as u32).to_be_bytes());
    buf.extend_from_slice(self.partition.as_bytes());
    buf.extend_from_slice(self.row_key.as_bytes());
    buf
  }
}

/// Stored row value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowValue {
  /// Format version
  #[serde(rename = "v")]
  pub version: u8,
  /// Creation time in milliseconds (Unix timestamp)
  #[serde(rename = "Timestamp")]
  pub timestamp_ms: u64,
  /// Named string columns
  pub columns: BTreeMap<String, String>,
}

impl RowValue {
  /// Create a new RowValue at the current format version
  pub fn new(columns: BTreeMap<String, String>, timestamp_ms: u64) -> Self {
    Self {
      version: super::CURRENT_VERSION,
      timestamp_ms,
      columns,
    }
  }

  /// Serialize to bytes
  pub fn serialize(&self) -> Result<Vec<u8>, DecodeError> {
    serde_json::to_vec(self).map_err(|e| DecodeError::InvalidData(e.to_string()))
  }

  /// Deserialize from bytes, rejecting rows written by a newer format
  pub fn deserialize(bytes: &[u8]) -> Result<Self, DecodeError> {
    let value: RowValue =
      serde_json::from_slice(bytes).map_err(|e| DecodeError::InvalidData(e.to_string()))?;
    if value.version > super::CURRENT_VERSION {
      return Err(DecodeError::UnsupportedVersion {
        found: value.version,
        latest_supported: super::CURRENT_VERSION,
      });
    }
    Ok(value)
  }
}

/// Errors that can occur during encoding or decoding
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
  /// Input data is invalid or corrupted
  #[error("invalid data for decoding: {0}")]
  InvalidData(String),

  #[error("row format version {found} is newer than supported {latest_supported}")]
  UnsupportedVersion { found: u8, latest_supported: u8 },
}
