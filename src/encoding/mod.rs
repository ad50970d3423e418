//! Row encoding/decoding for storage
//!
//! This module provides the on-disk layout of record rows: the key that
//! addresses a row inside its partition and the versioned value holding the
//! row's columns.

pub mod row;

/// Current format version for all encoded rows
pub const CURRENT_VERSION: u8 = 1;

pub use row::{DecodeError, RowKey, RowValue};
