//! Request handling
//!
//! Turns form and query parameters into record store calls and folds every
//! result, including store failures, into an [`Outcome`]. Nothing escapes
//! the handler as an error.

use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::store::{Fields, Record, RecordStore, StoreError};

/// Column names written for each form field
pub const COLUMN_NAME: &str = "Name";
pub const COLUMN_PHONE: &str = "Phone";
pub const COLUMN_ADDRESS: &str = "Address";

/// Body of `POST /save_user`
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct SaveUserForm {
  pub user_id: Option<String>,
  pub name: Option<String>,
  pub phone: Option<String>,
  pub address: Option<String>,
}

/// Query of `GET /get_user`
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct GetUserQuery {
  pub user_id: Option<String>,
}

/// Why a save did not go through
#[derive(Debug, Clone, PartialEq)]
pub enum SaveFailure {
  /// The id is already taken
  Duplicate,
  /// The store did not answer in time. The write may still land.
  Unconfirmed(Duration),
  /// Any other store error
  Store(StoreError),
}

/// Terminal state of one request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  Saved { id: String },
  SaveFailed { id: String, reason: SaveFailure },
  Found(Record),
  NotFound { id: String },
  LookupFailed { id: String, error: StoreError },
  ValidationError(String),
  StoreUnavailable,
}

impl Outcome {
  /// Message shown to the user. `Found` carries data instead of a message.
  pub fn message(&self) -> Option<String> {
    match self {
      Outcome::Saved { id } => Some(format!("User '{}' saved successfully!", id)),
      Outcome::SaveFailed {
        id,
        reason: SaveFailure::Duplicate,
      } => Some(format!("Error: User ID '{}' already exists.", id)),
      Outcome::SaveFailed {
        id,
        reason: SaveFailure::Unconfirmed(_),
      } => Some(format!(
        "Error: saving user '{}' timed out and may still complete. Look it up before retrying.",
        id
      )),
      Outcome::SaveFailed { id, .. } => Some(format!("Error: failed to save user '{}'.", id)),
      Outcome::Found(_) => None,
      Outcome::NotFound { id } => Some(format!("User ID '{}' not found.", id)),
      Outcome::LookupFailed { id, .. } => {
        Some(format!("Error: failed to look up user '{}'.", id))
      }
      Outcome::ValidationError(msg) => Some(msg.clone()),
      Outcome::StoreUnavailable => {
        Some("Storage is unavailable, please try again later.".to_string())
      }
    }
  }

  /// Store error behind a failed save or lookup
  pub fn store_error(&self) -> Option<&StoreError> {
    match self {
      Outcome::SaveFailed {
        reason: SaveFailure::Store(e),
        ..
      }
      | Outcome::LookupFailed { error: e, .. } => Some(e),
      _ => None,
    }
  }

  /// Whether the request reached its goal
  pub fn is_success(&self) -> bool {
    matches!(self, Outcome::Saved { .. } | Outcome::Found(_))
  }
}

/// Dispatches save and lookup requests to the record store
pub struct RequestHandler {
  /// `None` when the store failed to initialize
  store: Option<Arc<dyn RecordStore>>,
  timeout: Duration,
}

impl RequestHandler {
  pub fn new(store: Option<Arc<dyn RecordStore>>, timeout: Duration) -> Self {
    Self { store, timeout }
  }

  pub fn is_available(&self) -> bool {
    self.store.is_some()
  }

  /// Handle `POST /save_user`
  pub async fn save_user(&self, form: SaveUserForm) -> Outcome {
    let Some(store) = &self.store else {
      return Outcome::StoreUnavailable;
    };

    let id = match required(form.user_id, "User ID") {
      Ok(v) => v,
      Err(outcome) => return outcome,
    };
    let mut fields = Fields::new();
    for (column, value, label) in [
      (COLUMN_NAME, form.name, "Name"),
      (COLUMN_PHONE, form.phone, "Phone"),
      (COLUMN_ADDRESS, form.address, "Address"),
    ] {
      match required(value, label) {
        Ok(v) => fields.insert(column.to_string(), v),
        Err(outcome) => return outcome,
      };
    }

    // A create cut off here may still commit, so it is not reported as a
    // plain failure.
    let result = match tokio::time::timeout(self.timeout, store.create(&id, fields)).await {
      Ok(result) => result,
      Err(_) => {
        warn!("Save of user '{}' unconfirmed after {:?}", id, self.timeout);
        return Outcome::SaveFailed {
          id,
          reason: SaveFailure::Unconfirmed(self.timeout),
        };
      }
    };

    match result {
      Ok(_) => Outcome::Saved { id },
      Err(StoreError::DuplicateKey(_)) => Outcome::SaveFailed {
        id,
        reason: SaveFailure::Duplicate,
      },
      Err(e) => {
        warn!("Failed to save user '{}': {}", id, e);
        Outcome::SaveFailed {
          id,
          reason: SaveFailure::Store(e),
        }
      }
    }
  }

  /// Handle `GET /get_user`
  pub async fn get_user(&self, query: GetUserQuery) -> Outcome {
    let Some(store) = &self.store else {
      return Outcome::StoreUnavailable;
    };

    let id = match query.user_id.filter(|id| !id.is_empty()) {
      Some(id) => id,
      None => return Outcome::ValidationError("Please enter a User ID".to_string()),
    };

    match self.bounded(store.get(&id)).await {
      Ok(record) => Outcome::Found(record),
      Err(StoreError::NotFound(_)) => Outcome::NotFound { id },
      Err(e) => {
        warn!("Failed to look up user '{}': {}", id, e);
        Outcome::LookupFailed { id, error: e }
      }
    }
  }

  /// Run a lookup under the configured timeout
  async fn bounded<T>(
    &self,
    call: impl Future<Output = Result<T, StoreError>>,
  ) -> Result<T, StoreError> {
    match tokio::time::timeout(self.timeout, call).await {
      Ok(result) => result,
      Err(_) => {
        debug!("Store call exceeded {:?}", self.timeout);
        Err(StoreError::Timeout(self.timeout))
      }
    }
  }
}

fn required(value: Option<String>, label: &str) -> Result<String, Outcome> {
  match value {
    Some(v) if !v.is_empty() => Ok(v),
    _ => Err(Outcome::ValidationError(format!(
      "Please fill in the {} field",
      label
    ))),
  }
}
