use async_trait::async_trait;
use rocksdb::{
  DB, DEFAULT_COLUMN_FAMILY_NAME, ErrorKind, MultiThreaded, Options, TransactionDB,
  TransactionDBOptions,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{Fields, Record, RecordStore, StoreError, check_id};
use crate::encoding::{RowKey, RowValue};
use crate::util::now_ms;

type Db = TransactionDB<MultiThreaded>;

/// RocksDB-backed record store.
///
/// The table is a column family. Creates run in a pessimistic transaction
/// that takes an exclusive lock on the row key before checking for it, so of
/// two concurrent creates for one id the second waits for the first commit
/// and then sees the row.
///
/// Every create carries a deadline of `timeout` from the call. Row lock waits
/// are capped at the same timeout, and a transaction whose deadline has
/// passed is rolled back instead of committed, so a create reported as timed
/// out never lands later.
pub struct RocksStore {
  db: Arc<Db>,
  table: String,
  partition: String,
  timeout: Duration,
}

impl RocksStore {
  /// Open (or create) the database at `path` and make sure `table` exists.
  ///
  /// An already existing table is reused. Blocks on disk I/O.
  pub fn open(
    path: &str,
    table: &str,
    partition: &str,
    timeout: Duration,
  ) -> Result<Self, StoreError> {
    let mut opts = Options::default();
    opts.create_if_missing(true);

    let lock_timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
    let mut txn_opts = TransactionDBOptions::default();
    txn_opts.set_txn_lock_timeout(lock_timeout_ms);
    txn_opts.set_default_lock_timeout(lock_timeout_ms);

    // Every existing column family has to be named when opening.
    let existing = DB::list_cf(&opts, path)
      .unwrap_or_else(|_| vec![DEFAULT_COLUMN_FAMILY_NAME.to_string()]);
    let db: Db = TransactionDB::open_cf(&opts, &txn_opts, path, &existing)?;
    info!("Opened RocksDB at {} with {} column families", path, existing.len());

    if db.cf_handle(table).is_some() {
      info!("Table '{}' already exists", table);
    } else {
      db.create_cf(table, &Options::default())?;
      info!("Table '{}' created", table);
    }

    Ok(Self {
      db: Arc::new(db),
      table: table.to_string(),
      partition: partition.to_string(),
      timeout,
    })
  }

  fn create_blocking(
    db: &Db,
    table: &str,
    partition: &str,
    id: &str,
    fields: Fields,
    deadline: Instant,
  ) -> Result<Record, StoreError> {
    let started = Instant::now();
    let cf = db
      .cf_handle(table)
      .ok_or_else(|| StoreError::Unavailable(format!("table '{}' is missing", table)))?;
    let key = RowKey::new(partition, id).encode();
    let row = RowValue::new(fields, now_ms());
    let value = row.serialize()?;

    let txn = db.transaction();
    let existing = match txn.get_for_update_cf(&cf, &key, true) {
      Ok(existing) => existing,
      Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Busy) => {
        // Lost the row lock to a slow writer; its row may be there by now.
        txn.rollback()?;
        if db.get_cf(&cf, &key)?.is_some() {
          return Err(StoreError::DuplicateKey(id.to_string()));
        }
        return Err(StoreError::Timeout(deadline.saturating_duration_since(started)));
      }
      Err(e) => return Err(e.into()),
    };
    if existing.is_some() {
      txn.rollback()?;
      return Err(StoreError::DuplicateKey(id.to_string()));
    }
    txn.put_cf(&cf, &key, &value)?;

    if Instant::now() >= deadline {
      txn.rollback()?;
      warn!("Create of '{}' passed its deadline, rolled back", id);
      return Err(StoreError::Timeout(deadline.saturating_duration_since(started)));
    }
    txn.commit()?;
    debug!("Created row '{}' in {}/{}", id, table, partition);

    Ok(Record {
      partition: partition.to_string(),
      id: id.to_string(),
      fields: row.columns,
      timestamp_ms: row.timestamp_ms,
    })
  }

  fn get_blocking(db: &Db, table: &str, partition: &str, id: &str) -> Result<Record, StoreError> {
    let cf = db
      .cf_handle(table)
      .ok_or_else(|| StoreError::Unavailable(format!("table '{}' is missing", table)))?;
    let key = RowKey::new(partition, id).encode();
    let bytes = db
      .get_cf(&cf, &key)?
      .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    let row = RowValue::deserialize(&bytes)?;

    Ok(Record {
      partition: partition.to_string(),
      id: id.to_string(),
      fields: row.columns,
      timestamp_ms: row.timestamp_ms,
    })
  }
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
  StoreError::Backend(format!("store task failed: {}", e))
}

#[async_trait]
impl RecordStore for RocksStore {
  fn table(&self) -> &str {
    &self.table
  }

  fn partition(&self) -> &str {
    &self.partition
  }

  async fn create(&self, id: &str, fields: Fields) -> Result<Record, StoreError> {
    check_id(id)?;
    let db = Arc::clone(&self.db);
    let table = self.table.clone();
    let partition = self.partition.clone();
    let id = id.to_string();
    let deadline = Instant::now() + self.timeout;

    tokio::task::spawn_blocking(move || {
      Self::create_blocking(&db, &table, &partition, &id, fields, deadline)
    })
    .await
    .map_err(join_error)?
  }

  async fn get(&self, id: &str) -> Result<Record, StoreError> {
    check_id(id)?;
    let db = Arc::clone(&self.db);
    let table = self.table.clone();
    let partition = self.partition.clone();
    let id = id.to_string();

    tokio::task::spawn_blocking(move || Self::get_blocking(&db, &table, &partition, &id))
      .await
      .map_err(join_error)?
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ann() -> Fields {
    Fields::from([
      ("Name".to_string(), "Ann".to_string()),
      ("Phone".to_string(), "555".to_string()),
      ("Address".to_string(), "1 Rd".to_string()),
    ])
  }

  fn open(dir: &tempfile::TempDir) -> RocksStore {
    RocksStore::open(
      dir.path().to_str().unwrap(),
      "UserData",
      "Users",
      Duration::from_secs(5),
    )
    .unwrap()
  }

  #[tokio::test]
  async fn test_create_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    let created = store.create("u1", ann()).await.unwrap();
    let fetched = store.get("u1").await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.fields, ann());
  }

  #[tokio::test]
  async fn test_duplicate_keeps_first_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store.create("u1", ann()).await.unwrap();

    let other = Fields::from([("Name".to_string(), "Bob".to_string())]);
    assert_eq!(
      store.create("u1", other).await,
      Err(StoreError::DuplicateKey("u1".to_string()))
    );
    assert_eq!(store.get("u1").await.unwrap().fields, ann());
  }

  #[tokio::test]
  async fn test_get_missing_and_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    assert_eq!(
      store.get("missing").await,
      Err(StoreError::NotFound("missing".to_string()))
    );
    assert_eq!(store.get("").await, Err(StoreError::EmptyId));
    assert_eq!(store.create("", ann()).await, Err(StoreError::EmptyId));
  }

  #[tokio::test]
  async fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let created = {
      let store = open(&dir);
      store.create("u1", ann()).await.unwrap()
    };

    // Table already exists on the second open
    let store = open(&dir);
    assert_eq!(store.get("u1").await.unwrap(), created);
    assert!(matches!(
      store.create("u1", ann()).await,
      Err(StoreError::DuplicateKey(_))
    ));
  }

  #[tokio::test]
  async fn test_partitions_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    {
      let store = open(&dir);
      store.create("u1", ann()).await.unwrap();
    }
    let other = RocksStore::open(
      dir.path().to_str().unwrap(),
      "UserData",
      "Admins",
      Duration::from_secs(5),
    )
    .unwrap();
    assert!(matches!(
      other.get("u1").await,
      Err(StoreError::NotFound(_))
    ));
  }

  #[test]
  fn test_expired_deadline_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);

    let result =
      RocksStore::create_blocking(&store.db, "UserData", "Users", "late", ann(), Instant::now());
    assert!(matches!(result, Err(StoreError::Timeout(_))));
    assert!(matches!(
      RocksStore::get_blocking(&store.db, "UserData", "Users", "late"),
      Err(StoreError::NotFound(_))
    ));

    // The rolled back create leaves the id free
    let deadline = Instant::now() + Duration::from_secs(5);
    RocksStore::create_blocking(&store.db, "UserData", "Users", "late", ann(), deadline).unwrap();
  }

  #[test]
  fn test_lock_wait_times_out_then_sees_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(
      dir.path().to_str().unwrap(),
      "UserData",
      "Users",
      Duration::from_millis(50),
    )
    .unwrap();
    let cf = store.db.cf_handle("UserData").unwrap();
    let key = RowKey::new("Users", "held").encode();

    // A slow writer holds the row lock past the lock timeout, then commits.
    let holder = store.db.transaction();
    assert!(holder.get_for_update_cf(&cf, &key, true).unwrap().is_none());
    let row = RowValue::new(ann(), now_ms()).serialize().unwrap();
    holder.put_cf(&cf, &key, &row).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let waited = RocksStore::create_blocking(&store.db, "UserData", "Users", "held", ann(), deadline);
    assert!(matches!(waited, Err(StoreError::Timeout(_))));

    holder.commit().unwrap();
    let waited = RocksStore::create_blocking(&store.db, "UserData", "Users", "held", ann(), deadline);
    assert_eq!(waited, Err(StoreError::DuplicateKey("held".to_string())));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_creates_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open(&dir));

    let tasks = (0..8).map(|i| {
      let store = Arc::clone(&store);
      tokio::spawn(async move {
        let fields = Fields::from([("Name".to_string(), format!("writer-{}", i))]);
        store.create("same", fields).await
      })
    });
    let results = futures::future::join_all(tasks).await;

    let winners: Vec<_> = results
      .iter()
      .filter_map(|r| match r {
        Ok(Ok(record)) => Some(record.clone()),
        _ => None,
      })
      .collect();
    assert_eq!(winners.len(), 1);
    assert!(
      results
        .iter()
        .all(|r| matches!(r, Ok(Ok(_)) | Ok(Err(StoreError::DuplicateKey(_)))))
    );
    assert_eq!(store.get("same").await.unwrap(), winners[0]);
  }
}
