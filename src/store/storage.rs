//! Local store trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use super::traits::{Record, StoreName};
use crate::db::Database;

/// Trait for local store backends.
///
/// Every operation may fail with a storage error; a failed write means the
/// value is not durable and the caller decides whether to retry or surface it.
pub trait LocalStore: Send + Sync {
  /// Get a single record by primary key.
  fn get<T: Record>(&self, key: &str) -> Result<Option<T>>;

  /// Get every record of a store in insertion order.
  fn get_all<T: Record>(&self) -> Result<Vec<T>>;

  /// Insert or replace a record. Replacing keeps its original position.
  fn put<T: Record>(&self, value: &T) -> Result<()>;

  /// Remove a record by primary key. Missing keys are not an error.
  fn remove(&self, store: StoreName, key: &str) -> Result<()>;

  /// Remove every record of a store.
  fn clear(&self, store: StoreName) -> Result<()>;

  /// Get records whose secondary index `index` equals `value`, in insertion order.
  fn get_by_index<T: Record>(&self, index: &str, value: &str) -> Result<Vec<T>>;

  /// Number of records in a store.
  fn count(&self, store: StoreName) -> Result<usize>;

  /// Replace the whole store with `values` in one transaction.
  fn replace_all<T: Record>(&self, values: &[T]) -> Result<()>;

  /// Replace every record matching `index = value` with `values` in one transaction.
  fn replace_by_index<T: Record>(&self, index: &str, value: &str, values: &[T]) -> Result<()>;
}

/// SQLite-based local store.
pub struct SqliteStore {
  db: Arc<Database>,
}

impl SqliteStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl LocalStore for SqliteStore {
  fn get<T: Record>(&self, key: &str) -> Result<Option<T>> {
    let conn = self.db.lock()?;
    let store = T::store();

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM records WHERE store = ? AND record_key = ?",
        params![store.as_str(), key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {} record {}: {}", store, key, e))?;

    data.map(|d| decode::<T>(&d)).transpose()
  }

  fn get_all<T: Record>(&self) -> Result<Vec<T>> {
    let conn = self.db.lock()?;
    let store = T::store();

    let mut stmt = conn
      .prepare("SELECT data FROM records WHERE store = ? ORDER BY seq")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<Vec<u8>> = stmt
      .query_map(params![store.as_str()], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query {}: {}", store, e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read {}: {}", store, e))?;

    rows.iter().map(|d| decode::<T>(d)).collect()
  }

  fn put<T: Record>(&self, value: &T) -> Result<()> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    write_record(&tx, value)?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))
  }

  fn remove(&self, store: StoreName, key: &str) -> Result<()> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    delete_record(&tx, store, key)?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))
  }

  fn clear(&self, store: StoreName) -> Result<()> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM record_indexes WHERE store = ?",
      params![store.as_str()],
    )
    .map_err(|e| eyre!("Failed to clear {} indexes: {}", store, e))?;
    tx.execute("DELETE FROM records WHERE store = ?", params![store.as_str()])
      .map_err(|e| eyre!("Failed to clear {}: {}", store, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))
  }

  fn get_by_index<T: Record>(&self, index: &str, value: &str) -> Result<Vec<T>> {
    let conn = self.db.lock()?;
    let store = T::store();

    let mut stmt = conn
      .prepare(
        "SELECT r.data FROM records r
         INNER JOIN record_indexes ri ON ri.store = r.store AND ri.record_key = r.record_key
         WHERE r.store = ? AND ri.index_name = ? AND ri.index_value = ?
         ORDER BY r.seq",
      )
      .map_err(|e| eyre!("Failed to prepare index query: {}", e))?;

    let rows: Vec<Vec<u8>> = stmt
      .query_map(params![store.as_str(), index, value], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query {} by {}: {}", store, index, e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read {} by {}: {}", store, index, e))?;

    rows.iter().map(|d| decode::<T>(d)).collect()
  }

  fn count(&self, store: StoreName) -> Result<usize> {
    let conn = self.db.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM records WHERE store = ?",
        params![store.as_str()],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count {}: {}", store, e))?;

    Ok(count as usize)
  }

  fn replace_all<T: Record>(&self, values: &[T]) -> Result<()> {
    self.replace(None, values)
  }

  fn replace_by_index<T: Record>(&self, index: &str, value: &str, values: &[T]) -> Result<()> {
    self.replace(Some((index, value)), values)
  }
}

impl SqliteStore {
  fn replace<T: Record>(&self, scope: Option<(&str, &str)>, values: &[T]) -> Result<()> {
    let mut conn = self.db.lock()?;
    let store = T::store();
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let stale_keys: Vec<String> = match scope {
      Some((index, value)) => {
        let mut stmt = tx
          .prepare(
            "SELECT record_key FROM record_indexes
             WHERE store = ? AND index_name = ? AND index_value = ?",
          )
          .map_err(|e| eyre!("Failed to prepare index query: {}", e))?;
        let keys = stmt
          .query_map(params![store.as_str(), index, value], |row| row.get(0))
          .map_err(|e| eyre!("Failed to query {} by {}: {}", store, index, e))?
          .collect::<rusqlite::Result<_>>()
          .map_err(|e| eyre!("Failed to read {} by {}: {}", store, index, e))?;
        keys
      }
      None => {
        let mut stmt = tx
          .prepare("SELECT record_key FROM records WHERE store = ?")
          .map_err(|e| eyre!("Failed to prepare query: {}", e))?;
        let keys = stmt
          .query_map(params![store.as_str()], |row| row.get(0))
          .map_err(|e| eyre!("Failed to query {}: {}", store, e))?
          .collect::<rusqlite::Result<_>>()
          .map_err(|e| eyre!("Failed to read {}: {}", store, e))?;
        keys
      }
    };

    // Keys that come back keep their row (and position); the rest are dropped
    let incoming: std::collections::HashSet<String> =
      values.iter().map(|v| v.record_key()).collect();
    for key in stale_keys.iter().filter(|k| !incoming.contains(*k)) {
      delete_record(&tx, store, key)?;
    }

    for value in values {
      write_record(&tx, value)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))
  }
}

fn write_record<T: Record>(conn: &Connection, value: &T) -> Result<()> {
  let store = T::store();
  let key = value.record_key();
  let data = serde_json::to_vec(value)
    .map_err(|e| eyre!("Failed to serialize {} record {}: {}", store, key, e))?;

  conn
    .execute(
      "INSERT INTO records (store, record_key, data, written_at)
       VALUES (?, ?, ?, datetime('now'))
       ON CONFLICT(store, record_key) DO UPDATE SET
         data = excluded.data,
         written_at = excluded.written_at",
      params![store.as_str(), key, data],
    )
    .map_err(|e| eyre!("Failed to write {} record {}: {}", store, key, e))?;

  conn
    .execute(
      "DELETE FROM record_indexes WHERE store = ? AND record_key = ?",
      params![store.as_str(), key],
    )
    .map_err(|e| eyre!("Failed to reset indexes for {}: {}", key, e))?;

  for (index, index_value) in value.index_values() {
    conn
      .execute(
        "INSERT OR REPLACE INTO record_indexes (store, index_name, index_value, record_key)
         VALUES (?, ?, ?, ?)",
        params![store.as_str(), index, index_value, key],
      )
      .map_err(|e| eyre!("Failed to index {} record {}: {}", store, key, e))?;
  }

  Ok(())
}

fn delete_record(conn: &Connection, store: StoreName, key: &str) -> Result<()> {
  conn
    .execute(
      "DELETE FROM record_indexes WHERE store = ? AND record_key = ?",
      params![store.as_str(), key],
    )
    .map_err(|e| eyre!("Failed to remove indexes for {}: {}", key, e))?;
  conn
    .execute(
      "DELETE FROM records WHERE store = ? AND record_key = ?",
      params![store.as_str(), key],
    )
    .map_err(|e| eyre!("Failed to remove {} record {}: {}", store, key, e))?;
  Ok(())
}

fn decode<T: Record>(data: &[u8]) -> Result<T> {
  serde_json::from_slice(data)
    .map_err(|e| eyre!("Failed to deserialize {} record: {}", T::store(), e))
}
