//! Response cache trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::traits::{FetchResponse, ResponseSource};
use crate::db::Database;

/// Trait for named response cache backends.
pub trait ResponseCache: Send + Sync {
  /// Look up the stored response for a URL.
  fn lookup(&self, cache_name: &str, url: &str) -> Result<Option<FetchResponse>>;

  /// Store (or overwrite) the response for a URL.
  fn store(&self, cache_name: &str, url: &str, response: &FetchResponse) -> Result<()>;

  /// Names of every cache holding at least one entry.
  fn cache_names(&self) -> Result<Vec<String>>;

  /// Delete a whole cache, returning the number of entries removed.
  fn delete_cache(&self, cache_name: &str) -> Result<usize>;

  /// Number of entries in a cache.
  fn entry_count(&self, cache_name: &str) -> Result<usize>;
}

/// SQLite-based response cache.
pub struct SqliteResponseCache {
  db: Arc<Database>,
}

impl SqliteResponseCache {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl ResponseCache for SqliteResponseCache {
  fn lookup(&self, cache_name: &str, url: &str) -> Result<Option<FetchResponse>> {
    let conn = self.db.lock()?;

    let row: Option<(u16, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, headers, body FROM response_cache
         WHERE cache_name = ? AND url_hash = ?",
        params![cache_name, url_hash(url)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cached response for {}: {}", url, e))?;

    match row {
      Some((status, headers, body)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to decode cached headers for {}: {}", url, e))?;
        Ok(Some(FetchResponse {
          status,
          headers,
          body,
          source: ResponseSource::Cache,
        }))
      }
      None => Ok(None),
    }
  }

  fn store(&self, cache_name: &str, url: &str, response: &FetchResponse) -> Result<()> {
    let conn = self.db.lock()?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to encode headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (cache_name, url_hash, url, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![cache_name, url_hash(url), url, response.status, headers, response.body],
      )
      .map_err(|e| eyre!("Failed to cache response for {}: {}", url, e))?;

    Ok(())
  }

  fn cache_names(&self) -> Result<Vec<String>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT cache_name FROM response_cache ORDER BY cache_name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to list caches: {}", e))?;

    Ok(names)
  }

  fn delete_cache(&self, cache_name: &str) -> Result<usize> {
    let conn = self.db.lock()?;

    conn
      .execute(
        "DELETE FROM response_cache WHERE cache_name = ?",
        params![cache_name],
      )
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache_name, e))
  }

  fn entry_count(&self, cache_name: &str) -> Result<usize> {
    let conn = self.db.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM response_cache WHERE cache_name = ?",
        params![cache_name],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count cache {}: {}", cache_name, e))?;

    Ok(count as usize)
  }
}

/// SHA256 of the URL for stable, fixed-length keys
fn url_hash(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}
