//! Core traits and types for the local store.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// Named partitions of the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreName {
  Boards,
  Columns,
  Cards,
  PendingOperations,
  Settings,
}

impl StoreName {
  pub const ALL: [StoreName; 5] = [
    StoreName::Boards,
    StoreName::Columns,
    StoreName::Cards,
    StoreName::PendingOperations,
    StoreName::Settings,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      StoreName::Boards => "boards",
      StoreName::Columns => "columns",
      StoreName::Cards => "cards",
      StoreName::PendingOperations => "pending-operations",
      StoreName::Settings => "settings",
    }
  }
}

impl fmt::Display for StoreName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Trait for values that live in one of the named stores.
///
/// Implementors provide their primary key and the secondary index values
/// that `get_by_index` can look them up by.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Store this record type belongs to
  fn store() -> StoreName;

  /// Primary key within the store (`id`, or `key` for settings)
  fn record_key(&self) -> String;

  /// Secondary index entries as (index name, value) pairs
  fn index_values(&self) -> Vec<(&'static str, String)> {
    Vec::new()
  }
}

/// Result of a read that may have been served from the local store.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  /// Fresh data from the network (already written through to the store).
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  /// Network unavailable, serving the last stored snapshot.
  pub fn offline(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
    }
  }

  pub fn is_offline(&self) -> bool {
    self.source == CacheSource::Offline
  }
}

/// Indicates where data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Offline mode - network unavailable, serving stored data
  Offline,
}
