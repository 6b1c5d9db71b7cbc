use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::storage::LocalStore;
use super::traits::{Record, StoreName};

/// Settings key holding the time of the last completed sync pass
pub const LAST_SYNC: &str = "lastSync";

/// A key/value entry of the `settings` store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
  pub key: String,
  pub value: Value,
}

impl Record for Setting {
  fn store() -> StoreName {
    StoreName::Settings
  }

  fn record_key(&self) -> String {
    self.key.clone()
  }
}

pub fn get_setting<S: LocalStore, T: DeserializeOwned>(store: &S, key: &str) -> Result<Option<T>> {
  match store.get::<Setting>(key)? {
    Some(setting) => serde_json::from_value(setting.value)
      .map(Some)
      .map_err(|e| eyre!("Malformed setting {}: {}", key, e)),
    None => Ok(None),
  }
}

pub fn set_setting<S: LocalStore, T: Serialize>(store: &S, key: &str, value: &T) -> Result<()> {
  let value =
    serde_json::to_value(value).map_err(|e| eyre!("Failed to encode setting {}: {}", key, e))?;
  store.put(&Setting {
    key: key.to_string(),
    value,
  })
}

pub fn last_sync<S: LocalStore>(store: &S) -> Result<Option<DateTime<Utc>>> {
  get_setting(store, LAST_SYNC)
}
