//! Wiring of the long-lived components.
//!
//! Everything shares one database handle, one HTTP client and one
//! connectivity monitor. Built once in `main` and handed to the command
//! runners or the dashboard.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

use crate::cache::{FetchCache, Router, SqliteResponseCache};
use crate::config::Config;
use crate::connectivity::ConnectivityMonitor;
use crate::db::Database;
use crate::kanban::{join_below, ApiClient, OfflineApi};
use crate::store::SqliteStore;
use crate::sync::{SyncEngine, SyncEvent};

pub struct Services {
  pub config: Config,
  pub store: Arc<SqliteStore>,
  pub monitor: ConnectivityMonitor,
  pub api: OfflineApi<SqliteStore>,
  pub sync: Arc<SyncEngine<SqliteStore>>,
  pub fetch: FetchCache<SqliteResponseCache>,
}

impl Services {
  /// Open the database and build every component.
  ///
  /// Sync progress is forwarded to `progress` when given.
  pub fn build(config: Config, progress: Option<mpsc::UnboundedSender<SyncEvent>>) -> Result<Self> {
    let db = Arc::new(Database::open(config.store.path.as_deref())?);
    let store = Arc::new(SqliteStore::new(Arc::clone(&db)));

    let base = config.api_base()?;
    let http = ApiClient::http_client(&config)?;
    let health_url = join_below(&base, &config.api.health_path)?;
    let monitor = ConnectivityMonitor::new(http.clone(), health_url);

    let client = ApiClient::new(base.clone(), http.clone(), Config::get_api_token(), monitor.clone());
    let api = OfflineApi::new(client.clone(), Arc::clone(&store));

    let mut engine = SyncEngine::new(Arc::clone(&store), client);
    if let Some(tx) = progress {
      engine = engine.with_progress(tx);
    }

    let precache = config
      .cache
      .precache
      .iter()
      .map(|p| join_below(&base, p))
      .collect::<Result<Vec<_>>>()?;
    let fetch = FetchCache::new(
      SqliteResponseCache::new(db),
      http,
      Router::from_config(&config.cache),
      config.cache.version,
    )
    .with_precache(precache);

    Ok(Self {
      config,
      store,
      monitor,
      api,
      sync: Arc::new(engine),
      fetch,
    })
  }

  /// Resolve a user-supplied URL or path against the API base.
  pub fn resolve_url(&self, input: &str) -> Result<Url> {
    match Url::parse(input) {
      Ok(url) => Ok(url),
      Err(url::ParseError::RelativeUrlWithoutBase) => join_below(&self.config.api_base()?, input),
      Err(e) => Err(eyre!("Invalid URL {}: {}", input, e)),
    }
  }
}
