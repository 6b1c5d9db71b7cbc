//! Fetch cache that applies a caching strategy per request.

use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use url::Url;

use super::storage::ResponseCache;
use super::strategy::{Router, Strategy};
use super::traits::{FetchRequest, FetchResponse, ResponseSource, WorkerMessage};

/// Versioned names of the three caches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  pub static_assets: String,
  pub api: String,
  pub dynamic: String,
}

impl CacheNames {
  pub fn for_version(version: u32) -> Self {
    Self {
      static_assets: format!("kbsync-static-v{}", version),
      api: format!("kbsync-api-v{}", version),
      dynamic: format!("kbsync-dynamic-v{}", version),
    }
  }

  pub fn all(&self) -> [&str; 3] {
    [&self.static_assets, &self.api, &self.dynamic]
  }

  fn for_strategy(&self, strategy: Strategy) -> Option<&str> {
    match strategy {
      Strategy::CacheFirst => Some(&self.static_assets),
      Strategy::NetworkFirst => Some(&self.api),
      Strategy::StaleWhileRevalidate => Some(&self.dynamic),
      Strategy::Passthrough => None,
    }
  }
}

/// Lifecycle of a cache version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Installing,
  /// Installed, older caches not yet cleaned up
  Waiting,
  Active,
}

/// Intercepts GET requests and answers them from network and/or cache.
///
/// Network failures never surface as errors: every intercepted request
/// gets a response, falling back to cached or synthetic content.
pub struct FetchCache<C: ResponseCache> {
  cache: Arc<C>,
  http: reqwest::Client,
  router: Arc<Router>,
  names: Arc<CacheNames>,
  precache: Arc<Vec<Url>>,
  state: Arc<Mutex<WorkerState>>,
}

impl<C: ResponseCache + 'static> FetchCache<C> {
  pub fn new(cache: C, http: reqwest::Client, router: Router, version: u32) -> Self {
    Self {
      cache: Arc::new(cache),
      http,
      router: Arc::new(router),
      names: Arc::new(CacheNames::for_version(version)),
      precache: Arc::new(Vec::new()),
      state: Arc::new(Mutex::new(WorkerState::Installing)),
    }
  }

  /// URLs fetched into the static cache on install.
  pub fn with_precache(mut self, urls: Vec<Url>) -> Self {
    self.precache = Arc::new(urls);
    self
  }

  #[cfg(test)]
  pub fn names(&self) -> &CacheNames {
    &self.names
  }

  pub fn state(&self) -> WorkerState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(WorkerState::Installing)
  }

  fn set_state(&self, state: WorkerState) -> Result<()> {
    let mut current = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *current = state;
    Ok(())
  }

  /// Entry count of every stored cache, including other versions.
  pub fn stats(&self) -> Result<Vec<(String, usize)>> {
    self
      .cache
      .cache_names()?
      .into_iter()
      .map(|name| {
        let entries = self.cache.entry_count(&name)?;
        Ok((name, entries))
      })
      .collect()
  }

  /// Install then activate this cache version.
  pub async fn start(&self) -> Result<()> {
    self.install().await?;
    self.activate()?;
    Ok(())
  }

  /// Pre-cache the static asset list.
  ///
  /// Individual fetch failures are logged; install still completes.
  pub async fn install(&self) -> Result<()> {
    self.set_state(WorkerState::Installing)?;

    let name = self.names.static_assets.clone();
    let fetches = self.precache.iter().map(|url| {
      let name = name.clone();
      async move {
        match self.fetch_network(url).await {
          Ok(response) if response.is_success() => self.put(&name, url, &response),
          Ok(response) => tracing::warn!(%url, status = response.status, "precache skipped"),
          Err(e) => tracing::warn!(%url, error = %e, "precache failed"),
        }
      }
    });
    futures::future::join_all(fetches).await;

    self.set_state(WorkerState::Waiting)?;
    tracing::info!(urls = self.precache.len(), cache = %name, "fetch cache installed");
    Ok(())
  }

  /// Delete caches left behind by other versions and start serving.
  ///
  /// Returns the names of the deleted caches.
  pub fn activate(&self) -> Result<Vec<String>> {
    let current = self.names.all();
    let mut deleted = Vec::new();

    for name in self.cache.cache_names()? {
      if !current.contains(&name.as_str()) {
        let entries = self.cache.delete_cache(&name)?;
        tracing::info!(cache = %name, entries, "deleted outdated cache");
        deleted.push(name);
      }
    }

    self.set_state(WorkerState::Active)?;
    Ok(deleted)
  }

  /// Handle a control message from the host.
  pub async fn handle_message(&self, message: WorkerMessage) -> Result<()> {
    match message {
      WorkerMessage::SkipWaiting => {
        if self.state() != WorkerState::Active {
          self.activate()?;
        }
      }
      WorkerMessage::ClearCache => {
        for name in self.cache.cache_names()? {
          self.cache.delete_cache(&name)?;
        }
        tracing::info!("cleared all caches");
      }
      WorkerMessage::CacheUrls(urls) => {
        let name = self.names.dynamic.clone();
        let fetches = urls.iter().map(|url| {
          let name = name.clone();
          async move {
            match self.fetch_network(url).await {
              Ok(response) if response.is_success() => self.put(&name, url, &response),
              Ok(_) | Err(_) => tracing::debug!(%url, "could not warm cache"),
            }
          }
        });
        futures::future::join_all(fetches).await;
      }
    }
    Ok(())
  }

  /// Answer a request, or None if it is not intercepted
  /// (non-GET or non-http(s)); the caller then goes to the network itself.
  pub async fn handle(&self, request: &FetchRequest) -> Option<FetchResponse> {
    let strategy = self.router.route(&request.method, &request.url);
    let cache_name = self.names.for_strategy(strategy)?.to_string();
    tracing::debug!(url = %request.url, ?strategy, "fetch intercepted");

    let response = match strategy {
      Strategy::CacheFirst => self.cache_first(&cache_name, &request.url).await,
      Strategy::NetworkFirst => self.network_first(&cache_name, &request.url).await,
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(&cache_name, &request.url).await,
      Strategy::Passthrough => return None,
    };
    Some(response)
  }

  async fn cache_first(&self, cache_name: &str, url: &Url) -> FetchResponse {
    if let Some(cached) = self.lookup(cache_name, url) {
      return cached;
    }

    match self.fetch_network(url).await {
      Ok(response) => {
        if response.is_success() {
          self.put(cache_name, url, &response);
        }
        response
      }
      Err(e) => {
        tracing::debug!(%url, error = %e, "static asset unavailable");
        FetchResponse::offline_asset()
      }
    }
  }

  async fn network_first(&self, cache_name: &str, url: &Url) -> FetchResponse {
    match self.fetch_network(url).await {
      Ok(response) => {
        if response.is_success() {
          self.put(cache_name, url, &response);
        }
        response
      }
      Err(e) => {
        tracing::debug!(%url, error = %e, "network failed, trying cache");
        self
          .lookup(cache_name, url)
          .unwrap_or_else(FetchResponse::offline_api)
      }
    }
  }

  async fn stale_while_revalidate(&self, cache_name: &str, url: &Url) -> FetchResponse {
    if let Some(cached) = self.lookup(cache_name, url) {
      // Refresh for next time; the caller gets the cached copy regardless
      let this = self.clone();
      let cache_name = cache_name.to_string();
      let url = url.clone();
      tokio::spawn(async move {
        match this.fetch_network(&url).await {
          Ok(response) if response.is_success() => this.put(&cache_name, &url, &response),
          Ok(response) => tracing::debug!(%url, status = response.status, "revalidation not cached"),
          Err(e) => tracing::debug!(%url, error = %e, "revalidation failed"),
        }
      });
      return cached;
    }

    match self.fetch_network(url).await {
      Ok(response) => {
        if response.is_success() {
          self.put(cache_name, url, &response);
        }
        response
      }
      Err(e) => {
        tracing::debug!(%url, error = %e, "page unavailable");
        FetchResponse::offline_asset()
      }
    }
  }

  async fn fetch_network(&self, url: &Url) -> Result<FetchResponse> {
    let response = self.http.get(url.clone()).send().await?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
      .collect();
    let body = response.bytes().await?.to_vec();

    Ok(FetchResponse {
      status,
      headers,
      body,
      source: ResponseSource::Network,
    })
  }

  /// Cache read; storage errors count as a miss
  fn lookup(&self, cache_name: &str, url: &Url) -> Option<FetchResponse> {
    match self.cache.lookup(cache_name, url.as_str()) {
      Ok(hit) => hit,
      Err(e) => {
        tracing::warn!(%url, error = %e, "cache read failed");
        None
      }
    }
  }

  /// Cache write; storage errors are logged and dropped
  fn put(&self, cache_name: &str, url: &Url, response: &FetchResponse) {
    if let Err(e) = self.cache.store(cache_name, url.as_str(), response) {
      tracing::warn!(%url, error = %e, "cache write failed");
    }
  }
}

impl<C: ResponseCache> Clone for FetchCache<C> {
  fn clone(&self) -> Self {
    Self {
      cache: Arc::clone(&self.cache),
      http: self.http.clone(),
      router: Arc::clone(&self.router),
      names: Arc::clone(&self.names),
      precache: Arc::clone(&self.precache),
      state: Arc::clone(&self.state),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteResponseCache;
  use crate::config::CacheConfig;
  use crate::db::Database;
  use std::time::Duration;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn fetch_cache() -> FetchCache<SqliteResponseCache> {
    fetch_cache_with(Arc::new(Database::open_in_memory().unwrap()), 1)
  }

  fn fetch_cache_with(db: Arc<Database>, version: u32) -> FetchCache<SqliteResponseCache> {
    FetchCache::new(
      SqliteResponseCache::new(db),
      reqwest::Client::new(),
      Router::from_config(&CacheConfig::default()),
      version,
    )
  }

  fn url(base: &str, p: &str) -> Url {
    Url::parse(base).unwrap().join(p).unwrap()
  }

  fn cached(body: &str) -> FetchResponse {
    FetchResponse {
      status: 200,
      headers: Vec::new(),
      body: body.as_bytes().to_vec(),
      source: ResponseSource::Network,
    }
  }

  #[tokio::test]
  async fn test_cache_first_hit_makes_no_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_body_string("from network"))
      .expect(0)
      .mount(&server)
      .await;

    let fc = fetch_cache();
    let asset = url(&server.uri(), "/assets/app.js");
    fc.put(&fc.names().static_assets, &asset, &cached("from cache"));

    let response = fc.handle(&FetchRequest::get(asset)).await.unwrap();

    assert_eq!(response.body_text(), "from cache");
    assert_eq!(response.source, ResponseSource::Cache);
  }

  #[tokio::test]
  async fn test_cache_first_miss_fetches_and_stores() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/logo.png"))
      .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
      .expect(1)
      .mount(&server)
      .await;

    let fc = fetch_cache();
    let asset = url(&server.uri(), "/logo.png");

    let first = fc.handle(&FetchRequest::get(asset.clone())).await.unwrap();
    let second = fc.handle(&FetchRequest::get(asset)).await.unwrap();

    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.body, vec![1u8, 2, 3]);
  }

  #[tokio::test]
  async fn test_cache_first_offline_miss_is_503() {
    let fc = fetch_cache();
    let response = fc
      .handle(&FetchRequest::get(url("http://127.0.0.1:1", "/app.css")))
      .await
      .unwrap();

    assert_eq!(response.status, 503);
    assert_eq!(response.source, ResponseSource::Synthetic);
  }

  #[tokio::test]
  async fn test_cache_first_does_not_store_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(404))
      .expect(2)
      .mount(&server)
      .await;

    let fc = fetch_cache();
    let asset = url(&server.uri(), "/missing.js");

    assert_eq!(fc.handle(&FetchRequest::get(asset.clone())).await.unwrap().status, 404);
    assert_eq!(fc.handle(&FetchRequest::get(asset)).await.unwrap().status, 404);
  }

  #[tokio::test]
  async fn test_network_first_overwrites_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/boards"))
      .respond_with(ResponseTemplate::new(200).set_body_string("[\"fresh\"]"))
      .mount(&server)
      .await;

    let fc = fetch_cache();
    let api = url(&server.uri(), "/api/boards");
    fc.put(&fc.names().api, &api, &cached("[\"old\"]"));

    let response = fc.handle(&FetchRequest::get(api.clone())).await.unwrap();

    assert_eq!(response.body_text(), "[\"fresh\"]");
    assert_eq!(response.source, ResponseSource::Network);
    let stored = fc.lookup(&fc.names().api, &api).unwrap();
    assert_eq!(stored.body_text(), "[\"fresh\"]");
  }

  #[tokio::test]
  async fn test_network_first_falls_back_to_cache() {
    let fc = fetch_cache();
    let api = url("http://127.0.0.1:1", "/api/boards");
    fc.put(&fc.names().api, &api, &cached("[\"old\"]"));

    let response = fc.handle(&FetchRequest::get(api)).await.unwrap();

    assert_eq!(response.body_text(), "[\"old\"]");
    assert_eq!(response.source, ResponseSource::Cache);
  }

  #[tokio::test]
  async fn test_network_first_offline_miss_is_json_error() {
    let fc = fetch_cache();
    let response = fc
      .handle(&FetchRequest::get(url("http://127.0.0.1:1", "/api/boards")))
      .await
      .unwrap();

    assert_eq!(response.status, 503);
    assert_eq!(response.header("content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["offline"], true);
  }

  #[tokio::test]
  async fn test_stale_while_revalidate_returns_cached_then_refreshes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/boards/1"))
      .respond_with(ResponseTemplate::new(200).set_body_string("new page"))
      .expect(1)
      .mount(&server)
      .await;

    let fc = fetch_cache();
    let page = url(&server.uri(), "/boards/1");
    fc.put(&fc.names().dynamic, &page, &cached("old page"));

    let response = fc.handle(&FetchRequest::get(page.clone())).await.unwrap();
    assert_eq!(response.body_text(), "old page");
    assert_eq!(response.source, ResponseSource::Cache);

    // Background refresh lands in the cache for next time
    let mut refreshed = false;
    for _ in 0..50 {
      if fc.lookup(&fc.names().dynamic, &page).map(|r| r.body_text()) == Some("new page".to_string()) {
        refreshed = true;
        break;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(refreshed);
  }

  #[tokio::test]
  async fn test_stale_while_revalidate_miss_waits_for_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_string("page")
          .set_delay(Duration::from_millis(50)),
      )
      .mount(&server)
      .await;

    let fc = fetch_cache();
    let response = fc
      .handle(&FetchRequest::get(url(&server.uri(), "/")))
      .await
      .unwrap();

    assert_eq!(response.body_text(), "page");
    assert_eq!(response.source, ResponseSource::Network);
  }

  #[tokio::test]
  async fn test_passthrough_is_not_intercepted() {
    let fc = fetch_cache();
    let post = FetchRequest {
      method: reqwest::Method::POST,
      url: url("https://app.test", "/api/cards"),
    };
    let file = FetchRequest::get(Url::parse("file:///tmp/a.js").unwrap());

    assert!(fc.handle(&post).await.is_none());
    assert!(fc.handle(&file).await.is_none());
  }

  #[tokio::test]
  async fn test_activate_removes_other_versions() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let old = fetch_cache_with(Arc::clone(&db), 1);
    let page = url("https://app.test", "/");
    old.put(&old.names().dynamic, &page, &cached("v1"));

    let new = fetch_cache_with(db, 2);
    new.put(&new.names().dynamic, &page, &cached("v2"));
    let deleted = new.activate().unwrap();

    assert_eq!(deleted, vec!["kbsync-dynamic-v1".to_string()]);
    assert_eq!(new.state(), WorkerState::Active);
    assert!(new.lookup(&new.names().dynamic, &page).is_some());
  }

  #[tokio::test]
  async fn test_install_precaches_and_skip_waiting_activates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/manifest.json"))
      .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
      .mount(&server)
      .await;

    let manifest = url(&server.uri(), "/manifest.json");
    let broken = url("http://127.0.0.1:1", "/gone.js");
    let fc = fetch_cache().with_precache(vec![manifest.clone(), broken]);

    fc.install().await.unwrap();
    assert_eq!(fc.state(), WorkerState::Waiting);
    assert!(fc.lookup(&fc.names().static_assets, &manifest).is_some());

    fc.handle_message(WorkerMessage::SkipWaiting).await.unwrap();
    assert_eq!(fc.state(), WorkerState::Active);
  }

  #[tokio::test]
  async fn test_clear_cache_and_cache_urls_messages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_body_string("warm"))
      .mount(&server)
      .await;

    let fc = fetch_cache();
    let page = url(&server.uri(), "/boards/7");

    fc.handle_message(WorkerMessage::CacheUrls(vec![page.clone()]))
      .await
      .unwrap();
    assert_eq!(fc.lookup(&fc.names().dynamic, &page).unwrap().body_text(), "warm");

    assert_eq!(fc.stats().unwrap(), vec![("kbsync-dynamic-v1".to_string(), 1)]);

    fc.handle_message(WorkerMessage::ClearCache).await.unwrap();
    assert!(fc.lookup(&fc.names().dynamic, &page).is_none());
    assert!(fc.stats().unwrap().is_empty());
  }
}
