use crate::config::Config;
use crate::connectivity::ConnectivityMonitor;
use crate::kanban::types::{Board, Card, Column};
use crate::sync::HttpMethod;
use color_eyre::{eyre::eyre, Report, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

/// Kanban REST API client
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  token: Option<String>,
  monitor: ConnectivityMonitor,
}

impl ApiClient {
  pub fn new(base: Url, http: reqwest::Client, token: Option<String>, monitor: ConnectivityMonitor) -> Self {
    Self {
      http,
      base,
      token,
      monitor,
    }
  }

  /// Build the shared HTTP client from configuration
  pub fn http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .user_agent(concat!("kbsync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))
  }

  pub fn monitor(&self) -> &ConnectivityMonitor {
    &self.monitor
  }

  /// Resolve an endpoint such as "/api/cards" below the base URL's path
  pub fn resolve(&self, endpoint: &str) -> Result<Url> {
    join_below(&self.base, endpoint)
  }

  /// Get all boards
  pub async fn get_boards(&self) -> Result<Vec<Board>> {
    self.get_json("/api/boards").await
  }

  /// Get a single board
  pub async fn get_board(&self, board_id: &str) -> Result<Board> {
    self.get_json(&format!("/api/boards/{}", board_id)).await
  }

  /// Get the columns of a board
  pub async fn get_columns(&self, board_id: &str) -> Result<Vec<Column>> {
    let mut columns: Vec<Column> = self
      .get_json(&format!("/api/boards/{}/columns", board_id))
      .await?;
    columns.sort_by_key(|c| c.position);
    Ok(columns)
  }

  /// Get the cards of a column
  pub async fn get_cards(&self, column_id: &str) -> Result<Vec<Card>> {
    let mut cards: Vec<Card> = self
      .get_json(&format!("/api/columns/{}/cards", column_id))
      .await?;
    cards.sort_by_key(|c| c.position);
    Ok(cards)
  }

  /// Issue a mutation and return the HTTP status.
  ///
  /// Only transport failures are errors; any HTTP status is returned
  /// for the caller to classify.
  pub async fn send(&self, method: HttpMethod, endpoint: &str, data: Option<&Value>) -> Result<StatusCode> {
    let url = self.resolve(endpoint)?;
    let mut request = self.authorized(self.http.request(method.into(), url));
    if let Some(body) = data {
      request = request.json(body);
    }

    let started = Instant::now();
    match request.send().await {
      Ok(response) => {
        self.monitor.report_success(Some(started.elapsed()));
        Ok(response.status())
      }
      Err(e) => {
        self.monitor.report_failure();
        Err(Report::new(e).wrap_err(format!("{} {} failed", method, endpoint)))
      }
    }
  }

  async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
    let url = self.resolve(endpoint)?;
    let started = Instant::now();

    let response = match self.authorized(self.http.get(url)).send().await {
      Ok(response) => {
        self.monitor.report_success(Some(started.elapsed()));
        response
      }
      Err(e) => {
        self.monitor.report_failure();
        return Err(Report::new(e).wrap_err(format!("GET {} failed", endpoint)));
      }
    };

    let response = response
      .error_for_status()
      .map_err(|e| Report::new(e).wrap_err(format!("GET {} was rejected", endpoint)))?;

    response
      .json::<T>()
      .await
      .map_err(|e| Report::new(e).wrap_err(format!("Failed to read response from {}", endpoint)))
  }

  fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }
}

/// Join `path` onto `base` keeping any path prefix of `base`.
///
/// A leading slash in `path` is relative to the base, not the host root.
pub fn join_below(base: &Url, path: &str) -> Result<Url> {
  let mut base = base.clone();
  if !base.path().ends_with('/') {
    let dir = format!("{}/", base.path());
    base.set_path(&dir);
  }
  base
    .join(path.trim_start_matches('/'))
    .map_err(|e| eyre!("Invalid path {}: {}", path, e))
}

/// Whether an error means the server could not be reached at all
/// (as opposed to the server answering with an error).
pub fn is_network_error(err: &Report) -> bool {
  err
    .downcast_ref::<reqwest::Error>()
    .map(|e| !e.is_status() && !e.is_decode())
    .unwrap_or(false)
}
