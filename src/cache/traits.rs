//! Request and response types for the fetch cache.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// A request entering the fetch cache
#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub method: Method,
  pub url: Url,
}

impl FetchRequest {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
    }
  }
}

/// A response produced by the fetch cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  /// Where the response came from
  #[serde(skip, default = "default_source")]
  pub source: ResponseSource,
}

fn default_source() -> ResponseSource {
  ResponseSource::Cache
}

impl FetchResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn body_text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  /// Stand-in for a static asset that is neither cached nor reachable.
  pub fn offline_asset() -> Self {
    Self {
      status: 503,
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      body: b"Offline".to_vec(),
      source: ResponseSource::Synthetic,
    }
  }

  /// Stand-in for an API read that is neither cached nor reachable.
  pub fn offline_api() -> Self {
    let body = serde_json::json!({
      "error": "Network unavailable and no cached data",
      "offline": true,
    });
    Self {
      status: 503,
      headers: vec![("content-type".to_string(), "application/json".to_string())],
      body: body.to_string().into_bytes(),
      source: ResponseSource::Synthetic,
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network
  Network,
  /// Served from a named cache
  Cache,
  /// Generated locally because neither network nor cache could answer
  Synthetic,
}

/// Control messages from the host, mirroring the page-to-worker channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
  /// Activate the installed version now
  SkipWaiting,
  /// Drop every cache
  ClearCache,
  /// Fetch these URLs into the dynamic cache
  CacheUrls(Vec<Url>),
}
