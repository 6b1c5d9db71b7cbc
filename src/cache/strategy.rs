//! Route selection: which caching policy applies to a request.

use reqwest::Method;
use url::Url;

use crate::config::CacheConfig;

/// Caching policy for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Serve from cache, hit the network only on a miss
  CacheFirst,
  /// Hit the network, fall back to cache on failure
  NetworkFirst,
  /// Serve from cache and refresh it in the background
  StaleWhileRevalidate,
  /// Not intercepted
  Passthrough,
}

/// Maps requests to strategies by URL
#[derive(Debug, Clone)]
pub struct Router {
  api_prefixes: Vec<String>,
  static_extensions: Vec<String>,
}

impl Router {
  pub fn new(api_prefixes: Vec<String>, static_extensions: Vec<String>) -> Self {
    Self {
      api_prefixes,
      static_extensions,
    }
  }

  pub fn from_config(config: &CacheConfig) -> Self {
    Self::new(config.api_prefixes.clone(), config.static_extensions.clone())
  }

  pub fn route(&self, method: &Method, url: &Url) -> Strategy {
    if *method != Method::GET || !matches!(url.scheme(), "http" | "https") {
      return Strategy::Passthrough;
    }

    if self.is_static_asset(url) {
      Strategy::CacheFirst
    } else if self.is_api(url) {
      Strategy::NetworkFirst
    } else {
      Strategy::StaleWhileRevalidate
    }
  }

  fn is_static_asset(&self, url: &Url) -> bool {
    let last_segment = url.path().rsplit('/').next().unwrap_or("");
    match last_segment.rsplit_once('.') {
      Some((stem, ext)) if !stem.is_empty() => {
        let ext = ext.to_lowercase();
        self.static_extensions.iter().any(|e| *e == ext)
      }
      _ => false,
    }
  }

  fn is_api(&self, url: &Url) -> bool {
    let path = url.path();
    self.api_prefixes.iter().any(|prefix| {
      path.starts_with(prefix.as_str())
        // "/api/" also matches the bare "/api"
        || path == prefix.trim_end_matches('/')
    })
  }
}
