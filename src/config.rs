use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the Kanban server, e.g. "https://kanban.example.com"
  pub url: String,
  /// Path probed by the manual connection check
  #[serde(default = "default_health_path")]
  pub health_path: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Bumping the version discards caches written by older versions
  #[serde(default = "default_cache_version")]
  pub version: u32,
  /// Path prefixes served network-first
  #[serde(default = "default_api_prefixes")]
  pub api_prefixes: Vec<String>,
  /// File extensions served cache-first (case-insensitive, no dot)
  #[serde(default = "default_static_extensions", deserialize_with = "deserialize_lowercase_vec")]
  pub static_extensions: Vec<String>,
  /// Paths fetched into the static cache on install
  #[serde(default)]
  pub precache: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: default_cache_version(),
      api_prefixes: default_api_prefixes(),
      static_extensions: default_static_extensions(),
      precache: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  /// Database file (default: $XDG_DATA_HOME/kbsync/store.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Default filter directive when RUST_LOG is unset
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Directory for dashboard log files (default: $XDG_STATE_HOME/kbsync)
  pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      dir: None,
    }
  }
}

fn default_health_path() -> String {
  "/api/health".to_string()
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_cache_version() -> u32 {
  1
}

fn default_api_prefixes() -> Vec<String> {
  vec!["/api/".to_string()]
}

fn default_static_extensions() -> Vec<String> {
  [
    "js", "css", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2", "ttf", "eot", "webp",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn deserialize_lowercase_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(
    v.into_iter()
      .map(|s| s.trim_start_matches('.').to_lowercase())
      .collect(),
  )
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./kbsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/kbsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/kbsync/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("kbsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("kbsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    // Fail early on a bad base URL instead of on the first request
    config.api_base()?;
    Ok(config)
  }

  /// Parsed API base URL.
  pub fn api_base(&self) -> Result<Url> {
    let url = Url::parse(&self.api.url).map_err(|e| eyre!("Invalid api.url {}: {}", self.api.url, e))?;
    match url.scheme() {
      "http" | "https" => Ok(url),
      other => Err(eyre!("Unsupported api.url scheme: {}", other)),
    }
  }

  /// Get the API session token from environment variables.
  ///
  /// Checks KBSYNC_API_TOKEN first, then KANBAN_API_TOKEN as fallback.
  /// The server may allow anonymous access, so a missing token is not an error.
  pub fn get_api_token() -> Option<String> {
    std::env::var("KBSYNC_API_TOKEN")
      .or_else(|_| std::env::var("KANBAN_API_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}
