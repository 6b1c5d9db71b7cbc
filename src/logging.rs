//! Tracing subscriber setup.
//!
//! The dashboard owns the terminal, so it logs to a daily rolling file.
//! One-shot commands log to stderr.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

const LOG_FILE_PREFIX: &str = "kbsync.log";

/// RUST_LOG wins over the configured level
fn env_filter(default_level: &str) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Log to stderr.
pub fn init_stderr_logging(config: &LogConfig, verbose: u8) -> Result<()> {
  let level = match verbose {
    0 => config.level.as_str(),
    1 => "debug",
    _ => "trace",
  };

  tracing_subscriber::fmt()
    .with_env_filter(env_filter(level))
    .with_target(false)
    .with_writer(std::io::stderr)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))
}

/// Log to `<dir>/kbsync.log.<date>`.
///
/// The returned guard flushes buffered lines on drop; keep it alive until exit.
pub fn init_file_logging(config: &LogConfig) -> Result<WorkerGuard> {
  let dir = match &config.dir {
    Some(dir) => dir.clone(),
    None => default_log_dir()?,
  };
  ensure_dir(&dir)?;

  let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter(&config.level))
    .with_ansi(false)
    .with_writer(writer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

/// $XDG_STATE_HOME/kbsync, falling back to the data directory
pub fn default_log_dir() -> Result<PathBuf> {
  dirs::state_dir()
    .or_else(dirs::data_local_dir)
    .map(|d| d.join("kbsync"))
    .ok_or_else(|| eyre!("Could not determine log directory"))
}

fn ensure_dir(dir: &Path) -> Result<()> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))
}
