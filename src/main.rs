mod app;
mod cache;
mod cli;
mod config;
mod connectivity;
mod db;
mod event;
mod kanban;
mod logging;
mod services;
mod store;
mod sync;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kbsync")]
#[command(about = "Offline-first sync client for a Kanban board server")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/kbsync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// More log output on stderr (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: Option<cli::Command>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  match args.command.unwrap_or(cli::Command::Dashboard) {
    cli::Command::Dashboard => {
      // The terminal belongs to the UI; flushed when the guard drops
      let _guard = logging::init_file_logging(&config.log)?;
      tracing::info!(version = env!("CARGO_PKG_VERSION"), "dashboard starting");

      let mut app = app::App::new(config)?;
      app.run().await?;
    }
    command => {
      logging::init_stderr_logging(&config.log, args.verbose)?;
      let services = services::Services::build(config, None)?;
      cli::run(&services, command).await?;
    }
  }

  Ok(())
}
