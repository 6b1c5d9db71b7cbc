//! One-shot subcommands.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use serde_json::{Map, Value};

use crate::cache::{FetchRequest, ResponseSource, WorkerMessage};
use crate::kanban::types::{Card, Column};
use crate::kanban::WriteOutcome;
use crate::services::Services;
use crate::store::{last_sync, CacheResult, LocalStore, StoreName};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Interactive terminal dashboard (default)
  Dashboard,
  /// Show connectivity, pending operations and cache usage
  Status,
  /// Probe the server once
  Check,
  /// Replay pending operations now
  Sync,
  /// Inspect or drop the pending operation queue
  #[command(subcommand)]
  Queue(QueueCommand),
  /// List boards
  Boards,
  /// List the columns of a board
  Columns { board: String },
  /// List the cards of a column
  Cards { column: String },
  /// Create, edit, move or delete cards
  #[command(subcommand)]
  Card(CardCommand),
  /// Create or move columns
  #[command(subcommand)]
  Column(ColumnCommand),
  /// Rename a board
  Rename { board: String, title: String },
  /// Fetch a URL through the offline cache
  Fetch {
    /// Absolute URL or path relative to the API base
    url: String,
    /// Print headers only
    #[arg(long)]
    head: bool,
  },
  /// Manage the fetch cache
  #[command(subcommand)]
  Cache(CacheCommand),
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
  /// List pending operations in replay order
  List,
  /// Drop every pending operation without sending it
  Clear,
}

#[derive(Subcommand, Debug)]
pub enum CardCommand {
  /// Add a card at the end of a column
  Create {
    column: String,
    title: String,
    #[arg(short, long)]
    description: Option<String>,
  },
  /// Change a card's title or description
  Edit {
    card: String,
    #[arg(short, long)]
    title: Option<String>,
    #[arg(short, long)]
    description: Option<String>,
  },
  /// Move a card to a position in a column
  Move { card: String, column: String, index: usize },
  /// Attach a label
  Label {
    card: String,
    name: String,
    #[arg(short, long)]
    color: Option<String>,
  },
  /// Delete a card
  Delete { card: String },
}

#[derive(Subcommand, Debug)]
pub enum ColumnCommand {
  /// Add a column at the end of a board
  Create { board: String, title: String },
  /// Move a column to a position within its board
  Move { column: String, index: usize },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// Pre-cache configured assets and drop caches from other versions
  Install,
  /// Drop every cached response
  Clear,
  /// Fetch URLs into the dynamic cache
  Warm { urls: Vec<String> },
  /// Entry counts per cache
  Stats,
}

pub async fn run(services: &Services, command: Command) -> Result<()> {
  match command {
    Command::Dashboard => Err(eyre!("The dashboard is started from main")),
    Command::Status => status(services).await,
    Command::Check => check(services).await,
    Command::Sync => sync(services).await,
    Command::Queue(QueueCommand::List) => queue_list(services),
    Command::Queue(QueueCommand::Clear) => {
      let count = services.sync.queue().len()?;
      services.sync.queue().clear()?;
      println!("Dropped {} pending operation(s)", count);
      Ok(())
    }
    Command::Boards => {
      let result = services.api.boards().await?;
      print_source(&result);
      for board in &result.data {
        println!("{:<12} {}", board.id, board.title);
      }
      Ok(())
    }
    Command::Columns { board } => {
      if let Ok(b) = services.api.board(&board).await {
        println!("{}", b.data.title);
      }
      let result = services.api.columns(&board).await?;
      print_source(&result);
      print_columns(&result.data);
      Ok(())
    }
    Command::Cards { column } => {
      let result = services.api.cards(&column).await?;
      print_source(&result);
      print_cards(&result.data);
      Ok(())
    }
    Command::Card(cmd) => {
      replay_backlog(services).await?;
      card(services, cmd).await
    }
    Command::Column(cmd) => {
      replay_backlog(services).await?;
      column(services, cmd).await
    }
    Command::Rename { board, title } => {
      replay_backlog(services).await?;
      let outcome = services.api.update_board(&board, &title).await?;
      print_outcome(services, &format!("Renamed board {}", board), &outcome);
      Ok(())
    }
    Command::Fetch { url, head } => fetch(services, &url, head).await,
    Command::Cache(cmd) => cache(services, cmd).await,
  }
}

async fn status(services: &Services) -> Result<()> {
  let network = services.monitor.check_connection().await;
  let pending = services.sync.queue().len()?;
  let last = last_sync(services.store.as_ref())?;

  println!("Server:      {}", services.config.api.url);
  match network.quality {
    Some(q) if network.is_online() => println!(
      "Network:     online ({}, {}ms)",
      q.effective_type.as_str(),
      q.rtt.as_millis()
    ),
    _ if network.is_online() => println!("Network:     online"),
    _ => println!("Network:     offline"),
  }
  println!("Pending:     {}", pending);
  match last {
    Some(at) => println!("Last sync:   {}", at.to_rfc3339()),
    None => println!("Last sync:   never"),
  }

  for name in StoreName::ALL {
    println!("Store:       {} ({} records)", name, services.store.count(name)?);
  }
  for (name, entries) in services.fetch.stats()? {
    println!("Cache:       {} ({} entries)", name, entries);
  }
  Ok(())
}

async fn check(services: &Services) -> Result<()> {
  let network = services.monitor.check_connection().await;
  if network.is_online() {
    match network.quality {
      Some(q) => println!("online ({}, {}ms)", q.effective_type.as_str(), q.rtt.as_millis()),
      None => println!("online"),
    }
    Ok(())
  } else {
    Err(eyre!("Server unreachable at {}", services.config.api.url))
  }
}

async fn sync(services: &Services) -> Result<()> {
  let pending = services.sync.queue().len()?;
  if pending == 0 {
    println!("Nothing to sync");
    return Ok(());
  }

  let report = services.sync.sync().await?;
  println!(
    "Sent {} of {} pending operation(s), {} failed",
    report.succeeded, pending, report.failed
  );

  if report.unauthorized {
    return Err(eyre!(
      "Server rejected the session (401); {} operation(s) left queued. Check KBSYNC_API_TOKEN.",
      services.sync.queue().len()?
    ));
  }
  Ok(())
}

/// Replay queued work before a new write when the server answers, so the
/// write can go out directly instead of queueing behind stale operations.
async fn replay_backlog(services: &Services) -> Result<()> {
  if services.sync.queue().is_empty()? {
    return Ok(());
  }
  if !services.monitor.check_connection().await.is_online() {
    return Ok(());
  }

  let report = services.sync.sync().await?;
  if report.succeeded > 0 {
    eprintln!("(replayed {} pending operation(s))", report.succeeded);
  }
  if report.unauthorized {
    tracing::warn!("pending operations rejected with 401, new write will be queued");
  }
  Ok(())
}

fn queue_list(services: &Services) -> Result<()> {
  let pending = services.sync.queue().pending()?;
  if pending.is_empty() {
    println!("No pending operations");
    return Ok(());
  }

  for op in pending {
    println!(
      "{}  {:<6} {:<7} {:<40} retries={}",
      op.id,
      op.method.as_str(),
      op.op_type.as_str(),
      op.endpoint,
      op.retry_count
    );
  }
  Ok(())
}

async fn card(services: &Services, cmd: CardCommand) -> Result<()> {
  match cmd {
    CardCommand::Create {
      column,
      title,
      description,
    } => {
      let (card, outcome) = services
        .api
        .create_card(&column, &title, description.as_deref())
        .await?;
      print_outcome(services, &format!("Created card {} ({})", card.title, card.id), &outcome);
    }
    CardCommand::Edit {
      card,
      title,
      description,
    } => {
      let mut changes = Map::new();
      if let Some(title) = title {
        changes.insert("title".to_string(), Value::String(title));
      }
      if let Some(description) = description {
        changes.insert("description".to_string(), Value::String(description));
      }
      if changes.is_empty() {
        return Err(eyre!("Nothing to change; pass --title and/or --description"));
      }
      let outcome = services.api.update_card(&card, changes).await?;
      print_outcome(services, &format!("Updated card {}", card), &outcome);
    }
    CardCommand::Move {
      card,
      column,
      index,
    } => {
      let outcome = services.api.move_card(&card, &column, index).await?;
      print_outcome(services, &format!("Moved card {} to {}[{}]", card, column, index), &outcome);
    }
    CardCommand::Label { card, name, color } => {
      let outcome = services.api.add_label(&card, &name, color.as_deref()).await?;
      print_outcome(services, &format!("Labelled card {} with {}", card, name), &outcome);
    }
    CardCommand::Delete { card } => {
      let outcome = services.api.delete_card(&card).await?;
      print_outcome(services, &format!("Deleted card {}", card), &outcome);
    }
  }
  Ok(())
}

async fn column(services: &Services, cmd: ColumnCommand) -> Result<()> {
  match cmd {
    ColumnCommand::Create { board, title } => {
      let (column, outcome) = services.api.create_column(&board, &title).await?;
      print_outcome(services, &format!("Created column {} ({})", column.title, column.id), &outcome);
    }
    ColumnCommand::Move { column, index } => {
      let outcome = services.api.move_column(&column, index).await?;
      print_outcome(services, &format!("Moved column {} to position {}", column, index), &outcome);
    }
  }
  Ok(())
}

async fn fetch(services: &Services, input: &str, head: bool) -> Result<()> {
  let url = services.resolve_url(input)?;
  services.fetch.activate()?;

  let request = FetchRequest::get(url.clone());
  // Only non-http(s) URLs are left unintercepted for a GET
  let response = services
    .fetch
    .handle(&request)
    .await
    .ok_or_else(|| eyre!("Cannot fetch {}: only http(s) URLs are supported", url))?;

  eprintln!("{} ({})", response.status, source_label(response.source));
  if head {
    for (name, value) in &response.headers {
      println!("{}: {}", name, value);
    }
  } else {
    println!("{}", response.body_text());
  }
  Ok(())
}

async fn cache(services: &Services, cmd: CacheCommand) -> Result<()> {
  match cmd {
    CacheCommand::Install => {
      services.fetch.install().await?;
      services.fetch.handle_message(WorkerMessage::SkipWaiting).await?;
      println!("Fetch cache installed and active");
    }
    CacheCommand::Clear => {
      services.fetch.handle_message(WorkerMessage::ClearCache).await?;
      println!("Cleared all cached responses");
    }
    CacheCommand::Warm { urls } => {
      let urls = urls
        .iter()
        .map(|u| services.resolve_url(u))
        .collect::<Result<Vec<_>>>()?;
      let count = urls.len();
      services.fetch.handle_message(WorkerMessage::CacheUrls(urls)).await?;
      println!("Requested {} URL(s)", count);
    }
    CacheCommand::Stats => {
      let stats = services.fetch.stats()?;
      if stats.is_empty() {
        println!("No cached responses");
      }
      for (name, entries) in stats {
        println!("{:<24} {}", name, entries);
      }
    }
  }
  Ok(())
}

fn print_source<T>(result: &CacheResult<T>) {
  if result.is_offline() {
    eprintln!("(server unreachable, showing local copy)");
  }
}

fn print_columns(columns: &[Column]) {
  for column in columns {
    println!("{:>3}  {:<12} {}", column.position, column.id, column.title);
  }
}

fn print_cards(cards: &[Card]) {
  for card in cards {
    let labels: Vec<&str> = card.labels.iter().map(|l| l.name.as_str()).collect();
    if labels.is_empty() {
      println!("{:>3}  {:<12} {}", card.position, card.id, card.title);
    } else {
      println!("{:>3}  {:<12} {} [{}]", card.position, card.id, card.title, labels.join(", "));
    }
  }
}

fn print_outcome(services: &Services, what: &str, outcome: &WriteOutcome) {
  match outcome {
    WriteOutcome::Sent => println!("{}", what),
    WriteOutcome::Queued(op) if services.monitor.is_online() => {
      let ahead = services.sync.queue().len().unwrap_or(1).saturating_sub(1);
      println!("{} (queued behind {} pending operation(s) as {})", what, ahead, op.id)
    }
    WriteOutcome::Queued(op) => println!("{} (offline, queued as {})", what, op.id),
  }
}

fn source_label(source: ResponseSource) -> &'static str {
  match source {
    ResponseSource::Network => "network",
    ResponseSource::Cache => "cache",
    ResponseSource::Synthetic => "offline",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{ApiConfig, CacheConfig, Config, LogConfig, StoreConfig};
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn services(url: &str, dir: &std::path::Path) -> Services {
    let config = Config {
      api: ApiConfig {
        url: url.to_string(),
        health_path: "/api/health".to_string(),
        timeout_secs: 2,
      },
      title: None,
      cache: CacheConfig::default(),
      store: StoreConfig {
        path: Some(dir.join("store.db")),
      },
      log: LogConfig::default(),
    };
    Services::build(config, None).unwrap()
  }

  #[tokio::test]
  async fn test_offline_edit_is_synced_later() {
    let tmp = tempfile::tempdir().unwrap();

    let offline = services("http://127.0.0.1:1", tmp.path());
    run(
      &offline,
      Command::Card(CardCommand::Delete {
        card: "card-9".to_string(),
      }),
    )
    .await
    .unwrap();
    assert_eq!(offline.sync.queue().len().unwrap(), 1);
    drop(offline);

    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .and(path("/api/cards/card-9"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let online = services(&server.uri(), tmp.path());
    run(&online, Command::Sync).await.unwrap();
    assert!(online.sync.queue().is_empty().unwrap());
    assert!(last_sync(online.store.as_ref()).unwrap().is_some());
  }

  #[tokio::test]
  async fn test_sync_reports_unauthorized() {
    let tmp = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
      .respond_with(ResponseTemplate::new(401))
      .mount(&server)
      .await;

    let services = services(&server.uri(), tmp.path());
    services
      .sync
      .queue()
      .enqueue(
        crate::sync::OperationType::Board,
        crate::sync::HttpMethod::Patch,
        "/api/boards/1",
        None,
      )
      .unwrap();

    let err = run(&services, Command::Sync).await.unwrap_err();
    assert!(err.to_string().contains("401"));
    assert_eq!(services.sync.queue().len().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_write_replays_backlog_then_sends_directly() {
    let tmp = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/health"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;
    Mock::given(method("PATCH"))
      .and(path("/api/boards/1"))
      .respond_with(ResponseTemplate::new(200))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("DELETE"))
      .and(path("/api/cards/card-9"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let services = services(&server.uri(), tmp.path());
    services
      .sync
      .queue()
      .enqueue(
        crate::sync::OperationType::Board,
        crate::sync::HttpMethod::Patch,
        "/api/boards/1",
        None,
      )
      .unwrap();

    run(
      &services,
      Command::Card(CardCommand::Delete {
        card: "card-9".to_string(),
      }),
    )
    .await
    .unwrap();

    assert!(services.sync.queue().is_empty().unwrap());
    assert!(services.monitor.is_online());
  }

  #[tokio::test]
  async fn test_write_stays_queued_while_server_is_down() {
    let tmp = tempfile::tempdir().unwrap();
    let services = services("http://127.0.0.1:1", tmp.path());
    services
      .sync
      .queue()
      .enqueue(
        crate::sync::OperationType::Board,
        crate::sync::HttpMethod::Patch,
        "/api/boards/1",
        None,
      )
      .unwrap();

    run(
      &services,
      Command::Rename {
        board: "1".to_string(),
        title: "Later".to_string(),
      },
    )
    .await
    .unwrap();

    let pending = services.sync.queue().pending().unwrap();
    assert_eq!(pending.len(), 2);
    // Health check failed, so no replay pass bumped the backlog
    assert_eq!(pending[0].retry_count, 0);
  }

  #[tokio::test]
  async fn test_status_counts_every_store() {
    let tmp = tempfile::tempdir().unwrap();
    let services = services("http://127.0.0.1:1", tmp.path());
    run(&services, Command::Status).await.unwrap();
    for name in StoreName::ALL {
      assert_eq!(services.store.count(name).unwrap(), 0);
    }
  }

  #[tokio::test]
  async fn test_check_fails_when_unreachable() {
    let tmp = tempfile::tempdir().unwrap();
    let services = services("http://127.0.0.1:1", tmp.path());
    assert!(run(&services, Command::Check).await.is_err());
  }
}
