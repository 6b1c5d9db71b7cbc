use crate::config::Config;
use crate::connectivity::NetworkStatus;
use crate::event::{DataEvent, Event, EventHandler};
use crate::kanban::types::Board;
use crate::services::Services;
use crate::store::{last_sync, CacheSource};
use crate::sync::{PendingOperation, SyncEvent, SyncReport};
use crate::ui;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tokio::sync::mpsc;

/// Focused pane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
  Queue,
  Boards,
}

impl Pane {
  fn toggle(self) -> Self {
    match self {
      Pane::Queue => Pane::Boards,
      Pane::Boards => Pane::Queue,
    }
  }
}

/// Outcome shown in the status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
  Idle,
  Syncing { done: usize, total: usize },
  Synced(SyncReport),
  Info(String),
  Error(String),
}

/// Main application state
pub struct App {
  services: Services,

  pane: Pane,

  pending: Vec<PendingOperation>,
  queue_selected: usize,

  boards: Vec<Board>,
  boards_source: Option<CacheSource>,
  boards_loading: bool,
  board_selected: usize,

  network: NetworkStatus,
  last_sync: Option<DateTime<Utc>>,
  status: StatusMessage,

  /// Sync progress, forwarded into the event loop once it starts
  sync_rx: Option<mpsc::UnboundedReceiver<SyncEvent>>,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let (sync_tx, sync_rx) = mpsc::unbounded_channel();
    let services = Services::build(config, Some(sync_tx))?;
    let (tx, _rx) = mpsc::unbounded_channel();

    let network = services.monitor.status();
    let last_sync = last_sync(services.store.as_ref())?;

    Ok(Self {
      services,
      pane: Pane::Queue,
      pending: Vec::new(),
      queue_selected: 0,
      boards: Vec::new(),
      boards_source: None,
      boards_loading: false,
      board_selected: 0,
      network,
      last_sync,
      status: StatusMessage::Idle,
      sync_rx: Some(sync_rx),
      event_tx: tx,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(250));
    self.event_tx = events.sender();

    self.start_background_tasks();
    self.refresh_pending();
    self.load_boards();
    self.check_connection();

    let result = self.main_loop(&mut terminal, &mut events).await;

    // Cleanup terminal even if the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn main_loop<B: Backend>(
    &mut self,
    terminal: &mut Terminal<B>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      if let Some(event) = events.next().await {
        self.handle_event(event);
      }
    }
    Ok(())
  }

  /// Forward sync progress and connectivity changes into the event loop,
  /// and replay the queue on every reconnect.
  fn start_background_tasks(&mut self) {
    if let Some(mut rx) = self.sync_rx.take() {
      let tx = self.event_tx.clone();
      tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
          if tx.send(Event::Sync(event)).is_err() {
            break;
          }
        }
      });
    }

    let mut network_rx = self.services.monitor.subscribe();
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      while network_rx.changed().await.is_ok() {
        let status = *network_rx.borrow_and_update();
        if tx.send(Event::Network(status)).is_err() {
          break;
        }
      }
    });

    std::sync::Arc::clone(&self.services.sync).spawn_on_reconnect(&self.services.monitor);

    let fetch = self.services.fetch.clone();
    tokio::spawn(async move {
      if let Err(e) = fetch.start().await {
        tracing::warn!(error = %e, "fetch cache did not start");
      }
    });
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {}
      Event::Network(status) => self.network = status,
      Event::Sync(sync_event) => self.handle_sync_event(sync_event),
      Event::Data(data_event) => self.handle_data_event(data_event),
      Event::Error(msg) => {
        tracing::error!(error = %msg, "background task failed");
        self.boards_loading = false;
        self.status = StatusMessage::Error(msg);
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      // Navigation
      KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
      KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
      KeyCode::Tab | KeyCode::BackTab => self.pane = self.pane.toggle(),
      KeyCode::Enter if self.pane == Pane::Boards => self.open_selected_board(),

      // Actions
      KeyCode::Char('s') => self.sync_now(),
      KeyCode::Char('c') => self.check_connection(),
      KeyCode::Char('r') => {
        self.refresh_pending();
        self.load_boards();
      }

      _ => {}
    }
  }

  fn handle_sync_event(&mut self, event: SyncEvent) {
    match event {
      SyncEvent::Started { pending } => {
        self.status = StatusMessage::Syncing {
          done: 0,
          total: pending,
        };
      }
      SyncEvent::Replayed { .. } | SyncEvent::Failed { .. } => {
        if let StatusMessage::Syncing { done, .. } = &mut self.status {
          *done += 1;
        }
        self.refresh_pending();
      }
      SyncEvent::Finished(report) => {
        self.refresh_pending();
        match last_sync(self.services.store.as_ref()) {
          Ok(at) => self.last_sync = at,
          Err(e) => tracing::warn!(error = %e, "could not read last sync time"),
        }
        self.status = StatusMessage::Synced(report);
      }
    }
  }

  fn handle_data_event(&mut self, event: DataEvent) {
    match event {
      DataEvent::BoardsLoaded(boards, source) => {
        self.boards = boards;
        self.boards_source = Some(source);
        self.boards_loading = false;
        self.board_selected = self.board_selected.min(self.boards.len().saturating_sub(1));
      }
      DataEvent::ColumnsLoaded {
        board_id,
        columns,
        cards,
        source,
      } => {
        let suffix = if source == CacheSource::Offline { " (offline)" } else { "" };
        self.status = StatusMessage::Info(format!(
          "Board {}: {} columns, {} cards{}",
          board_id,
          columns.len(),
          cards.len(),
          suffix
        ));
      }
      DataEvent::Notice(msg) => {
        self.refresh_pending();
        self.status = StatusMessage::Info(msg);
      }
    }
  }

  fn sync_now(&mut self) {
    if self.services.sync.is_syncing() {
      self.status = StatusMessage::Info("Sync already in progress".to_string());
      return;
    }

    let engine = std::sync::Arc::clone(&self.services.sync);
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      if let Err(e) = engine.sync().await {
        let _ = tx.send(Event::Error(format!("Sync failed: {}", e)));
      }
    });
  }

  fn check_connection(&mut self) {
    self.status = StatusMessage::Info("Checking connection...".to_string());
    let monitor = self.services.monitor.clone();
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      let status = monitor.check_connection().await;
      let msg = if status.is_online() {
        "Server reachable"
      } else {
        "Server unreachable"
      };
      let _ = tx.send(Event::Data(DataEvent::Notice(msg.to_string())));
    });
  }

  fn load_boards(&mut self) {
    self.boards_loading = true;
    let api = self.services.api.clone();
    let tx = self.event_tx.clone();

    tokio::spawn(async move {
      match api.boards().await {
        Ok(result) => {
          let _ = tx.send(Event::Data(DataEvent::BoardsLoaded(result.data, result.source)));
        }
        Err(e) => {
          let _ = tx.send(Event::Error(e.to_string()));
        }
      }
    });
  }

  /// Load the selected board's columns and cards into the local store
  fn open_selected_board(&mut self) {
    let Some(board) = self.boards.get(self.board_selected) else {
      return;
    };
    let api = self.services.api.clone();
    let board_id = board.id.clone();
    let tx = self.event_tx.clone();

    tokio::spawn(async move {
      let loaded = async {
        let columns = api.columns(&board_id).await?;
        let mut cards = Vec::new();
        let mut source = columns.source;
        for column in &columns.data {
          let result = api.cards(&column.id).await?;
          if result.is_offline() {
            source = CacheSource::Offline;
          }
          cards.extend(result.data);
        }
        Ok::<_, color_eyre::Report>((columns.data, cards, source))
      };

      match loaded.await {
        Ok((columns, cards, source)) => {
          let _ = tx.send(Event::Data(DataEvent::ColumnsLoaded {
            board_id,
            columns,
            cards,
            source,
          }));
        }
        Err(e) => {
          let _ = tx.send(Event::Error(e.to_string()));
        }
      }
    });
  }

  fn refresh_pending(&mut self) {
    match self.services.sync.queue().pending() {
      Ok(pending) => {
        self.pending = pending;
        self.queue_selected = self.queue_selected.min(self.pending.len().saturating_sub(1));
      }
      Err(e) => self.status = StatusMessage::Error(e.to_string()),
    }
  }

  fn move_selection(&mut self, delta: i32) {
    let (len, selected) = match self.pane {
      Pane::Queue => (self.pending.len(), &mut self.queue_selected),
      Pane::Boards => (self.boards.len(), &mut self.board_selected),
    };
    if len > 0 {
      *selected = (*selected as i32 + delta).rem_euclid(len as i32) as usize;
    }
  }

  // Accessors for UI rendering
  pub fn pane(&self) -> Pane {
    self.pane
  }

  pub fn pending(&self) -> &[PendingOperation] {
    &self.pending
  }

  pub fn queue_selected(&self) -> usize {
    self.queue_selected
  }

  pub fn boards(&self) -> &[Board] {
    &self.boards
  }

  pub fn boards_source(&self) -> Option<CacheSource> {
    self.boards_source
  }

  pub fn boards_loading(&self) -> bool {
    self.boards_loading
  }

  pub fn board_selected(&self) -> usize {
    self.board_selected
  }

  pub fn network(&self) -> &NetworkStatus {
    &self.network
  }

  pub fn last_sync(&self) -> Option<DateTime<Utc>> {
    self.last_sync
  }

  pub fn status(&self) -> &StatusMessage {
    &self.status
  }

  pub fn api_url(&self) -> &str {
    &self.services.config.api.url
  }

  pub fn title(&self) -> Option<&str> {
    self.services.config.title.as_deref()
  }
}
