use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::connectivity::NetworkStatus;
use crate::kanban::types::{Board, Card, Column};
use crate::store::CacheSource;
use crate::sync::SyncEvent;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for UI refresh
  Tick,
  /// Connectivity changed
  Network(NetworkStatus),
  /// Sync pass progress
  Sync(SyncEvent),
  /// Background data loads
  Data(DataEvent),
  /// A background task failed
  Error(String),
}

/// Results of background reads
#[derive(Debug)]
pub enum DataEvent {
  BoardsLoaded(Vec<Board>, CacheSource),
  ColumnsLoaded {
    board_id: String,
    columns: Vec<Column>,
    cards: Vec<Card>,
    source: CacheSource,
  },
  /// Message for the status line
  Notice(String),
}

/// Event handler that produces events from terminal input and a tick timer.
///
/// Other producers (sync progress, connectivity) push into the same
/// channel through [`EventHandler::sender`].
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Terminal polling blocks, keep it off the async workers
    let input_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
      if event::poll(tick_rate).unwrap_or(false) {
        if let Ok(CrosstermEvent::Key(key)) = event::read() {
          if input_tx.send(Event::Key(key)).is_err() {
            break;
          }
        }
      } else if input_tx.send(Event::Tick).is_err() {
        break;
      }
    });

    Self { tx, rx }
  }

  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
