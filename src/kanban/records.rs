//! Local store mapping for Kanban types.

use crate::store::{Record, StoreName};

use super::types::{Board, Card, Column};

/// Index of columns and cards by owning board
pub const BY_BOARD: &str = "boardId";
/// Index of cards by owning column
pub const BY_COLUMN: &str = "columnId";

impl Record for Board {
  fn store() -> StoreName {
    StoreName::Boards
  }

  fn record_key(&self) -> String {
    self.id.clone()
  }
}

impl Record for Column {
  fn store() -> StoreName {
    StoreName::Columns
  }

  fn record_key(&self) -> String {
    self.id.clone()
  }

  fn index_values(&self) -> Vec<(&'static str, String)> {
    vec![(BY_BOARD, self.board_id.clone())]
  }
}

impl Record for Card {
  fn store() -> StoreName {
    StoreName::Cards
  }

  fn record_key(&self) -> String {
    self.id.clone()
  }

  fn index_values(&self) -> Vec<(&'static str, String)> {
    let mut values = vec![(BY_COLUMN, self.column_id.clone())];
    if let Some(board_id) = &self.board_id {
      values.push((BY_BOARD, board_id.clone()));
    }
    values
  }
}
