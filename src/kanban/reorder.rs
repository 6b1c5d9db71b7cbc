//! Position recomputation for drag-and-drop moves.
//!
//! Positions are dense (`0..n`) within a column after every move. Both
//! functions take the current snapshot and return only the records whose
//! column or position changed, ready to be written back.

use color_eyre::{eyre::eyre, Result};

use super::types::{Card, Column};

/// Move `card_id` to `to_index` within `to_column`.
///
/// `cards` must contain at least the cards of the source and target columns;
/// cards of other columns are ignored. An index past the end appends.
pub fn move_card(cards: &[Card], card_id: &str, to_column: &str, to_index: usize) -> Result<Vec<Card>> {
  let moving = cards
    .iter()
    .find(|c| c.id == card_id)
    .ok_or_else(|| eyre!("Card {} not found", card_id))?;
  let from_column = moving.column_id.clone();

  let mut source = column_cards(cards, &from_column);
  source.retain(|c| c.id != card_id);

  let mut moved = moving.clone();
  moved.column_id = to_column.to_string();

  let mut target = if from_column == to_column {
    std::mem::take(&mut source)
  } else {
    column_cards(cards, to_column)
  };
  let index = to_index.min(target.len());
  target.insert(index, moved);

  let mut changed = Vec::new();
  for list in [&mut source, &mut target] {
    for (position, card) in list.iter_mut().enumerate() {
      card.position = position as i64;
      let original = cards.iter().find(|c| c.id == card.id);
      if original.map_or(true, |o| o.position != card.position || o.column_id != card.column_id) {
        changed.push(card.clone());
      }
    }
  }

  Ok(changed)
}

/// Move `column_id` to `to_index` among the columns of its board.
pub fn reorder_columns(columns: &[Column], column_id: &str, to_index: usize) -> Result<Vec<Column>> {
  let moving = columns
    .iter()
    .find(|c| c.id == column_id)
    .ok_or_else(|| eyre!("Column {} not found", column_id))?;

  let mut ordered: Vec<Column> = columns
    .iter()
    .filter(|c| c.board_id == moving.board_id && c.id != column_id)
    .cloned()
    .collect();
  ordered.sort_by_key(|c| c.position);
  let index = to_index.min(ordered.len());
  ordered.insert(index, moving.clone());

  let changed = ordered
    .into_iter()
    .enumerate()
    .filter_map(|(position, mut column)| {
      let position = position as i64;
      if column.position == position {
        return None;
      }
      column.position = position;
      Some(column)
    })
    .collect();

  Ok(changed)
}

/// Cards of one column ordered by their current position
fn column_cards(cards: &[Card], column_id: &str) -> Vec<Card> {
  let mut list: Vec<Card> = cards
    .iter()
    .filter(|c| c.column_id == column_id)
    .cloned()
    .collect();
  list.sort_by_key(|c| c.position);
  list
}
