mod components;
mod renderfns;
mod views;

use crate::app::{App, Pane};
use ratatui::prelude::*;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  let title = app
    .title()
    .map(String::from)
    .unwrap_or_else(|| renderfns::extract_domain(app.api_url()).to_string());
  renderfns::draw_header(frame, chunks[0], &title, app.network());

  let panes = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
    .split(chunks[1]);

  views::queue::draw_queue(
    frame,
    panes[0],
    app.pending(),
    app.queue_selected(),
    app.pane() == Pane::Queue,
  );
  views::boards::draw_board_list(
    frame,
    panes[1],
    app.boards(),
    app.board_selected(),
    app.boards_loading(),
    app.boards_source(),
    app.pane() == Pane::Boards,
  );

  components::draw_footer(frame, chunks[2], app.status(), app.last_sync());
}

/// Border color for a pane
fn border_color(focused: bool) -> Color {
  if focused {
    Color::Cyan
  } else {
    Color::Blue
  }
}
