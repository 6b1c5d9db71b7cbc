use crate::kanban::types::Board;
use crate::store::CacheSource;
use crate::ui::border_color;
use crate::ui::renderfns::truncate;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

pub fn draw_board_list(
  frame: &mut Frame,
  area: Rect,
  boards: &[Board],
  selected: usize,
  loading: bool,
  source: Option<CacheSource>,
  focused: bool,
) {
  let title = if loading {
    " Boards (loading...) ".to_string()
  } else if source == Some(CacheSource::Offline) {
    format!(" Boards ({}, offline copy) ", boards.len())
  } else {
    format!(" Boards ({}) ", boards.len())
  };

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(border_color(focused)));

  if boards.is_empty() && !loading {
    let paragraph = Paragraph::new("No boards stored.")
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let items: Vec<ListItem> = boards
    .iter()
    .map(|board| {
      let line = Line::from(vec![
        Span::styled(
          format!("{:<10}", truncate(&board.id, 10)),
          Style::default().fg(Color::Cyan),
        ),
        Span::raw(" "),
        Span::raw(&board.title),
      ]);
      ListItem::new(line)
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  let mut state = ListState::default();
  if focused {
    state.select(Some(selected));
  }

  frame.render_stateful_widget(list, area, &mut state);
}
