use crate::sync::PendingOperation;
use crate::ui::border_color;
use crate::ui::renderfns::{format_timestamp, method_color, truncate};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

pub fn draw_queue(
  frame: &mut Frame,
  area: Rect,
  pending: &[PendingOperation],
  selected: usize,
  focused: bool,
) {
  let block = Block::default()
    .title(format!(" Pending ({}) ", pending.len()))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(border_color(focused)));

  if pending.is_empty() {
    let paragraph = Paragraph::new("Nothing waiting to sync.")
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let items: Vec<ListItem> = pending
    .iter()
    .map(|op| {
      let mut spans = vec![
        Span::styled(
          format!("{:<6}", op.method.as_str()),
          Style::default().fg(method_color(op.method)),
        ),
        Span::raw(" "),
        Span::styled(
          format!("{:<7}", op.op_type.as_str()),
          Style::default().fg(Color::Yellow),
        ),
        Span::raw(" "),
        Span::raw(truncate(&op.endpoint, 40)),
        Span::raw("  "),
        Span::styled(format_timestamp(op.timestamp), Style::default().fg(Color::DarkGray)),
      ];
      if op.retry_count > 0 {
        spans.push(Span::styled(
          format!("  retries: {}", op.retry_count),
          Style::default().fg(Color::Red),
        ));
      }
      ListItem::new(Line::from(spans))
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
