use crate::app::StatusMessage;
use chrono::{DateTime, Local, Utc};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the status line with the last sync outcome
pub fn draw_footer(frame: &mut Frame, area: Rect, status: &StatusMessage, last_sync: Option<DateTime<Utc>>) {
  let last = match last_sync {
    Some(at) => at.with_timezone(&Local).format("%H:%M:%S").to_string(),
    None => "never".to_string(),
  };

  let (message, color) = status_text(status);
  let line = Line::from(vec![
    Span::raw(" "),
    Span::styled(message, Style::default().fg(color)),
    Span::styled(" │ ", Style::default().fg(Color::DarkGray)),
    Span::styled(format!("last sync: {}", last), Style::default().fg(Color::White)),
  ]);

  let paragraph = Paragraph::new(line).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

fn status_text(status: &StatusMessage) -> (String, Color) {
  match status {
    StatusMessage::Idle => ("Ready".to_string(), Color::DarkGray),
    StatusMessage::Syncing { done, total } => (format!("Syncing {}/{}", done, total), Color::Yellow),
    StatusMessage::Synced(report) if report.skipped => ("Sync already running".to_string(), Color::Yellow),
    StatusMessage::Synced(report) if report.unauthorized => (
      format!("Sync stopped: unauthorized ({} sent)", report.succeeded),
      Color::Red,
    ),
    StatusMessage::Synced(report) if report.failed > 0 => (
      format!("Synced {}, {} still queued", report.succeeded, report.failed),
      Color::Yellow,
    ),
    StatusMessage::Synced(report) => (format!("Synced {}", report.succeeded), Color::Green),
    StatusMessage::Info(msg) => (msg.clone(), Color::White),
    StatusMessage::Error(msg) => (format!("Error: {}", msg), Color::Red),
  }
}
