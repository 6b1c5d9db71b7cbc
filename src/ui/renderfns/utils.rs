use chrono::{Local, TimeZone};
use ratatui::prelude::Color;

use crate::sync::HttpMethod;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Get the display color for a queued request method
pub fn method_color(method: HttpMethod) -> Color {
  match method {
    HttpMethod::Post => Color::Green,
    HttpMethod::Put | HttpMethod::Patch => Color::Yellow,
    HttpMethod::Delete => Color::Red,
  }
}

/// Local time of a millisecond Unix timestamp
pub fn format_timestamp(millis: i64) -> String {
  match Local.timestamp_millis_opt(millis).single() {
    Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
    None => "-".to_string(),
  }
}
