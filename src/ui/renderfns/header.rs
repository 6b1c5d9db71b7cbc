use crate::connectivity::NetworkStatus;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with logo, server, connectivity badge and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, title: &str, network: &NetworkStatus) {
  let mut spans = vec![
    Span::styled(" kbsync ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", title), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
  ];
  spans.extend(network_badge(network));
  spans.extend([
    Span::raw("  "),
    // Shortcuts - keys highlighted, descriptions dimmed
    Span::styled("<s>", Style::default().fg(Color::Cyan)),
    Span::styled(" sync", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<c>", Style::default().fg(Color::Cyan)),
    Span::styled(" check", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<r>", Style::default().fg(Color::Cyan)),
    Span::styled(" reload", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<tab>", Style::default().fg(Color::Cyan)),
    Span::styled(" pane", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<q>", Style::default().fg(Color::Cyan)),
    Span::styled(" quit", Style::default().fg(Color::DarkGray)),
  ]);

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

fn network_badge(network: &NetworkStatus) -> Vec<Span<'static>> {
  if !network.is_online() {
    return vec![Span::styled(" OFFLINE ", Style::default().fg(Color::Black).bg(Color::Red).bold())];
  }

  let mut spans = vec![Span::styled(
    " ONLINE ",
    Style::default().fg(Color::Black).bg(Color::Green).bold(),
  )];
  if let Some(quality) = network.quality {
    spans.push(Span::styled(
      format!(" {} {}ms", quality.effective_type.as_str(), quality.rtt.as_millis()),
      Style::default().fg(Color::DarkGray),
    ));
  }
  spans
}

/// Extract host (and port) from the API URL
pub fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}
