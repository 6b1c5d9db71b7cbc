//! Online/offline state and link-quality estimate.
//!
//! Transitions are edge-triggered: the API client reports transport failures
//! and successful round-trips as they happen. The only active probe is
//! [`ConnectivityMonitor::check_connection`], run on explicit request.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

/// Effective connection type, bucketed the way browsers report it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveType {
  Slow2g,
  G2,
  G3,
  G4,
}

impl EffectiveType {
  pub fn from_rtt(rtt: Duration) -> Self {
    match rtt.as_millis() {
      0..=149 => EffectiveType::G4,
      150..=599 => EffectiveType::G3,
      600..=1999 => EffectiveType::G2,
      _ => EffectiveType::Slow2g,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      EffectiveType::Slow2g => "slow-2g",
      EffectiveType::G2 => "2g",
      EffectiveType::G3 => "3g",
      EffectiveType::G4 => "4g",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionQuality {
  pub effective_type: EffectiveType,
  pub rtt: Duration,
}

impl ConnectionQuality {
  pub fn from_rtt(rtt: Duration) -> Self {
    Self {
      effective_type: EffectiveType::from_rtt(rtt),
      rtt,
    }
  }
}

/// Snapshot published to subscribers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkStatus {
  pub state: Connectivity,
  /// Last measured quality; None until a round-trip has been timed
  pub quality: Option<ConnectionQuality>,
  pub changed_at: DateTime<Utc>,
}

impl NetworkStatus {
  pub fn is_online(&self) -> bool {
    self.state == Connectivity::Online
  }
}

/// Shared connectivity state.
///
/// Starts offline; the first successful contact with the server is an
/// Offline → Online edge, which lets a startup replay happen through the
/// same path as a reconnect.
#[derive(Clone)]
pub struct ConnectivityMonitor {
  tx: Arc<watch::Sender<NetworkStatus>>,
  http: reqwest::Client,
  health_url: Url,
}

impl ConnectivityMonitor {
  pub fn new(http: reqwest::Client, health_url: Url) -> Self {
    let (tx, _rx) = watch::channel(NetworkStatus {
      state: Connectivity::Offline,
      quality: None,
      changed_at: Utc::now(),
    });

    Self {
      tx: Arc::new(tx),
      http,
      health_url,
    }
  }

  pub fn status(&self) -> NetworkStatus {
    *self.tx.borrow()
  }

  pub fn is_online(&self) -> bool {
    self.status().is_online()
  }

  /// Subscribe to status changes
  pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
    self.tx.subscribe()
  }

  /// A request reached the server.
  pub fn report_success(&self, rtt: Option<Duration>) {
    let quality = rtt.map(ConnectionQuality::from_rtt);
    self.tx.send_if_modified(|status| {
      let was_offline = status.state == Connectivity::Offline;
      if was_offline {
        tracing::info!("connectivity: online");
        status.state = Connectivity::Online;
        status.changed_at = Utc::now();
      }
      let quality_changed = quality.is_some() && status.quality != quality;
      if quality_changed {
        status.quality = quality;
      }
      was_offline || quality_changed
    });
  }

  /// A request failed at the transport level.
  pub fn report_failure(&self) {
    self.tx.send_if_modified(|status| {
      if status.state == Connectivity::Offline {
        return false;
      }
      tracing::warn!("connectivity: offline");
      status.state = Connectivity::Offline;
      status.changed_at = Utc::now();
      true
    });
  }

  /// One-shot HTTP probe of the health endpoint.
  pub async fn check_connection(&self) -> NetworkStatus {
    let started = Instant::now();
    match self.http.get(self.health_url.clone()).send().await {
      Ok(response) if response.status().is_success() => {
        self.report_success(Some(started.elapsed()));
      }
      Ok(response) => {
        tracing::warn!(status = %response.status(), "health check returned an error status");
        self.report_failure();
      }
      Err(e) => {
        tracing::debug!(error = %e, "health check failed");
        self.report_failure();
      }
    }
    self.status()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn monitor(base: &str) -> ConnectivityMonitor {
    let url = Url::parse(base).unwrap().join("/api/health").unwrap();
    ConnectivityMonitor::new(reqwest::Client::new(), url)
  }

  #[test]
  fn test_effective_type_buckets() {
    assert_eq!(EffectiveType::from_rtt(Duration::from_millis(20)), EffectiveType::G4);
    assert_eq!(EffectiveType::from_rtt(Duration::from_millis(150)), EffectiveType::G3);
    assert_eq!(EffectiveType::from_rtt(Duration::from_millis(900)), EffectiveType::G2);
    assert_eq!(EffectiveType::from_rtt(Duration::from_secs(3)), EffectiveType::Slow2g);
    assert_eq!(EffectiveType::Slow2g.as_str(), "slow-2g");
  }

  #[tokio::test]
  async fn test_transitions_are_edge_triggered() {
    let monitor = monitor("http://127.0.0.1:1");
    let mut rx = monitor.subscribe();
    assert!(!monitor.is_online());

    // Already offline - no notification
    monitor.report_failure();
    assert!(!rx.has_changed().unwrap());

    monitor.report_success(None);
    assert!(rx.has_changed().unwrap());
    assert!(rx.borrow_and_update().is_online());

    // Already online with no new quality data - no notification
    monitor.report_success(None);
    assert!(!rx.has_changed().unwrap());

    monitor.report_failure();
    assert!(rx.has_changed().unwrap());
    assert!(!rx.borrow_and_update().is_online());
  }

  #[tokio::test]
  async fn test_check_connection_online() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/health"))
      .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
      .expect(1)
      .mount(&server)
      .await;

    let status = monitor(&server.uri()).check_connection().await;

    assert!(status.is_online());
    assert!(status.quality.is_some());
  }

  #[tokio::test]
  async fn test_check_connection_error_status_is_offline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(503))
      .mount(&server)
      .await;

    let monitor = monitor(&server.uri());
    monitor.report_success(None);
    let status = monitor.check_connection().await;

    assert!(!status.is_online());
  }

  #[tokio::test]
  async fn test_check_connection_unreachable() {
    let monitor = monitor("http://127.0.0.1:1");
    monitor.report_success(None);

    let status = monitor.check_connection().await;
    assert_eq!(status.state, Connectivity::Offline);
  }
}
