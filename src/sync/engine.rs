//! Replays pending operations against the API when connectivity returns.

use chrono::Utc;
use color_eyre::Result;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::queue::PendingQueue;
use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::kanban::ApiClient;
use crate::store::{set_setting, LocalStore, LAST_SYNC};

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// Operations sent to the server
  pub attempted: usize,
  /// Operations confirmed and removed from the queue
  pub succeeded: usize,
  /// Operations that failed and stay queued
  pub failed: usize,
  /// The pass stopped early on a 401
  pub unauthorized: bool,
  /// Another pass was already running; nothing was done
  pub skipped: bool,
}

/// Progress notifications emitted while a pass runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
  Started { pending: usize },
  Replayed { id: String, remaining: usize },
  Failed { id: String, status: Option<u16> },
  Finished(SyncReport),
}

pub struct SyncEngine<S: LocalStore> {
  queue: PendingQueue<S>,
  store: Arc<S>,
  api: ApiClient,
  syncing: AtomicBool,
  progress: Option<mpsc::UnboundedSender<SyncEvent>>,
}

/// Clears the in-flight flag however the pass ends
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

impl<S: LocalStore + 'static> SyncEngine<S> {
  pub fn new(store: Arc<S>, api: ApiClient) -> Self {
    Self {
      queue: PendingQueue::new(Arc::clone(&store)),
      store,
      api,
      syncing: AtomicBool::new(false),
      progress: None,
    }
  }

  /// Send progress events to `tx` during every pass.
  pub fn with_progress(mut self, tx: mpsc::UnboundedSender<SyncEvent>) -> Self {
    self.progress = Some(tx);
    self
  }

  pub fn queue(&self) -> &PendingQueue<S> {
    &self.queue
  }

  pub fn is_syncing(&self) -> bool {
    self.syncing.load(Ordering::Acquire)
  }

  /// Replay every pending operation in enqueue order.
  ///
  /// - 2xx: the operation is removed.
  /// - 401: the pass stops; the failing operation and everything after it stay queued.
  /// - anything else (including transport errors): the operation stays queued,
  ///   its retry count is bumped, and the pass moves on.
  ///
  /// Storage errors abort the pass and are returned.
  pub async fn sync(&self) -> Result<SyncReport> {
    if self
      .syncing
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      tracing::debug!("sync already in progress");
      return Ok(SyncReport {
        skipped: true,
        ..SyncReport::default()
      });
    }
    let _guard = SyncGuard(&self.syncing);

    let pending = self.queue.pending()?;
    let mut report = SyncReport::default();
    self.emit(SyncEvent::Started {
      pending: pending.len(),
    });
    tracing::info!(pending = pending.len(), "sync started");

    let mut remaining = pending.len();
    for op in pending {
      report.attempted += 1;

      match self.api.send(op.method, &op.endpoint, op.data.as_ref()).await {
        Ok(status) if status.is_success() => {
          self.queue.remove(&op.id)?;
          remaining -= 1;
          report.succeeded += 1;
          tracing::debug!(id = %op.id, %status, remaining, "replayed pending operation");
          self.emit(SyncEvent::Replayed {
            id: op.id.clone(),
            remaining,
          });
        }
        Ok(status) if status == StatusCode::UNAUTHORIZED => {
          tracing::warn!(id = %op.id, "sync rejected with 401, stopping");
          report.unauthorized = true;
          self.emit(SyncEvent::Failed {
            id: op.id.clone(),
            status: Some(StatusCode::UNAUTHORIZED.as_u16()),
          });
          break;
        }
        Ok(status) => {
          tracing::warn!(id = %op.id, %status, endpoint = %op.endpoint, "replay failed, keeping queued");
          self.queue.record_failure(&op)?;
          report.failed += 1;
          self.emit(SyncEvent::Failed {
            id: op.id.clone(),
            status: Some(status.as_u16()),
          });
        }
        Err(e) => {
          tracing::warn!(id = %op.id, error = %e, "replay failed, keeping queued");
          self.queue.record_failure(&op)?;
          report.failed += 1;
          self.emit(SyncEvent::Failed {
            id: op.id.clone(),
            status: None,
          });
        }
      }
    }

    if !report.unauthorized {
      set_setting(self.store.as_ref(), LAST_SYNC, &Utc::now())?;
    }

    tracing::info!(
      succeeded = report.succeeded,
      failed = report.failed,
      unauthorized = report.unauthorized,
      "sync finished"
    );
    self.emit(SyncEvent::Finished(report.clone()));
    Ok(report)
  }

  /// Run a pass on every Offline → Online transition while work is queued.
  pub fn spawn_on_reconnect(self: Arc<Self>, monitor: &ConnectivityMonitor) -> JoinHandle<()> {
    let mut rx = monitor.subscribe();
    let mut previous = rx.borrow().state;

    tokio::spawn(async move {
      while rx.changed().await.is_ok() {
        let current = rx.borrow_and_update().state;
        let reconnected = previous == Connectivity::Offline && current == Connectivity::Online;
        previous = current;
        if !reconnected {
          continue;
        }

        match self.queue.is_empty() {
          Ok(true) => {}
          Ok(false) => {
            if let Err(e) = self.sync().await {
              tracing::error!(error = %e, "sync after reconnect failed");
            }
          }
          Err(e) => tracing::error!(error = %e, "could not read pending queue"),
        }
      }
    })
  }

  fn emit(&self, event: SyncEvent) {
    if let Some(tx) = &self.progress {
      // Receiver may have gone away
      let _ = tx.send(event);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::store::{last_sync, SqliteStore};
  use crate::sync::{HttpMethod, OperationType};
  use std::time::Duration;
  use url::Url;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn engine(base: &str) -> SyncEngine<SqliteStore> {
    let base = Url::parse(base).unwrap();
    let http = reqwest::Client::new();
    let monitor = ConnectivityMonitor::new(http.clone(), base.join("/api/health").unwrap());
    let api = ApiClient::new(base, http, None, monitor);
    let store = Arc::new(SqliteStore::new(Arc::new(Database::open_in_memory().unwrap())));
    SyncEngine::new(store, api)
  }

  #[tokio::test]
  async fn test_two_posts_drain_in_enqueue_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/cards"))
      .respond_with(ResponseTemplate::new(200))
      .expect(2)
      .mount(&server)
      .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = engine(&server.uri()).with_progress(tx);
    let first = engine
      .queue()
      .enqueue(
        OperationType::Card,
        HttpMethod::Post,
        "/api/cards",
        Some(serde_json::json!({"id": "card-9", "title": "first"})),
      )
      .unwrap();
    let second = engine
      .queue()
      .enqueue(
        OperationType::Card,
        HttpMethod::Post,
        "/api/cards",
        Some(serde_json::json!({"id": "card-9", "title": "second"})),
      )
      .unwrap();
    assert_eq!(engine.queue().len().unwrap(), 2);

    let report = engine.sync().await.unwrap();

    assert_eq!(report.succeeded, 2);
    assert!(engine.queue().is_empty().unwrap());

    let mut replayed = Vec::new();
    while let Ok(event) = rx.try_recv() {
      if let SyncEvent::Replayed { id, remaining } = event {
        replayed.push((id, remaining));
      }
    }
    assert_eq!(replayed, vec![(first.id, 1), (second.id, 0)]);

    // Requests hit the server in enqueue order
    let requests = server.received_requests().await.unwrap();
    let titles: Vec<String> = requests
      .iter()
      .map(|r| serde_json::from_slice::<serde_json::Value>(&r.body).unwrap()["title"].to_string())
      .collect();
    assert_eq!(titles, vec!["\"first\"", "\"second\""]);
  }

  #[tokio::test]
  async fn test_unauthorized_aborts_batch_without_dropping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/cards"))
      .respond_with(ResponseTemplate::new(201))
      .mount(&server)
      .await;
    Mock::given(method("PATCH"))
      .and(path("/api/cards/c1"))
      .respond_with(ResponseTemplate::new(401))
      .mount(&server)
      .await;
    Mock::given(method("DELETE"))
      .respond_with(ResponseTemplate::new(200))
      .expect(0)
      .mount(&server)
      .await;

    let engine = engine(&server.uri());
    let queue = engine.queue();
    queue
      .enqueue(OperationType::Card, HttpMethod::Post, "/api/cards", None)
      .unwrap();
    let rejected = queue
      .enqueue(OperationType::Card, HttpMethod::Patch, "/api/cards/c1", None)
      .unwrap();
    let later = queue
      .enqueue(OperationType::Card, HttpMethod::Delete, "/api/cards/c2", None)
      .unwrap();

    let report = engine.sync().await.unwrap();

    assert!(report.unauthorized);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.attempted, 2);
    let ids: Vec<String> = queue.pending().unwrap().into_iter().map(|op| op.id).collect();
    assert_eq!(ids, vec![rejected.id, later.id]);
    // An aborted pass does not count as a sync
    assert!(last_sync(engine.store.as_ref()).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_other_failures_stay_queued_and_pass_continues() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
      .respond_with(ResponseTemplate::new(500))
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;

    let engine = engine(&server.uri());
    let failing = engine
      .queue()
      .enqueue(OperationType::Board, HttpMethod::Put, "/api/boards/1", None)
      .unwrap();
    engine
      .queue()
      .enqueue(OperationType::Column, HttpMethod::Post, "/api/columns", None)
      .unwrap();

    let report = engine.sync().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);
    let pending = engine.queue().pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, failing.id);
    assert_eq!(pending[0].retry_count, 1);
    assert!(last_sync(engine.store.as_ref()).unwrap().is_some());
  }

  #[tokio::test]
  async fn test_transport_failure_keeps_everything() {
    let engine = engine("http://127.0.0.1:1");
    engine
      .queue()
      .enqueue(OperationType::Card, HttpMethod::Post, "/api/cards", None)
      .unwrap();

    let report = engine.sync().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(engine.queue().len().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_concurrent_sync_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
      .mount(&server)
      .await;

    let engine = engine(&server.uri());
    engine
      .queue()
      .enqueue(OperationType::Card, HttpMethod::Post, "/api/cards", None)
      .unwrap();

    let (a, b) = tokio::join!(engine.sync(), async {
      tokio::time::sleep(Duration::from_millis(50)).await;
      engine.sync().await
    });

    assert_eq!(a.unwrap().succeeded, 1);
    assert!(b.unwrap().skipped);
    assert!(!engine.is_syncing());
  }

  #[tokio::test]
  async fn test_reconnect_triggers_sync() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/health"))
      .respond_with(ResponseTemplate::new(200))
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/api/cards"))
      .respond_with(ResponseTemplate::new(200))
      .expect(1)
      .mount(&server)
      .await;

    let engine = Arc::new(engine(&server.uri()));
    engine
      .queue()
      .enqueue(OperationType::Card, HttpMethod::Post, "/api/cards", None)
      .unwrap();
    let monitor = engine.api.monitor().clone();
    let handle = Arc::clone(&engine).spawn_on_reconnect(&monitor);

    // Offline -> Online edge
    assert!(monitor.check_connection().await.is_online());

    for _ in 0..50 {
      if engine.queue().is_empty().unwrap() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(engine.queue().is_empty().unwrap());
    handle.abort();
  }
}
