//! Offline-aware Kanban client that wraps ApiClient with the local store.

use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;

use super::client::{is_network_error, ApiClient};
use super::records::{BY_BOARD, BY_COLUMN};
use super::reorder;
use super::types::{Board, Card, Column, Label};
use crate::store::{CacheResult, LocalStore, StoreName};
use crate::sync::{HttpMethod, OperationType, PendingOperation, PendingQueue};

/// What happened to a mutation
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
  /// The server accepted it
  Sent,
  /// The server was unreachable (or earlier work is still queued); it will be replayed
  Queued(PendingOperation),

}

/// Kanban client with offline support.
///
/// Reads are network-first: fresh data is written through to the local
/// store, and when the server can't be reached the stored snapshot is
/// returned instead. Writes go to the server or into the pending queue,
/// and the local store is updated once either has taken them. A write the
/// server rejects leaves the store untouched.
pub struct OfflineApi<S: LocalStore> {
  inner: ApiClient,
  store: Arc<S>,
  queue: PendingQueue<S>,
}

impl<S: LocalStore> OfflineApi<S> {
  pub fn new(inner: ApiClient, store: Arc<S>) -> Self {
    let queue = PendingQueue::new(Arc::clone(&store));
    Self { inner, store, queue }
  }

  /// Get all boards.
  pub async fn boards(&self) -> Result<CacheResult<Vec<Board>>> {
    self
      .network_first(
        "boards",
        self.inner.get_boards(),
        |boards| self.store.replace_all(boards),
        || self.store.get_all(),
      )
      .await
  }

  /// Get a single board.
  pub async fn board(&self, board_id: &str) -> Result<CacheResult<Board>> {
    self
      .network_first(
        "board",
        self.inner.get_board(board_id),
        |board| self.store.put(board),
        || {
          self
            .store
            .get::<Board>(board_id)?
            .ok_or_else(|| eyre!("Board {} is not available offline", board_id))
        },
      )
      .await
  }

  /// Get the columns of a board, ordered by position.
  pub async fn columns(&self, board_id: &str) -> Result<CacheResult<Vec<Column>>> {
    self
      .network_first(
        "columns",
        self.inner.get_columns(board_id),
        |columns| self.store.replace_by_index(BY_BOARD, board_id, columns),
        || {
          let mut columns: Vec<Column> = self.store.get_by_index(BY_BOARD, board_id)?;
          columns.sort_by_key(|c| c.position);
          Ok(columns)
        },
      )
      .await
  }

  /// Get the cards of a column, ordered by position.
  pub async fn cards(&self, column_id: &str) -> Result<CacheResult<Vec<Card>>> {
    self
      .network_first(
        "cards",
        self.inner.get_cards(column_id),
        |cards| self.store.replace_by_index(BY_COLUMN, column_id, cards),
        || self.cached_cards(column_id),
      )
      .await
  }

  /// Create a card at the end of a column.
  pub async fn create_card(
    &self,
    column_id: &str,
    title: &str,
    description: Option<&str>,
  ) -> Result<(Card, WriteOutcome)> {
    let board_id = self.store.get::<Column>(column_id)?.map(|c| c.board_id);
    let position = self.cached_cards(column_id)?.len() as i64;

    let card = Card {
      // Client-generated; the server's copy replaces it on the next fetch
      id: uuid::Uuid::new_v4().to_string(),
      column_id: column_id.to_string(),
      board_id,
      title: title.to_string(),
      description: description.map(String::from),
      position,
      due_date: None,
      labels: Vec::new(),
      extra: Map::new(),
    };

    let data = serde_json::to_value(&card).map_err(|e| eyre!("Failed to encode card: {}", e))?;
    let outcome = self
      .dispatch(OperationType::Card, HttpMethod::Post, "/api/cards".to_string(), Some(data))
      .await?;
    self.store.put(&card)?;
    Ok((card, outcome))
  }

  /// Apply a partial update to a card.
  pub async fn update_card(&self, card_id: &str, changes: Map<String, Value>) -> Result<WriteOutcome> {
    let updated = match self.store.get::<Card>(card_id)? {
      Some(card) => Some(merge(&card, &changes)?),
      None => None,
    };

    let outcome = self
      .dispatch(
        OperationType::Card,
        HttpMethod::Patch,
        format!("/api/cards/{}", card_id),
        Some(Value::Object(changes)),
      )
      .await?;
    if let Some(card) = updated {
      self.store.put(&card)?;
    }
    Ok(outcome)
  }

  /// Move a card to `to_index` in `to_column` (same or another column).
  pub async fn move_card(&self, card_id: &str, to_column: &str, to_index: usize) -> Result<WriteOutcome> {
    let card = self
      .store
      .get::<Card>(card_id)?
      .ok_or_else(|| eyre!("Card {} is not in the local store", card_id))?;

    let mut affected = self.cached_cards(&card.column_id)?;
    if card.column_id != to_column {
      affected.extend(self.cached_cards(to_column)?);
    }

    let changed = reorder::move_card(&affected, card_id, to_column, to_index)?;
    let position = changed
      .iter()
      .find(|c| c.id == card_id)
      .map_or(card.position, |c| c.position);

    let outcome = self
      .dispatch(
        OperationType::Card,
        HttpMethod::Patch,
        format!("/api/cards/{}", card_id),
        Some(json!({ "columnId": to_column, "position": position })),
      )
      .await?;
    for updated in &changed {
      self.store.put(updated)?;
    }
    Ok(outcome)
  }

  /// Delete a card.
  pub async fn delete_card(&self, card_id: &str) -> Result<WriteOutcome> {
    let outcome = self
      .dispatch(
        OperationType::Card,
        HttpMethod::Delete,
        format!("/api/cards/{}", card_id),
        None,
      )
      .await?;
    self.store.remove(StoreName::Cards, card_id)?;
    Ok(outcome)
  }

  /// Attach a label to a card.
  pub async fn add_label(&self, card_id: &str, name: &str, color: Option<&str>) -> Result<WriteOutcome> {
    let label = Label {
      id: None,
      name: name.to_string(),
      color: color.map(String::from),
    };

    let data = serde_json::to_value(&label).map_err(|e| eyre!("Failed to encode label: {}", e))?;
    let outcome = self
      .dispatch(
        OperationType::Label,
        HttpMethod::Post,
        format!("/api/cards/{}/labels", card_id),
        Some(data),
      )
      .await?;

    if let Some(mut card) = self.store.get::<Card>(card_id)? {
      if !card.labels.iter().any(|l| l.name == label.name) {
        card.labels.push(label);
        self.store.put(&card)?;
      }
    }
    Ok(outcome)
  }

  /// Create a column at the end of a board.
  pub async fn create_column(&self, board_id: &str, title: &str) -> Result<(Column, WriteOutcome)> {
    let existing: Vec<Column> = self.store.get_by_index(BY_BOARD, board_id)?;

    let column = Column {
      id: uuid::Uuid::new_v4().to_string(),
      board_id: board_id.to_string(),
      title: title.to_string(),
      position: existing.len() as i64,
      extra: Map::new(),
    };

    let data = serde_json::to_value(&column).map_err(|e| eyre!("Failed to encode column: {}", e))?;
    let outcome = self
      .dispatch(OperationType::Column, HttpMethod::Post, "/api/columns".to_string(), Some(data))
      .await?;
    self.store.put(&column)?;
    Ok((column, outcome))
  }

  /// Move a column to `to_index` within its board.
  pub async fn move_column(&self, column_id: &str, to_index: usize) -> Result<WriteOutcome> {
    let column = self
      .store
      .get::<Column>(column_id)?
      .ok_or_else(|| eyre!("Column {} is not in the local store", column_id))?;
    let siblings: Vec<Column> = self.store.get_by_index(BY_BOARD, &column.board_id)?;

    let changed = reorder::reorder_columns(&siblings, column_id, to_index)?;
    let position = changed
      .iter()
      .find(|c| c.id == column_id)
      .map_or(column.position, |c| c.position);

    let outcome = self
      .dispatch(
        OperationType::Column,
        HttpMethod::Patch,
        format!("/api/columns/{}", column_id),
        Some(json!({ "position": position })),
      )
      .await?;
    for updated in &changed {
      self.store.put(updated)?;
    }
    Ok(outcome)
  }

  /// Rename a board.
  pub async fn update_board(&self, board_id: &str, title: &str) -> Result<WriteOutcome> {
    let outcome = self
      .dispatch(
        OperationType::Board,
        HttpMethod::Patch,
        format!("/api/boards/{}", board_id),
        Some(json!({ "title": title })),
      )
      .await?;

    if let Some(mut board) = self.store.get::<Board>(board_id)? {
      board.title = title.to_string();
      self.store.put(&board)?;
    }
    Ok(outcome)
  }

  fn cached_cards(&self, column_id: &str) -> Result<Vec<Card>> {
    let mut cards: Vec<Card> = self.store.get_by_index(BY_COLUMN, column_id)?;
    cards.sort_by_key(|c| c.position);
    Ok(cards)
  }

  async fn network_first<T, Fut, W, F>(&self, what: &str, fetch: Fut, write: W, fallback: F) -> Result<CacheResult<T>>
  where
    Fut: Future<Output = Result<T>>,
    W: FnOnce(&T) -> Result<()>,
    F: FnOnce() -> Result<T>,
  {
    match fetch.await {
      Ok(data) => {
        if let Err(e) = write(&data) {
          // Fresh data is still good to return; it just won't be there offline
          tracing::warn!(error = %e, what, "failed to write through to local store");
        }
        Ok(CacheResult::from_network(data))
      }
      Err(e) if is_network_error(&e) => {
        tracing::info!(what, "server unreachable, serving local copy");
        Ok(CacheResult::offline(fallback()?))
      }
      Err(e) => Err(e),
    }
  }

  async fn dispatch(
    &self,
    op_type: OperationType,
    method: HttpMethod,
    endpoint: String,
    data: Option<Value>,
  ) -> Result<WriteOutcome> {
    // Replay order must match the order mutations were made in
    if !self.queue.is_empty()? {
      let op = self.queue.enqueue(op_type, method, &endpoint, data)?;
      return Ok(WriteOutcome::Queued(op));
    }

    match self.inner.send(method, &endpoint, data.as_ref()).await {
      Ok(status) if status.is_success() => Ok(WriteOutcome::Sent),
      Ok(status) => Err(eyre!("{} {} rejected with {}", method, endpoint, status)),
      Err(e) if is_network_error(&e) => {
        let op = self.queue.enqueue(op_type, method, &endpoint, data)?;
        Ok(WriteOutcome::Queued(op))
      }
      Err(e) => Err(e),
    }
  }
}

impl<S: LocalStore> Clone for OfflineApi<S> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
      store: Arc::clone(&self.store),
      queue: self.queue.clone(),
    }
  }
}

/// Overlay `changes` onto a card's JSON form
fn merge(card: &Card, changes: &Map<String, Value>) -> Result<Card> {
  let mut value = serde_json::to_value(card).map_err(|e| eyre!("Failed to encode card: {}", e))?;
  if let Value::Object(fields) = &mut value {
    for (k, v) in changes {
      fields.insert(k.clone(), v.clone());
    }
  }
  serde_json::from_value(value).map_err(|e| eyre!("Invalid card update: {}", e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::connectivity::ConnectivityMonitor;
  use crate::db::Database;
  use crate::store::{CacheSource, SqliteStore};
  use url::Url;
  use wiremock::matchers::{body_partial_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn offline_api(base: &str) -> (OfflineApi<SqliteStore>, Arc<SqliteStore>) {
    let base = Url::parse(base).unwrap();
    let http = reqwest::Client::new();
    let monitor = ConnectivityMonitor::new(http.clone(), base.join("/api/health").unwrap());
    let store = Arc::new(SqliteStore::new(Arc::new(Database::open_in_memory().unwrap())));
    let api = OfflineApi::new(ApiClient::new(base, http, None, monitor), Arc::clone(&store));
    (api, store)
  }

  fn cards_json() -> Value {
    json!([
      {"id": "k2", "columnId": "todo", "boardId": "b1", "title": "Second", "position": 1},
      {"id": "k1", "columnId": "todo", "boardId": "b1", "title": "First", "position": 0}
    ])
  }

  #[tokio::test]
  async fn test_reads_write_through_and_fall_back_offline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/columns/todo/cards"))
      .respond_with(ResponseTemplate::new(200).set_body_json(cards_json()))
      .mount(&server)
      .await;

    let (api, store) = offline_api(&server.uri());
    let online = api.cards("todo").await.unwrap();
    assert_eq!(online.source, CacheSource::Network);
    assert_eq!(store.count(StoreName::Cards).unwrap(), 2);

    // Same store, server gone
    let dead = OfflineApi::new(
      {
        let base = Url::parse("http://127.0.0.1:1").unwrap();
        let http = reqwest::Client::new();
        let monitor = ConnectivityMonitor::new(http.clone(), base.join("/api/health").unwrap());
        ApiClient::new(base, http, None, monitor)
      },
      Arc::clone(&store),
    );
    let offline = dead.cards("todo").await.unwrap();
    assert!(offline.is_offline());
    let titles: Vec<_> = offline.data.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second"]);
  }

  #[tokio::test]
  async fn test_server_data_supersedes_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/columns/todo/cards"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        {"id": "k1", "columnId": "todo", "title": "Only one left", "position": 0}
      ])))
      .mount(&server)
      .await;

    let (api, store) = offline_api(&server.uri());
    let stale: Vec<Card> = serde_json::from_value(cards_json()).unwrap();
    for card in &stale {
      store.put(card).unwrap();
    }

    api.cards("todo").await.unwrap();

    let cached: Vec<Card> = store.get_by_index(BY_COLUMN, "todo").unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].title, "Only one left");
  }

  #[tokio::test]
  async fn test_http_errors_are_not_masked_by_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(403))
      .mount(&server)
      .await;

    let (api, _store) = offline_api(&server.uri());
    assert!(api.boards().await.is_err());
  }

  #[tokio::test]
  async fn test_offline_board_miss_is_an_error() {
    let (api, _store) = offline_api("http://127.0.0.1:1");
    let err = api.board("b404").await.unwrap_err();
    assert!(err.to_string().contains("not available offline"));
  }

  #[tokio::test]
  async fn test_create_card_online_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/cards"))
      .and(body_partial_json(json!({"columnId": "todo", "title": "New", "position": 0})))
      .respond_with(ResponseTemplate::new(201))
      .expect(1)
      .mount(&server)
      .await;

    let (api, store) = offline_api(&server.uri());
    let (card, outcome) = api.create_card("todo", "New", None).await.unwrap();

    assert_eq!(outcome, WriteOutcome::Sent);
    assert!(store.get::<Card>(&card.id).unwrap().is_some());
  }

  #[tokio::test]
  async fn test_create_card_offline_is_queued_and_cached() {
    let (api, store) = offline_api("http://127.0.0.1:1");

    let (card, outcome) = api.create_card("todo", "Offline card", Some("later")).await.unwrap();

    let WriteOutcome::Queued(op) = outcome else {
      panic!("expected queued outcome");
    };
    assert_eq!(op.method, HttpMethod::Post);
    assert_eq!(op.endpoint, "/api/cards");
    assert_eq!(op.data.as_ref().unwrap()["title"], "Offline card");
    assert_eq!(store.get::<Card>(&card.id).unwrap().unwrap().description.as_deref(), Some("later"));
    assert_eq!(store.count(StoreName::PendingOperations).unwrap(), 1);
  }

  #[tokio::test]
  async fn test_writes_queue_behind_pending_work() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
      .respond_with(ResponseTemplate::new(200))
      .expect(0)
      .mount(&server)
      .await;

    let (api, store) = offline_api(&server.uri());
    api
      .queue
      .enqueue(OperationType::Board, HttpMethod::Patch, "/api/boards/b1", None)
      .unwrap();

    let outcome = api.update_board("b1", "Renamed").await.unwrap();

    assert!(matches!(outcome, WriteOutcome::Queued(_)));
    assert_eq!(store.count(StoreName::PendingOperations).unwrap(), 2);
  }

  #[tokio::test]
  async fn test_rejected_write_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let (api, store) = offline_api(&server.uri());
    assert!(api.delete_card("k1").await.is_err());
    assert_eq!(store.count(StoreName::PendingOperations).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_rejected_writes_leave_store_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .respond_with(ResponseTemplate::new(403))
      .mount(&server)
      .await;
    Mock::given(method("PATCH"))
      .respond_with(ResponseTemplate::new(500))
      .mount(&server)
      .await;

    let (api, store) = offline_api(&server.uri());
    let cards: Vec<Card> = serde_json::from_value(cards_json()).unwrap();
    for card in &cards {
      store.put(card).unwrap();
    }
    store
      .put(&Board {
        id: "b1".to_string(),
        title: "Roadmap".to_string(),
        description: None,
        updated_at: None,
        extra: Map::new(),
      })
      .unwrap();

    assert!(api.delete_card("k1").await.is_err());
    assert!(api.move_card("k2", "done", 0).await.is_err());
    assert!(api.update_board("b1", "Renamed").await.is_err());
    let mut changes = Map::new();
    changes.insert("title".to_string(), json!("Edited"));
    assert!(api.update_card("k1", changes).await.is_err());

    let todo = api.cached_cards("todo").unwrap();
    let titles: Vec<_> = todo.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second"]);
    assert!(store.get_by_index::<Card>(BY_COLUMN, "done").unwrap().is_empty());
    assert_eq!(store.get::<Board>("b1").unwrap().unwrap().title, "Roadmap");
    assert_eq!(store.count(StoreName::PendingOperations).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_move_card_offline_reorders_cache() {
    let (api, store) = offline_api("http://127.0.0.1:1");
    let cards: Vec<Card> = serde_json::from_value(cards_json()).unwrap();
    for card in &cards {
      store.put(card).unwrap();
    }

    let outcome = api.move_card("k2", "done", 0).await.unwrap();

    let WriteOutcome::Queued(op) = outcome else {
      panic!("expected queued outcome");
    };
    assert_eq!(op.endpoint, "/api/cards/k2");
    assert_eq!(op.data, Some(json!({"columnId": "done", "position": 0})));

    let done: Vec<Card> = store.get_by_index(BY_COLUMN, "done").unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].id, "k2");
    let todo: Vec<Card> = store.get_by_index(BY_COLUMN, "todo").unwrap();
    assert_eq!(todo.len(), 1);
    assert_eq!(todo[0].position, 0);
  }

  #[tokio::test]
  async fn test_update_card_merges_into_cache() {
    let (api, store) = offline_api("http://127.0.0.1:1");
    let cards: Vec<Card> = serde_json::from_value(cards_json()).unwrap();
    store.put(&cards[0]).unwrap();

    let mut changes = Map::new();
    changes.insert("title".to_string(), json!("Edited"));
    changes.insert("dueDate".to_string(), json!("2026-11-01"));
    api.update_card("k2", changes).await.unwrap();

    let card = store.get::<Card>("k2").unwrap().unwrap();
    assert_eq!(card.title, "Edited");
    assert_eq!(card.due_date.as_deref(), Some("2026-11-01"));
  }

  #[tokio::test]
  async fn test_add_label_is_a_label_operation() {
    let (api, store) = offline_api("http://127.0.0.1:1");
    let cards: Vec<Card> = serde_json::from_value(cards_json()).unwrap();
    store.put(&cards[1]).unwrap();

    let outcome = api.add_label("k1", "urgent", Some("red")).await.unwrap();

    let WriteOutcome::Queued(op) = outcome else {
      panic!("expected queued outcome");
    };
    assert_eq!(op.op_type, OperationType::Label);
    assert_eq!(store.get::<Card>("k1").unwrap().unwrap().labels[0].name, "urgent");
  }

  #[tokio::test]
  async fn test_create_and_move_column_offline() {
    let (api, store) = offline_api("http://127.0.0.1:1");

    let (first, _) = api.create_column("b1", "Todo").await.unwrap();
    let (second, _) = api.create_column("b1", "Done").await.unwrap();
    assert_eq!(second.position, 1);

    api.move_column(&second.id, 0).await.unwrap();

    let moved = store.get::<Column>(&second.id).unwrap().unwrap();
    let shifted = store.get::<Column>(&first.id).unwrap().unwrap();
    assert_eq!(moved.position, 0);
    assert_eq!(shifted.position, 1);
    assert_eq!(store.count(StoreName::PendingOperations).unwrap(), 3);
  }
}
