//! Pending-operation queue persisted in the local store.

use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;

use super::operation::{HttpMethod, OperationType, PendingOperation};
use crate::store::{LocalStore, StoreName};

/// FIFO of mutations recorded while offline.
pub struct PendingQueue<S: LocalStore> {
  store: Arc<S>,
}

impl<S: LocalStore> PendingQueue<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store }
  }

  /// Record a mutation for later replay.
  pub fn enqueue(
    &self,
    op_type: OperationType,
    method: HttpMethod,
    endpoint: &str,
    data: Option<Value>,
  ) -> Result<PendingOperation> {
    let op = PendingOperation::new(op_type, method, endpoint, data);
    self.store.put(&op)?;
    tracing::info!(id = %op.id, %method, endpoint, "queued pending operation");
    Ok(op)
  }

  /// All pending operations in enqueue order.
  ///
  /// Ordered by timestamp; operations sharing a millisecond keep insertion order.
  pub fn pending(&self) -> Result<Vec<PendingOperation>> {
    let mut ops: Vec<PendingOperation> = self.store.get_all()?;
    ops.sort_by_key(|op| op.timestamp);
    Ok(ops)
  }

  pub fn len(&self) -> Result<usize> {
    self.store.count(StoreName::PendingOperations)
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }

  /// Drop a replayed (or discarded) operation.
  pub fn remove(&self, id: &str) -> Result<()> {
    self.store.remove(StoreName::PendingOperations, id)
  }

  /// Bump the retry counter after a failed replay.
  pub fn record_failure(&self, op: &PendingOperation) -> Result<PendingOperation> {
    let mut updated = op.clone();
    updated.retry_count = updated.retry_count.saturating_add(1);
    self.store.put(&updated)?;
    Ok(updated)
  }

  pub fn clear(&self) -> Result<()> {
    self.store.clear(StoreName::PendingOperations)
  }
}

impl<S: LocalStore> Clone for PendingQueue<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
    }
  }
}
