use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::store::{Record, StoreName};

/// Index of pending operations by enqueue time
pub const BY_TIMESTAMP: &str = "timestamp";
/// Index of pending operations by entity type
pub const BY_TYPE: &str = "type";

/// Entity a pending operation mutates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
  Board,
  Card,
  Column,
  Label,
}

impl OperationType {
  pub fn as_str(&self) -> &'static str {
    match self {
      OperationType::Board => "board",
      OperationType::Card => "card",
      OperationType::Column => "column",
      OperationType::Label => "label",
    }
  }
}

impl fmt::Display for OperationType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// HTTP method of a recorded mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
  Post,
  Put,
  Patch,
  Delete,
}

impl HttpMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      HttpMethod::Post => "POST",
      HttpMethod::Put => "PUT",
      HttpMethod::Patch => "PATCH",
      HttpMethod::Delete => "DELETE",
    }
  }
}

impl fmt::Display for HttpMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<HttpMethod> for reqwest::Method {
  fn from(method: HttpMethod) -> Self {
    match method {
      HttpMethod::Post => reqwest::Method::POST,
      HttpMethod::Put => reqwest::Method::PUT,
      HttpMethod::Patch => reqwest::Method::PATCH,
      HttpMethod::Delete => reqwest::Method::DELETE,
    }
  }
}

/// A recorded mutation waiting for network replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
  pub id: String,
  #[serde(rename = "type")]
  pub op_type: OperationType,
  pub method: HttpMethod,
  pub endpoint: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<Value>,
  /// Milliseconds since the Unix epoch
  pub timestamp: i64,
  #[serde(default)]
  pub retry_count: u32,
}

impl PendingOperation {
  pub fn new(
    op_type: OperationType,
    method: HttpMethod,
    endpoint: impl Into<String>,
    data: Option<Value>,
  ) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      op_type,
      method,
      endpoint: endpoint.into(),
      data,
      timestamp: Utc::now().timestamp_millis(),
      retry_count: 0,
    }
  }
}

impl Record for PendingOperation {
  fn store() -> StoreName {
    StoreName::PendingOperations
  }

  fn record_key(&self) -> String {
    self.id.clone()
  }

  fn index_values(&self) -> Vec<(&'static str, String)> {
    vec![
      // Zero-padded so the text index sorts numerically
      (BY_TIMESTAMP, format!("{:020}", self.timestamp)),
      (BY_TYPE, self.op_type.as_str().to_string()),
    ]
  }
}
