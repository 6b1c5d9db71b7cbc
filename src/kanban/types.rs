use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Board summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<String>,
  /// Server fields we don't model, kept so the cached copy stays complete
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Column of a board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  #[serde(deserialize_with = "deserialize_id")]
  pub board_id: String,
  pub title: String,
  #[serde(default)]
  pub position: i64,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Card within a column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  #[serde(deserialize_with = "deserialize_id")]
  pub column_id: String,
  #[serde(
    default,
    deserialize_with = "deserialize_optional_id",
    skip_serializing_if = "Option::is_none"
  )]
  pub board_id: Option<String>,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub position: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub labels: Vec<Label>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Label attached to a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
  #[serde(default, deserialize_with = "deserialize_optional_id")]
  pub id: Option<String>,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
}

/// Accept ids sent either as strings or as numbers
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!(
      "expected string or number id, got {}",
      other
    ))),
  }
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<Value>::deserialize(deserializer)? {
    None | Some(Value::Null) => Ok(None),
    Some(Value::String(s)) => Ok(Some(s)),
    Some(Value::Number(n)) => Ok(Some(n.to_string())),
    Some(other) => Err(serde::de::Error::custom(format!(
      "expected string or number id, got {}",
      other
    ))),
  }
}
