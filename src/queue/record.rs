//! Offline action records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
  Project,
  Activity,
  Vote,
}

impl EntityType {
  pub const ALL: [EntityType; 3] = [EntityType::Project, EntityType::Activity, EntityType::Vote];

  pub fn as_str(self) -> &'static str {
    match self {
      EntityType::Project => "project",
      EntityType::Activity => "activity",
      EntityType::Vote => "vote",
    }
  }

  /// REST collection name on the remote data service.
  pub fn collection(self) -> &'static str {
    match self {
      EntityType::Project => "projects",
      EntityType::Activity => "activities",
      EntityType::Vote => "votes",
    }
  }
}

impl fmt::Display for EntityType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

impl FromStr for EntityType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    EntityType::ALL
      .into_iter()
      .find(|e| e.as_str().eq_ignore_ascii_case(s) || e.collection().eq_ignore_ascii_case(s))
      .ok_or_else(|| format!("unknown entity type '{}' (project, activity, vote)", s))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
  Create,
  Update,
  Delete,
}

impl Operation {
  pub fn as_str(self) -> &'static str {
    match self {
      Operation::Create => "create",
      Operation::Update => "update",
      Operation::Delete => "delete",
    }
  }
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

impl FromStr for Operation {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "create" => Ok(Operation::Create),
      "update" => Ok(Operation::Update),
      "delete" => Ok(Operation::Delete),
      other => Err(format!("unknown operation '{}' (create, update, delete)", other)),
    }
  }
}

/// A mutation that could not reach the remote service when it was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAction {
  pub id: String,
  pub entity_type: EntityType,
  pub operation: Operation,
  pub payload: Value,
  pub enqueued_at: DateTime<Utc>,
}

impl OfflineAction {
  pub fn new(entity_type: EntityType, operation: Operation, payload: Value) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      entity_type,
      operation,
      payload,
      enqueued_at: Utc::now(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_wire_format() {
    let action = OfflineAction {
      id: "a1".to_string(),
      entity_type: EntityType::Vote,
      operation: Operation::Create,
      payload: json!({"activity_id": 7, "value": 1}),
      enqueued_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc),
    };

    let value = serde_json::to_value(&action).unwrap();
    assert_eq!(
      value,
      json!({
        "id": "a1",
        "entityType": "vote",
        "operation": "create",
        "payload": {"activity_id": 7, "value": 1},
        "enqueuedAt": "2024-05-01T10:00:00Z",
      })
    );
  }

  #[test]
  fn test_parse_names() {
    assert_eq!("Project".parse::<EntityType>(), Ok(EntityType::Project));
    assert_eq!("activities".parse::<EntityType>(), Ok(EntityType::Activity));
    assert!("comment".parse::<EntityType>().is_err());
    assert_eq!("DELETE".parse::<Operation>(), Ok(Operation::Delete));
  }

  #[test]
  fn test_new_ids_are_unique() {
    let a = OfflineAction::new(EntityType::Project, Operation::Create, json!({}));
    let b = OfflineAction::new(EntityType::Project, Operation::Create, json!({}));
    assert_ne!(a.id, b.id);
  }
}
