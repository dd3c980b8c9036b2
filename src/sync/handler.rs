//! Remote data-service contract used to replay offline actions.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::queue::{EntityType, OfflineAction, Operation};

#[derive(Debug, Error)]
pub enum RemoteError {
  #[error("remote request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("invalid remote URL: {0}")]
  InvalidUrl(#[from] url::ParseError),

  #[error("remote rejected {operation} {entity}: status {status}")]
  Rejected {
    entity: EntityType,
    operation: Operation,
    status: u16,
  },

  #[error("{0} payload has no id")]
  MissingId(Operation),

  #[error("no handler registered for {0}")]
  NoHandler(EntityType),
}

impl RemoteError {
  /// The remote could not be reached at all, as opposed to refusing the call.
  pub fn is_unreachable(&self) -> bool {
    match self {
      RemoteError::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
      _ => false,
    }
  }
}

/// Remote create/update/delete for one entity type.
#[async_trait]
pub trait EntityHandler: Send + Sync {
  async fn create(&self, payload: &Value) -> Result<(), RemoteError>;
  async fn update(&self, id: &str, payload: &Value) -> Result<(), RemoteError>;
  async fn delete(&self, id: &str) -> Result<(), RemoteError>;
}

/// Handlers selected by entity type.
#[derive(Clone, Default)]
pub struct Handlers {
  handlers: HashMap<EntityType, Arc<dyn EntityHandler>>,
}

impl Handlers {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(mut self, entity: EntityType, handler: Arc<dyn EntityHandler>) -> Self {
    self.handlers.insert(entity, handler);
    self
  }

  pub fn get(&self, entity: EntityType) -> Option<&Arc<dyn EntityHandler>> {
    self.handlers.get(&entity)
  }

  /// Replay one action against the handler for its entity type.
  pub async fn apply(&self, action: &OfflineAction) -> Result<(), RemoteError> {
    let handler = self
      .get(action.entity_type)
      .ok_or(RemoteError::NoHandler(action.entity_type))?;

    match action.operation {
      Operation::Create => handler.create(&action.payload).await,
      Operation::Update => {
        let id = target_id(action)?;
        handler.update(&id, &action.payload).await
      }
      Operation::Delete => {
        let id = target_id(action)?;
        handler.delete(&id).await
      }
    }
  }
}

/// The `id` field of the payload, as a string.
fn target_id(action: &OfflineAction) -> Result<String, RemoteError> {
  match action.payload.get("id") {
    Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
    Some(Value::Number(id)) => Ok(id.to_string()),
    _ => Err(RemoteError::MissingId(action.operation)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::RecordingHandler;
  use serde_json::json;

  #[tokio::test]
  async fn test_operations_map_to_handler_calls() {
    let votes = Arc::new(RecordingHandler::new());
    let handlers = Handlers::new().register(EntityType::Vote, votes.clone());

    let create = OfflineAction::new(EntityType::Vote, Operation::Create, json!({"value": 1}));
    let update = OfflineAction::new(EntityType::Vote, Operation::Update, json!({"id": 12, "value": -1}));
    let delete = OfflineAction::new(EntityType::Vote, Operation::Delete, json!({"id": "v-9"}));

    handlers.apply(&create).await.unwrap();
    handlers.apply(&update).await.unwrap();
    handlers.apply(&delete).await.unwrap();

    assert_eq!(votes.calls(), vec!["create:-", "update:12", "delete:v-9"]);
  }

  #[tokio::test]
  async fn test_missing_id_and_handler() {
    let handlers = Handlers::new().register(EntityType::Project, Arc::new(RecordingHandler::new()));

    let update = OfflineAction::new(EntityType::Project, Operation::Update, json!({"name": "x"}));
    assert!(matches!(
      handlers.apply(&update).await,
      Err(RemoteError::MissingId(Operation::Update))
    ));

    let vote = OfflineAction::new(EntityType::Vote, Operation::Create, json!({}));
    assert!(matches!(
      handlers.apply(&vote).await,
      Err(RemoteError::NoHandler(EntityType::Vote))
    ));
  }
}
