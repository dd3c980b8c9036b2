use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use super::handler::{EntityHandler, Handlers, RemoteError};
use crate::queue::{EntityType, Operation};

/// REST handler for one collection of the remote data service
#[derive(Clone)]
pub struct RestHandler {
  client: reqwest::Client,
  base: Url,
  entity: EntityType,
}

impl RestHandler {
  pub fn new(client: reqwest::Client, base: Url, entity: EntityType) -> Self {
    Self {
      client,
      base,
      entity,
    }
  }

  /// Handlers for every entity type against `base`
  pub fn handlers(client: reqwest::Client, base: &Url) -> Handlers {
    EntityType::ALL
      .into_iter()
      .fold(Handlers::new(), |handlers, entity| {
        handlers.register(
          entity,
          Arc::new(RestHandler::new(client.clone(), base.clone(), entity)),
        )
      })
  }

  fn collection_url(&self) -> Result<Url, RemoteError> {
    Ok(self.base.join(self.entity.collection())?)
  }

  fn item_url(&self, id: &str) -> Result<Url, RemoteError> {
    Ok(
      self
        .base
        .join(&format!("{}/{}", self.entity.collection(), id))?,
    )
  }

  async fn send(
    &self,
    operation: Operation,
    request: reqwest::RequestBuilder,
  ) -> Result<(), RemoteError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
      return Err(RemoteError::Rejected {
        entity: self.entity,
        operation,
        status: status.as_u16(),
      });
    }

    Ok(())
  }
}

#[async_trait]
impl EntityHandler for RestHandler {
  /// POST {base}/{collection}
  async fn create(&self, payload: &Value) -> Result<(), RemoteError> {
    let url = self.collection_url()?;
    self
      .send(Operation::Create, self.client.post(url).json(payload))
      .await
  }

  /// PATCH {base}/{collection}/{id}
  async fn update(&self, id: &str, payload: &Value) -> Result<(), RemoteError> {
    let url = self.item_url(id)?;
    self
      .send(Operation::Update, self.client.patch(url).json(payload))
      .await
  }

  /// DELETE {base}/{collection}/{id}
  async fn delete(&self, id: &str) -> Result<(), RemoteError> {
    let url = self.item_url(id)?;
    self.send(Operation::Delete, self.client.delete(url)).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{body_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn base(server: &MockServer) -> Url {
    Url::parse(&format!("{}/rest/v1/", server.uri())).unwrap()
  }

  #[tokio::test]
  async fn test_create_posts_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/rest/v1/projects"))
      .and(body_json(json!({"name": "Garden"})))
      .respond_with(ResponseTemplate::new(201))
      .expect(1)
      .mount(&server)
      .await;

    let handler = RestHandler::new(reqwest::Client::new(), base(&server), EntityType::Project);
    handler.create(&json!({"name": "Garden"})).await.unwrap();
  }

  #[tokio::test]
  async fn test_update_and_delete_target_item() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
      .and(path("/rest/v1/activities/42"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("DELETE"))
      .and(path("/rest/v1/activities/42"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let handler = RestHandler::new(reqwest::Client::new(), base(&server), EntityType::Activity);
    handler.update("42", &json!({"id": 42, "title": "Walk"})).await.unwrap();
    handler.delete("42").await.unwrap();
  }

  #[tokio::test]
  async fn test_rejection_is_typed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(422))
      .mount(&server)
      .await;

    let handler = RestHandler::new(reqwest::Client::new(), base(&server), EntityType::Vote);
    let err = handler.create(&json!({})).await.unwrap_err();
    assert!(matches!(
      err,
      RemoteError::Rejected {
        entity: EntityType::Vote,
        operation: Operation::Create,
        status: 422
      }
    ));
    assert!(!err.is_unreachable());
  }

  #[tokio::test]
  async fn test_unreachable_remote() {
    let base = Url::parse("http://127.0.0.1:9/rest/v1/").unwrap();
    let handler = RestHandler::new(reqwest::Client::new(), base, EntityType::Vote);
    let err = handler.create(&json!({})).await.unwrap_err();
    assert!(err.is_unreachable());
  }
}
