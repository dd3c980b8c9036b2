//! Scripted collaborators shared by unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::http::{Fetcher, NetworkError, Request, Response};
use crate::queue::{EntityType, Operation};
use crate::sync::{EntityHandler, RemoteError};

fn normalize(url: &str) -> String {
  Url::parse(url)
    .map(|u| u.to_string())
    .unwrap_or_else(|_| url.to_string())
}

/// Fetcher answering from a route table; unknown URLs get a 404.
#[derive(Default)]
pub struct ScriptedFetcher {
  routes: Mutex<HashMap<String, Response>>,
  offline: AtomicBool,
  calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, url: &str, response: Response) {
    self.routes.lock().unwrap().insert(normalize(url), response);
  }

  /// While offline every fetch fails with a network error.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Number of fetches attempted, including failed ones.
  pub fn calls(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn reset_calls(&self) {
    self.calls.lock().unwrap().clear();
  }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let url = request.url.to_string();
    self
      .calls
      .lock()
      .unwrap()
      .push(format!("{} {}", request.method, url));

    if self.offline.load(Ordering::SeqCst) {
      return Err(NetworkError::Unavailable(url));
    }

    Ok(
      self
        .routes
        .lock()
        .unwrap()
        .get(&url)
        .cloned()
        .unwrap_or_else(|| Response::new(404, "not found")),
    )
  }
}

/// Entity handler that records calls as `operation:ref`.
///
/// `ref` is the payload's `ref` field, else its `id`, else `-`.
#[derive(Default)]
pub struct RecordingHandler {
  calls: Mutex<Vec<String>>,
  failing: Mutex<HashSet<String>>,
  delay: Duration,
}

impl RecordingHandler {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  /// Make every call for `reference` fail.
  pub fn fail_ref(&self, reference: &str) {
    self.failing.lock().unwrap().insert(reference.to_string());
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  async fn record(&self, operation: Operation, reference: String) -> Result<(), RemoteError> {
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    self
      .calls
      .lock()
      .unwrap()
      .push(format!("{}:{}", operation, reference));

    if self.failing.lock().unwrap().contains(&reference) {
      return Err(RemoteError::Rejected {
        entity: EntityType::Project,
        operation,
        status: 500,
      });
    }
    Ok(())
  }
}

fn reference(payload: &Value) -> String {
  match payload.get("ref").or_else(|| payload.get("id")) {
    Some(Value::String(s)) => s.clone(),
    Some(other) => other.to_string(),
    None => "-".to_string(),
  }
}

#[async_trait]
impl EntityHandler for RecordingHandler {
  async fn create(&self, payload: &Value) -> Result<(), RemoteError> {
    self.record(Operation::Create, reference(payload)).await
  }

  async fn update(&self, id: &str, _payload: &Value) -> Result<(), RemoteError> {
    self.record(Operation::Update, id.to_string()).await
  }

  async fn delete(&self, id: &str) -> Result<(), RemoteError> {
    self.record(Operation::Delete, id.to_string()).await
  }
}
