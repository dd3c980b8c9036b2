//! Request/response model and the network seam.
//!
//! Every strategy talks to the network through [`Fetcher`], so the same
//! caching logic runs against reqwest in production and against scripted
//! fetchers in tests.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::cache::RequestKey;

/// What kind of resource the consumer is going to do with the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Destination {
  /// A navigable document (top-level page load)
  Document,
  Script,
  Style,
  Image,
  Font,
  Manifest,
  /// Data fetches and anything without a more specific destination
  #[default]
  Other,
}

impl Destination {
  pub fn is_navigable(self) -> bool {
    matches!(self, Destination::Document)
  }
}

impl FromStr for Destination {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "document" => Ok(Self::Document),
      "script" => Ok(Self::Script),
      "style" => Ok(Self::Style),
      "image" => Ok(Self::Image),
      "font" => Ok(Self::Font),
      "manifest" => Ok(Self::Manifest),
      "" | "other" => Ok(Self::Other),
      other => Err(format!("unknown destination '{}'", other)),
    }
  }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: BTreeMap<String, String>,
  pub body: Option<Vec<u8>>,
  pub destination: Destination,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: BTreeMap::new(),
      body: None,
      destination: Destination::Other,
    }
  }

  /// Plain `GET` request.
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// Top-level document navigation.
  pub fn navigate(url: Url) -> Self {
    Self::get(url).with_destination(Destination::Document)
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = Some(body.into());
    self
  }

  /// Whether the URL is network-addressable (`http` or `https`).
  pub fn is_http(&self) -> bool {
    matches!(self.url.scheme(), "http" | "https")
  }

  /// Only safe, network-addressable requests may ever be cached.
  pub fn is_cacheable(&self) -> bool {
    self.method == Method::GET && self.is_http()
  }

  pub fn cache_key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }
}

/// A captured response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

/// JSON body of the synthetic response served when an API call cannot reach
/// the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineBody {
  pub error: String,
  pub offline: bool,
}

const OFFLINE_API_MESSAGE: &str = "Network unavailable. The request could not be completed offline.";

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }

  /// 2xx status.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  /// 503 with `{"error": ..., "offline": true}`.
  pub fn offline_api() -> Self {
    let body = serde_json::json!({
      "error": OFFLINE_API_MESSAGE,
      "offline": true,
    });
    Self::new(503, body.to_string()).with_header("content-type", "application/json")
  }

  /// Served for a document when neither the network nor any cache can answer.
  pub fn offline_page() -> Self {
    Self::new(
      503,
      "<!doctype html><title>Offline</title><p>You are offline and this page has not been cached.</p>",
    )
    .with_header("content-type", "text/html; charset=utf-8")
  }

  /// 404 for a static resource that is neither cached nor reachable.
  pub fn unavailable() -> Self {
    Self::new(404, "Resource unavailable offline").with_header("content-type", "text/plain")
  }

  /// Parse the synthetic offline body, letting callers tell a deferred
  /// offline failure apart from a real server error.
  pub fn offline_body(&self) -> Option<OfflineBody> {
    if self.status != 503 {
      return None;
    }
    serde_json::from_slice::<OfflineBody>(&self.body)
      .ok()
      .filter(|body| body.offline)
  }
}

/// Failure to obtain any response from the network.
#[derive(Debug, Error)]
pub enum NetworkError {
  #[error("request to {url} failed: {source}")]
  Transport {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("unsupported URL scheme: {0}")]
  UnsupportedScheme(String),

  #[error("network unavailable: {0}")]
  Unavailable(String),
}

/// The network contract: one request in, one response (any status) out.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// reqwest-backed fetcher.
#[derive(Clone)]
pub struct ReqwestFetcher {
  client: reqwest::Client,
}

impl ReqwestFetcher {
  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    if !request.is_http() {
      return Err(NetworkError::UnsupportedScheme(request.url.to_string()));
    }

    let transport = |source| NetworkError::Transport {
      url: request.url.to_string(),
      source,
    };

    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(transport)?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response.bytes().await.map_err(transport)?.to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}
