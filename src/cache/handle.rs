//! Handle to one opened cache generation.

use std::sync::Arc;
use tracing::{debug, warn};

use super::traits::CacheStorage;
use crate::http::{Request, Response};

/// A named generation inside a [`CacheStorage`].
///
/// Strategies only see the cache through this handle. Storage failures are
/// logged and treated as misses or skipped writes, so a broken cache never
/// turns into a failed request.
#[derive(Clone)]
pub struct Cache {
  storage: Arc<dyn CacheStorage>,
  name: String,
}

impl Cache {
  pub fn new(storage: Arc<dyn CacheStorage>, name: impl Into<String>) -> Self {
    Self {
      storage,
      name: name.into(),
    }
  }

  /// Cached response for `request`, if any.
  pub fn lookup(&self, request: &Request) -> Option<Response> {
    let key = request.cache_key();
    match self.storage.get(&self.name, &key) {
      Ok(hit) => hit.map(|cached| cached.response),
      Err(e) => {
        warn!(generation = %self.name, key = %key, error = %e, "Cache read failed, treating as miss");
        None
      }
    }
  }

  /// Store a copy of `response` under `request`.
  ///
  /// Only successful responses to `GET` over `http(s)` are written. Returns
  /// whether the entry was stored.
  pub fn store(&self, request: &Request, response: &Response) -> bool {
    if !request.is_cacheable() || !response.is_success() {
      return false;
    }

    let key = request.cache_key();
    match self.storage.put(&self.name, &key, response) {
      Ok(()) => {
        debug!(generation = %self.name, key = %key, "Cached response");
        true
      }
      Err(e) => {
        warn!(generation = %self.name, key = %key, error = %e, "Cache write failed");
        false
      }
    }
  }
}
