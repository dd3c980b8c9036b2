//! Core traits and types for the cache store.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use super::key::RequestKey;
use crate::http::Response;

/// A response read back from a cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  /// The stored response
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Named, versioned key/value storage of request → response.
///
/// A generation is created on `open` or on the first `put` into it. Entries
/// are whole-entry replacements; writing an existing key overwrites it.
pub trait CacheStorage: Send + Sync {
  /// Create the generation if it does not exist yet.
  fn open(&self, generation: &str) -> Result<()>;

  /// Look up a single entry.
  fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Write (or overwrite) a single entry.
  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Write all entries, or none of them.
  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Drop a generation and everything in it. Returns whether it existed.
  fn delete(&self, generation: &str) -> Result<bool>;

  /// All generation names, oldest first.
  fn list_generations(&self) -> Result<Vec<String>>;

  /// Keys stored in a generation, as `METHOD URL` strings.
  fn keys(&self, generation: &str) -> Result<Vec<String>>;
}
