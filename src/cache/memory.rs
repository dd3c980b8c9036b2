//! In-process cache store for ephemeral runs and tests.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::key::RequestKey;
use super::traits::{CacheStorage, CachedResponse};
use crate::http::Response;

struct Generation {
  name: String,
  /// Keyed by `METHOD URL` so `keys` comes back sorted
  entries: BTreeMap<String, CachedResponse>,
}

/// Cache storage that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStorage {
  // Vec keeps creation order for `list_generations`
  generations: Mutex<Vec<Generation>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Vec<Generation>>> {
    self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn find_or_create<'a>(generations: &'a mut Vec<Generation>, name: &str) -> &'a mut Generation {
  let index = match generations.iter().position(|g| g.name == name) {
    Some(index) => index,
    None => {
      generations.push(Generation {
        name: name.to_string(),
        entries: BTreeMap::new(),
      });
      generations.len() - 1
    }
  };
  &mut generations[index]
}

impl CacheStorage for MemoryStorage {
  fn open(&self, generation: &str) -> Result<()> {
    let mut generations = self.lock()?;
    find_or_create(&mut generations, generation);
    Ok(())
  }

  fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let generations = self.lock()?;
    Ok(
      generations
        .iter()
        .find(|g| g.name == generation)
        .and_then(|g| g.entries.get(&key.to_string()))
        .cloned(),
    )
  }

  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let mut generations = self.lock()?;
    find_or_create(&mut generations, generation).entries.insert(
      key.to_string(),
      CachedResponse {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut generations = self.lock()?;
    let target = find_or_create(&mut generations, generation);
    let cached_at = Utc::now();
    for (key, response) in entries {
      target.entries.insert(
        key.to_string(),
        CachedResponse {
          response: response.clone(),
          cached_at,
        },
      );
    }
    Ok(())
  }

  fn delete(&self, generation: &str) -> Result<bool> {
    let mut generations = self.lock()?;
    let before = generations.len();
    generations.retain(|g| g.name != generation);
    Ok(generations.len() != before)
  }

  fn list_generations(&self) -> Result<Vec<String>> {
    let generations = self.lock()?;
    Ok(generations.iter().map(|g| g.name.clone()).collect())
  }

  fn keys(&self, generation: &str) -> Result<Vec<String>> {
    let generations = self.lock()?;
    Ok(
      generations
        .iter()
        .find(|g| g.name == generation)
        .map(|g| g.entries.keys().cloned().collect())
        .unwrap_or_default(),
    )
  }
}
