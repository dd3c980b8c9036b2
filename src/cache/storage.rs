//! SQLite implementation of the cache store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::key::RequestKey;
use super::traits::{CacheStorage, CachedResponse};
use crate::db::Database;
use crate::http::Response;

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache tables in the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    let db = Database::open(path)?;
    Ok(Self::from_database(db))
  }

  pub fn from_database(db: Database) -> Self {
    Self {
      conn: Mutex::new(db.into_connection()),
    }
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

const INSERT_GENERATION: &str = "INSERT OR IGNORE INTO cache_generations (name, seq, created_at)
     VALUES (?1, (SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_generations), datetime('now'))";

const UPSERT_ENTRY: &str = "INSERT OR REPLACE INTO cache_entries
     (generation, key_hash, request_key, status, headers, body, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, datetime('now'))";

fn write_entry(
  conn: &Connection,
  generation: &str,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      UPSERT_ENTRY,
      params![
        generation,
        key.cache_hash(),
        key.to_string(),
        response.status,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to store cache entry {}: {}", key, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open(&self, generation: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(INSERT_GENERATION, params![generation])
      .map_err(|e| eyre!("Failed to open cache generation {}: {}", generation, e))?;
    Ok(())
  }

  fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, cached_at FROM cache_entries
         WHERE generation = ? AND key_hash = ?",
        params![generation, key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry {}: {}", key, e))?;

    match row {
      Some((status, headers, body, cached_at)) => {
        let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", key, e))?;
        Ok(Some(CachedResponse {
          response: Response {
            status,
            headers,
            body,
          },
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(INSERT_GENERATION, params![generation])
      .map_err(|e| eyre!("Failed to open cache generation {}: {}", generation, e))?;
    write_entry(&tx, generation, key, response)?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(INSERT_GENERATION, params![generation])
      .map_err(|e| eyre!("Failed to open cache generation {}: {}", generation, e))?;
    for (key, response) in entries {
      write_entry(&tx, generation, key, response)?;
    }

    // Dropping the transaction without commit rolls everything back
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn delete(&self, generation: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE generation = ?",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", generation, e))?;
    let removed = tx
      .execute(
        "DELETE FROM cache_generations WHERE name = ?",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to delete cache generation {}: {}", generation, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(removed > 0)
  }

  fn list_generations(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations ORDER BY seq")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to list cache generations: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cache generation name: {}", e))?;

    Ok(names)
  }

  fn keys(&self, generation: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT request_key FROM cache_entries WHERE generation = ? ORDER BY request_key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![generation], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to list keys of {}: {}", generation, e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cache key: {}", e))?;

    Ok(keys)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use tempfile::TempDir;
  use url::Url;

  fn key(url: &str) -> RequestKey {
    RequestKey::new(&Method::GET, &Url::parse(url).unwrap())
  }

  #[test]
  fn test_entries_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cache.db");

    {
      let storage = SqliteStorage::open(&path).unwrap();
      let response = Response::new(200, "body{}").with_header("content-type", "text/css");
      storage
        .put("app-dynamic-v1", &key("https://app.test/app.css"), &response)
        .unwrap();
    }

    let storage = SqliteStorage::open(&path).unwrap();
    let cached = storage
      .get("app-dynamic-v1", &key("https://app.test/app.css"))
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.text(), "body{}");
    assert_eq!(
      cached.response.headers.get("content-type").map(String::as_str),
      Some("text/css")
    );
    assert_eq!(storage.list_generations().unwrap(), vec!["app-dynamic-v1"]);
  }

  #[test]
  fn test_generations_listed_oldest_first_and_deleted() {
    let storage = SqliteStorage::from_database(Database::open_in_memory().unwrap());
    storage.open("app-static-v1").unwrap();
    storage.open("app-dynamic-v1").unwrap();
    storage.open("app-static-v2").unwrap();
    // Reopening keeps the original position
    storage.open("app-static-v1").unwrap();

    assert_eq!(
      storage.list_generations().unwrap(),
      vec!["app-static-v1", "app-dynamic-v1", "app-static-v2"]
    );

    storage
      .put("app-static-v1", &key("https://app.test/"), &Response::new(200, "shell"))
      .unwrap();
    assert!(storage.delete("app-static-v1").unwrap());
    assert!(!storage.delete("app-static-v1").unwrap());
    assert!(storage
      .get("app-static-v1", &key("https://app.test/"))
      .unwrap()
      .is_none());
  }

  #[test]
  fn test_put_overwrites_whole_entry() {
    let storage = SqliteStorage::from_database(Database::open_in_memory().unwrap());
    let k = key("https://app.test/data.json");
    storage
      .put("dyn", &k, &Response::new(200, "old").with_header("etag", "1"))
      .unwrap();
    storage.put("dyn", &k, &Response::new(200, "new")).unwrap();

    let cached = storage.get("dyn", &k).unwrap().unwrap();
    assert_eq!(cached.response, Response::new(200, "new"));
    assert_eq!(storage.keys("dyn").unwrap(), vec![k.to_string()]);
  }

  #[test]
  fn test_parse_datetime() {
    let dt = parse_datetime("2024-03-01 12:30:00").unwrap();
    assert_eq!(dt.to_rfc3339(), "2024-03-01T12:30:00+00:00");
    assert!(parse_datetime("yesterday").is_err());
  }
}
