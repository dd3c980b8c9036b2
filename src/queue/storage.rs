//! Durable backing stores for the offline action queue.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::record::OfflineAction;
use crate::db::Database;

/// Key of the queue slot in the key/value table.
const QUEUE_KEY: &str = "offline_actions";

/// Persistence contract of the queue: the whole ordered list is read and
/// written at once.
pub trait QueueStorage: Send + Sync {
  /// The stored list, or `None` if nothing was ever written.
  ///
  /// An unreadable or corrupt store is an error.
  fn read_all(&self) -> Result<Option<Vec<OfflineAction>>>;

  /// Replace the stored list.
  fn write_all(&self, records: &[OfflineAction]) -> Result<()>;
}

fn decode(raw: &str) -> Result<Vec<OfflineAction>> {
  serde_json::from_str(raw).map_err(|e| eyre!("Corrupt offline queue: {}", e))
}

fn encode(records: &[OfflineAction]) -> Result<String> {
  serde_json::to_string(records).map_err(|e| eyre!("Failed to serialize offline queue: {}", e))
}

/// Queue stored as a JSON array in the SQLite key/value table.
pub struct SqliteQueueStorage {
  conn: Mutex<Connection>,
}

impl SqliteQueueStorage {
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

impl QueueStorage for SqliteQueueStorage {
  fn read_all(&self) -> Result<Option<Vec<OfflineAction>>> {
    let conn = self.lock()?;
    let raw: Option<String> = conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![QUEUE_KEY],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read offline queue: {}", e))?;

    raw.as_deref().map(decode).transpose()
  }

  fn write_all(&self, records: &[OfflineAction]) -> Result<()> {
    let value = encode(records)?;
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![QUEUE_KEY, value],
      )
      .map_err(|e| eyre!("Failed to write offline queue: {}", e))?;
    Ok(())
  }
}

/// Queue kept in process memory, serialized the same way as on disk.
#[derive(Default)]
pub struct MemoryQueueStorage {
  raw: Mutex<Option<String>>,
}

impl MemoryQueueStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Start from raw stored contents, which may be corrupt.
  pub fn with_raw(raw: impl Into<String>) -> Self {
    Self {
      raw: Mutex::new(Some(raw.into())),
    }
  }

  fn lock(&self) -> Result<MutexGuard<'_, Option<String>>> {
    self.raw.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl QueueStorage for MemoryQueueStorage {
  fn read_all(&self) -> Result<Option<Vec<OfflineAction>>> {
    let raw = self.lock()?;
    raw.as_deref().map(decode).transpose()
  }

  fn write_all(&self, records: &[OfflineAction]) -> Result<()> {
    let value = encode(records)?;
    *self.lock()? = Some(value);
    Ok(())
  }
}
