//! Durable FIFO queue of offline actions.
//!
//! The in-memory list is the working copy; after every append or removal the
//! whole list is written through to the [`QueueStorage`]. A failed write is
//! logged and memory stays authoritative until the next successful write.

mod record;
mod storage;

pub use record::{EntityType, OfflineAction, Operation};
pub use storage::{MemoryQueueStorage, QueueStorage, SqliteQueueStorage};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

pub struct PersistentQueue {
  records: Mutex<Vec<OfflineAction>>,
  storage: Arc<dyn QueueStorage>,
}

impl PersistentQueue {
  /// Rebuild the queue from durable storage.
  pub fn load_all(storage: Arc<dyn QueueStorage>) -> Self {
    // A corrupt or unreadable store yields an empty queue
    let records = match storage.read_all() {
      Ok(Some(records)) => {
        info!(pending = records.len(), "Loaded offline queue");
        records
      }
      Ok(None) => Vec::new(),
      Err(e) => {
        error!(error = %e, "Offline queue unreadable, starting empty");
        Vec::new()
      }
    };

    Self {
      records: Mutex::new(records),
      storage,
    }
  }

  fn lock(&self) -> MutexGuard<'_, Vec<OfflineAction>> {
    self.records.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn persist(&self, records: &[OfflineAction]) {
    if let Err(e) = self.storage.write_all(records) {
      warn!(error = %e, pending = records.len(), "Failed to persist offline queue; keeping it in memory");
    }
  }

  pub fn append(&self, record: OfflineAction) {
    let mut records = self.lock();
    debug!(id = %record.id, entity = %record.entity_type, operation = %record.operation, "Queued offline action");
    records.push(record);
    self.persist(&records);
  }

  /// Remove every record whose id is in `ids`. Returns how many were removed.
  pub fn remove_many(&self, ids: &[String]) -> usize {
    if ids.is_empty() {
      return 0;
    }

    let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut records = self.lock();
    let before = records.len();
    records.retain(|record| !ids.contains(record.id.as_str()));
    let removed = before - records.len();
    self.persist(&records);
    removed
  }

  /// Copy of the queue in FIFO order.
  pub fn snapshot(&self) -> Vec<OfflineAction> {
    self.lock().clone()
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }
}
