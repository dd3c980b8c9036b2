//! Replay of queued offline actions against the remote data service.

mod handler;
mod rest;

pub use handler::{EntityHandler, Handlers, RemoteError};
pub use rest::RestHandler;

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::queue::{EntityType, OfflineAction, Operation, PersistentQueue};

/// Counts for one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub attempted: usize,
  pub succeeded: usize,
  pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
  Completed(SyncReport),
  /// Another pass was already running; nothing was done
  AlreadyRunning,
  /// A forced sync was requested while offline
  Offline,
}

/// Result of handing a new mutation to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
  /// The remote accepted it right away
  Applied,
  /// Stored for a later sync pass
  Queued(OfflineAction),
}

/// Clears the in-flight flag when the pass ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| FlightGuard(flag))
  }
}

impl Drop for FlightGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

pub struct SyncReconciler {
  queue: Arc<PersistentQueue>,
  handlers: Handlers,
  connectivity: Arc<ConnectivityMonitor>,
  in_flight: AtomicBool,
}

impl SyncReconciler {
  pub fn new(
    queue: Arc<PersistentQueue>,
    handlers: Handlers,
    connectivity: Arc<ConnectivityMonitor>,
  ) -> Self {
    Self {
      queue,
      handlers,
      connectivity,
      in_flight: AtomicBool::new(false),
    }
  }

  pub fn queue(&self) -> &Arc<PersistentQueue> {
    &self.queue
  }

  /// Replay a snapshot of the queue in FIFO order.
  ///
  /// Records that succeed are removed once the whole snapshot has been
  /// processed; failures stay queued, in place, for a later pass. Records
  /// appended while the pass runs wait for the next one.
  pub async fn sync(&self) -> SyncOutcome {
    let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
      debug!("Sync already in progress");
      return SyncOutcome::AlreadyRunning;
    };

    let snapshot = self.queue.snapshot();
    let mut report = SyncReport::default();
    if snapshot.is_empty() {
      return SyncOutcome::Completed(report);
    }

    info!(pending = snapshot.len(), "Syncing offline queue");
    let mut synced = Vec::new();
    for action in &snapshot {
      report.attempted += 1;
      match self.handlers.apply(action).await {
        Ok(()) => {
          debug!(id = %action.id, entity = %action.entity_type, operation = %action.operation, "Replayed offline action");
          report.succeeded += 1;
          synced.push(action.id.clone());
        }
        Err(e) => {
          // No backoff or expiry: it is retried on every future pass
          warn!(id = %action.id, entity = %action.entity_type, operation = %action.operation, error = %e, "Offline action failed, keeping it queued");
          report.failed += 1;
        }
      }
    }

    self.queue.remove_many(&synced);
    info!(
      succeeded = report.succeeded,
      failed = report.failed,
      remaining = self.queue.len(),
      "Offline queue sync finished"
    );
    SyncOutcome::Completed(report)
  }

  /// Manual sync; a no-op while offline.
  pub async fn force_sync(&self) -> SyncOutcome {
    if !self.connectivity.is_online() {
      info!("Offline, skipping forced sync");
      return SyncOutcome::Offline;
    }
    self.sync().await
  }

  /// Apply a mutation now if possible, otherwise queue it.
  ///
  /// Only an unreachable remote defers the mutation. A remote that answers
  /// and refuses it is reported back as an error.
  pub async fn submit(
    &self,
    entity_type: EntityType,
    operation: Operation,
    payload: Value,
  ) -> Result<SubmitOutcome, RemoteError> {
    let action = OfflineAction::new(entity_type, operation, payload);

    if self.connectivity.is_online() {
      match self.handlers.apply(&action).await {
        Ok(()) => return Ok(SubmitOutcome::Applied),
        Err(e) if e.is_unreachable() => {
          warn!(entity = %entity_type, operation = %operation, error = %e, "Remote unreachable, queueing action");
        }
        Err(e) => return Err(e),
      }
    }

    self.queue.append(action.clone());
    Ok(SubmitOutcome::Queued(action))
  }
}
