//! Wires the cache, lifecycle, dispatcher, queue and reconciler together.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{CacheStorage, MemoryStorage, SqliteStorage};
use crate::config::Config;
use crate::connectivity::{self, ConnectivityMonitor, ConnectivityProbe, HttpProbe};
use crate::http::{Fetcher, NetworkError, ReqwestFetcher, Request, Response};
use crate::lifecycle::{ActivationReport, LifecycleManager};
use crate::queue::{
  EntityType, MemoryQueueStorage, Operation, PersistentQueue, QueueStorage, SqliteQueueStorage,
};
use crate::strategy::Dispatcher;
use crate::sync::{Handlers, RemoteError, RestHandler, SubmitOutcome, SyncOutcome, SyncReconciler};

/// Bound on a single connectivity check. Fetches and replays are unbounded.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

fn http_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
  let mut builder =
    reqwest::Client::builder().user_agent(concat!("shelter/", env!("CARGO_PKG_VERSION")));
  if let Some(timeout) = timeout {
    builder = builder.timeout(timeout);
  }
  builder
    .build()
    .map_err(|e| eyre!("Failed to build HTTP client: {}", e))
}

/// Durable state behind a [`Shelter`].
pub struct Backends {
  pub cache: Arc<dyn CacheStorage>,
  pub queue: Arc<dyn QueueStorage>,
}

impl Backends {
  /// Both stores in the configured SQLite database.
  pub fn sqlite(config: &Config) -> Result<Self> {
    let path = config.database_path()?;
    Ok(Self {
      cache: Arc::new(SqliteStorage::open(&path)?),
      queue: Arc::new(SqliteQueueStorage::open(&path)?),
    })
  }

  /// Process-local stores, gone on exit.
  pub fn memory() -> Self {
    Self {
      cache: Arc::new(MemoryStorage::new()),
      queue: Arc::new(MemoryQueueStorage::new()),
    }
  }
}

/// The assembled offline-resilience core.
pub struct Shelter {
  cache: Arc<dyn CacheStorage>,
  lifecycle: Arc<LifecycleManager>,
  dispatcher: Dispatcher,
  reconciler: Arc<SyncReconciler>,
  monitor: Arc<ConnectivityMonitor>,
  probe: Arc<dyn ConnectivityProbe>,
  probe_interval: Duration,
}

impl Shelter {
  /// Build from configuration with the real network stack.
  pub async fn open(config: &Config, ephemeral: bool) -> Result<Self> {
    let backends = if ephemeral {
      Backends::memory()
    } else {
      Backends::sqlite(config)?
    };

    let client = http_client(None)?;
    let fetcher = Arc::new(ReqwestFetcher::with_client(client.clone()));
    let handlers = RestHandler::handlers(client, &config.remote_base()?);
    let probe = Arc::new(HttpProbe::new(
      http_client(Some(PROBE_TIMEOUT))?,
      config.probe_url(),
    ));

    Self::assemble(config, backends, fetcher, handlers, probe).await
  }

  /// Build from explicit collaborators.
  pub async fn assemble(
    config: &Config,
    backends: Backends,
    fetcher: Arc<dyn Fetcher>,
    handlers: Handlers,
    probe: Arc<dyn ConnectivityProbe>,
  ) -> Result<Self> {
    let lifecycle = Arc::new(LifecycleManager::new(
      Arc::clone(&backends.cache),
      Arc::clone(&fetcher),
      config.generations(),
      config.app.origin.clone(),
      config.precache.clone(),
    ));
    let dispatcher = Dispatcher::new(fetcher, Arc::clone(&lifecycle), config.routes());

    let queue = Arc::new(PersistentQueue::load_all(backends.queue));
    let monitor = Arc::new(ConnectivityMonitor::from_probe(probe.as_ref()).await);
    let reconciler = Arc::new(SyncReconciler::new(queue, handlers, Arc::clone(&monitor)));

    Ok(Self {
      cache: backends.cache,
      lifecycle,
      dispatcher,
      reconciler,
      monitor,
      probe,
      probe_interval: config.probe_interval(),
    })
  }

  pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
    &self.lifecycle
  }

  pub fn queue(&self) -> &Arc<PersistentQueue> {
    self.reconciler.queue()
  }

  /// Install (or restore) the current generation and take control.
  pub async fn start(&self) -> Result<ActivationReport> {
    self.lifecycle.start().await
  }

  /// Generation names in the cache store, oldest first.
  pub fn cache_generations(&self) -> Result<Vec<String>> {
    self.cache.list_generations()
  }

  /// Number of entries stored under `generation`.
  pub fn cache_entries(&self, generation: &str) -> Result<usize> {
    Ok(self.cache.keys(generation)?.len())
  }

  pub async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    self.dispatcher.handle(request).await
  }

  pub async fn submit(
    &self,
    entity_type: EntityType,
    operation: Operation,
    payload: Value,
  ) -> Result<SubmitOutcome, RemoteError> {
    self.reconciler.submit(entity_type, operation, payload).await
  }

  pub async fn force_sync(&self) -> SyncOutcome {
    self.reconciler.force_sync().await
  }

  /// Trigger a sync pass on every reconnect.
  pub fn spawn_reconnect_sync(&self) -> JoinHandle<()> {
    connectivity::spawn_sync_on_reconnect(&self.monitor, Arc::clone(&self.reconciler))
  }

  /// Probe connectivity and sync on reconnect until `shutdown` resolves.
  pub async fn run_until<F>(&self, shutdown: F)
  where
    F: std::future::Future<Output = ()>,
  {
    let reconnect = self.spawn_reconnect_sync();
    if self.monitor.is_online() && !self.queue().is_empty() {
      let outcome = self.reconciler.sync().await;
      info!(?outcome, "Startup sync finished");
    }

    let probe_loop = connectivity::watch(
      Arc::clone(&self.probe),
      Arc::clone(&self.monitor),
      self.probe_interval,
    );
    tokio::select! {
      _ = probe_loop => warn!("Connectivity watch stopped"),
      _ = shutdown => info!("Shutting down"),
    }
    reconnect.abort();
  }
}
