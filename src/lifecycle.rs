//! Cache-generation lifecycle: install, activate, evict.
//!
//! A version tag names two generations, a static one filled from the precache
//! list at install time and a dynamic one that grows with observed traffic.
//! Activation deletes every other generation and claims control, after which
//! the dispatcher starts intercepting requests.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{Cache, CacheStorage, RequestKey};
use crate::http::{Fetcher, Request, Response};

/// The current pair of generation names, derived from one version tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generations {
  prefix: String,
  version: String,
}

impl Generations {
  pub fn new(prefix: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      prefix: prefix.into(),
      version: version.into(),
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn static_name(&self) -> String {
    format!("{}-static-{}", self.prefix, self.version)
  }

  pub fn dynamic_name(&self) -> String {
    format!("{}-dynamic-{}", self.prefix, self.version)
  }

  /// Whether `name` is one of the two current generations.
  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_name() || name == self.dynamic_name()
  }

  /// Version tag of a static generation name under the same prefix.
  fn static_version_of<'a>(&self, name: &'a str) -> Option<&'a str> {
    name
      .strip_prefix(self.prefix.as_str())
      .and_then(|rest| rest.strip_prefix("-static-"))
      .filter(|version| !version.is_empty())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Uninstalled,
  Installing,
  /// Static generation written; waiting only for activation
  Installed,
  /// Controls requests
  Active,
  /// Replaced by a newer controller
  Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
  InstallStarted,
  InstallSucceeded,
  InstallFailed,
  /// An already-installed static generation was found in the store
  Restored,
  Activated,
  Replaced,
}

impl LifecycleState {
  /// Next state, or `None` if `event` is not valid in this state.
  pub fn transition(self, event: LifecycleEvent) -> Option<Self> {
    use LifecycleEvent as E;
    use LifecycleState as S;

    match (self, event) {
      (S::Uninstalled, E::InstallStarted) => Some(S::Installing),
      (S::Uninstalled, E::Restored) => Some(S::Installed),
      (S::Installing, E::InstallSucceeded) => Some(S::Installed),
      (S::Installing, E::InstallFailed) => Some(S::Uninstalled),
      (S::Installed | S::Active, E::Activated) => Some(S::Active),
      (S::Installed | S::Active, E::Replaced) => Some(S::Superseded),
      _ => None,
    }
  }

  pub fn controls_requests(self) -> bool {
    self == LifecycleState::Active
  }
}

/// Outcome of an activation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
  /// Stale generations removed
  pub deleted: Vec<String>,
  /// Stale generations whose deletion failed (left in place)
  pub failed: Vec<String>,
}

pub struct LifecycleManager {
  storage: Arc<dyn CacheStorage>,
  fetcher: Arc<dyn Fetcher>,
  origin: Url,
  precache: Vec<String>,
  generations: Mutex<Generations>,
  state: Mutex<LifecycleState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LifecycleManager {
  pub fn new(
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    generations: Generations,
    origin: Url,
    precache: Vec<String>,
  ) -> Self {
    Self {
      storage,
      fetcher,
      origin,
      precache,
      generations: Mutex::new(generations),
      state: Mutex::new(LifecycleState::Uninstalled),
    }
  }

  pub fn state(&self) -> LifecycleState {
    *lock(&self.state)
  }

  pub fn is_controlling(&self) -> bool {
    self.state().controls_requests()
  }

  pub fn generations(&self) -> Generations {
    lock(&self.generations).clone()
  }

  pub fn static_cache(&self) -> Cache {
    Cache::new(Arc::clone(&self.storage), self.generations().static_name())
  }

  pub fn dynamic_cache(&self) -> Cache {
    Cache::new(Arc::clone(&self.storage), self.generations().dynamic_name())
  }

  /// The application shell document.
  pub fn root_url(&self) -> Url {
    let mut root = self.origin.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root
  }

  fn advance(&self, event: LifecycleEvent) -> Result<LifecycleState> {
    let mut state = lock(&self.state);
    let next = state
      .transition(event)
      .ok_or_else(|| eyre!("Invalid lifecycle transition: {:?} on {:?}", *state, event))?;
    debug!(from = ?*state, to = ?next, ?event, "Lifecycle transition");
    *state = next;
    Ok(next)
  }

  /// Fetch the precache list and write it into the static generation.
  ///
  /// All assets are fetched before anything is written; a single failure
  /// aborts the install and leaves no static generation behind.
  pub async fn install(&self) -> Result<()> {
    self.advance(LifecycleEvent::InstallStarted)?;
    let static_name = self.generations().static_name();
    info!(generation = %static_name, assets = self.precache.len(), "Installing cache generation");

    let written = match self.fetch_precache().await {
      Ok(entries) => self.storage.put_all(&static_name, &entries),
      Err(e) => Err(e),
    };

    match written {
      Ok(()) => {
        self.advance(LifecycleEvent::InstallSucceeded)?;
        // Skip waiting: ready to activate right away
        info!(generation = %static_name, "Install complete");
        Ok(())
      }
      Err(e) => {
        error!(generation = %static_name, error = %e, "Install failed");
        if let Err(cleanup) = self.storage.delete(&static_name) {
          warn!(generation = %static_name, error = %cleanup, "Failed to discard partial static generation");
        }
        self.advance(LifecycleEvent::InstallFailed)?;
        Err(e)
      }
    }
  }

  async fn fetch_precache(&self) -> Result<Vec<(RequestKey, Response)>> {
    let requests = self
      .precache
      .iter()
      .map(|asset| {
        self
          .origin
          .join(asset)
          .map(Request::get)
          .map_err(|e| eyre!("Invalid precache asset '{}': {}", asset, e))
      })
      .collect::<Result<Vec<_>>>()?;

    let fetches = requests.iter().map(|request| async move {
      let response = self
        .fetcher
        .fetch(request)
        .await
        .map_err(|e| eyre!("Failed to precache {}: {}", request.url, e))?;
      if !response.is_success() {
        return Err(eyre!(
          "Failed to precache {}: status {}",
          request.url,
          response.status
        ));
      }
      Ok((request.cache_key(), response))
    });

    try_join_all(fetches).await
  }

  /// Delete every generation that is not current, then claim control.
  pub fn activate(&self) -> Result<ActivationReport> {
    let state = self.state();
    if state.transition(LifecycleEvent::Activated).is_none() {
      return Err(eyre!("Cannot activate from {:?}", state));
    }

    let generations = self.generations();
    // The dynamic generation exists from activation on, even before traffic
    self.storage.open(&generations.dynamic_name())?;

    let mut report = ActivationReport::default();
    for name in self.storage.list_generations()? {
      if generations.is_current(&name) {
        continue;
      }
      match self.storage.delete(&name) {
        Ok(_) => {
          info!(generation = %name, "Deleted stale cache generation");
          report.deleted.push(name);
        }
        Err(e) => {
          warn!(generation = %name, error = %e, "Failed to delete stale cache generation");
          report.failed.push(name);
        }
      }
    }

    self.advance(LifecycleEvent::Activated)?;
    info!(version = %generations.version(), "Activated; intercepting requests");
    Ok(report)
  }

  /// Install (unless this version is already installed), then activate.
  ///
  /// When a fresh install fails, the most recent previously installed version
  /// stays authoritative and is activated instead.
  pub async fn start(&self) -> Result<ActivationReport> {
    let existing = self.storage.list_generations()?;
    let static_name = self.generations().static_name();

    if existing.contains(&static_name) {
      debug!(generation = %static_name, "Static generation already installed");
      self.advance(LifecycleEvent::Restored)?;
    } else if let Err(e) = self.install().await {
      let previous = {
        let generations = self.generations();
        existing
          .iter()
          .rev()
          .find_map(|name| generations.static_version_of(name))
          .map(|version| Generations::new(generations.prefix.clone(), version))
      };
      match previous {
        Some(previous) => {
          warn!(version = %previous.version(), "Keeping previously installed version after failed install");
          *lock(&self.generations) = previous;
          self.advance(LifecycleEvent::Restored)?;
        }
        None => return Err(e),
      }
    }

    self.activate()
  }

  /// Stop controlling requests because a newer version took over.
  pub fn supersede(&self) -> Result<()> {
    self.advance(LifecycleEvent::Replaced)?;
    info!(version = %self.generations().version(), "Superseded");
    Ok(())
  }
}
