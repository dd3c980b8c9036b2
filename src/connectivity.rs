//! Online/offline tracking.
//!
//! [`ConnectivityMonitor`] holds the current state and broadcasts changes over
//! a `watch` channel. [`spawn_sync_on_reconnect`] turns each offline → online
//! transition into exactly one sync pass, and [`watch`] feeds the monitor from
//! a periodic probe.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::sync::SyncReconciler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  WentOnline,
  WentOffline,
  Unchanged,
}

impl Connectivity {
  pub fn transition_to(self, next: Connectivity) -> Transition {
    match (self, next) {
      (Connectivity::Offline, Connectivity::Online) => Transition::WentOnline,
      (Connectivity::Online, Connectivity::Offline) => Transition::WentOffline,
      _ => Transition::Unchanged,
    }
  }
}

/// Platform connectivity signal.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
  async fn check(&self) -> Connectivity;
}

/// Online when the probe URL answers with any HTTP response.
pub struct HttpProbe {
  client: reqwest::Client,
  url: Url,
}

impl HttpProbe {
  pub fn new(client: reqwest::Client, url: Url) -> Self {
    Self { client, url }
  }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
  async fn check(&self) -> Connectivity {
    match self.client.head(self.url.clone()).send().await {
      Ok(_) => Connectivity::Online,
      Err(e) => {
        debug!(url = %self.url, error = %e, "Connectivity probe failed");
        Connectivity::Offline
      }
    }
  }
}

pub struct ConnectivityMonitor {
  tx: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
  pub fn new(initial: Connectivity) -> Self {
    let (tx, _rx) = watch::channel(initial);
    Self { tx }
  }

  /// Initialize from the platform signal.
  pub async fn from_probe(probe: &dyn ConnectivityProbe) -> Self {
    let initial = probe.check().await;
    info!(status = ?initial, "Initial connectivity");
    Self::new(initial)
  }

  pub fn status(&self) -> Connectivity {
    *self.tx.borrow()
  }

  pub fn is_online(&self) -> bool {
    self.status() == Connectivity::Online
  }

  /// Record the latest signal. Subscribers are only notified on a change.
  pub fn set(&self, next: Connectivity) -> Transition {
    let mut transition = Transition::Unchanged;
    self.tx.send_if_modified(|current| {
      transition = current.transition_to(next);
      *current = next;
      transition != Transition::Unchanged
    });

    match transition {
      Transition::WentOnline => info!("Back online"),
      Transition::WentOffline => info!("Gone offline"),
      Transition::Unchanged => {}
    }
    transition
  }

  pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
    self.tx.subscribe()
  }
}

/// Run one sync pass each time the monitor goes from offline to online.
pub fn spawn_sync_on_reconnect(
  monitor: &ConnectivityMonitor,
  reconciler: Arc<SyncReconciler>,
) -> JoinHandle<()> {
  let mut rx = monitor.subscribe();
  // Read before spawning so a change racing the task start is not missed
  let mut last = *rx.borrow_and_update();

  tokio::spawn(async move {
    while rx.changed().await.is_ok() {
      // Changes made while a pass runs are coalesced. An offline blip that
      // ends online again starts no new pass; the running one covers it.
      let current = *rx.borrow_and_update();
      if last.transition_to(current) == Transition::WentOnline {
        let outcome = reconciler.sync().await;
        debug!(?outcome, "Reconnect sync finished");
      }
      last = current;
    }
  })
}

/// Poll `probe` every `interval` and feed the result into `monitor`.
pub async fn watch(probe: Arc<dyn ConnectivityProbe>, monitor: Arc<ConnectivityMonitor>, interval: Duration) {
  let mut ticker = tokio::time::interval(interval);
  loop {
    ticker.tick().await;
    let status = probe.check().await;
    monitor.set(status);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::method;
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[test]
  fn test_transitions() {
    use Connectivity::*;
    assert_eq!(Offline.transition_to(Online), Transition::WentOnline);
    assert_eq!(Online.transition_to(Offline), Transition::WentOffline);
    assert_eq!(Online.transition_to(Online), Transition::Unchanged);
  }

  #[test]
  fn test_set_reports_transition_once() {
    let monitor = ConnectivityMonitor::new(Connectivity::Offline);
    assert!(!monitor.is_online());
    assert_eq!(monitor.set(Connectivity::Online), Transition::WentOnline);
    assert_eq!(monitor.set(Connectivity::Online), Transition::Unchanged);
    assert!(monitor.is_online());
    assert_eq!(monitor.set(Connectivity::Offline), Transition::WentOffline);
  }

  #[tokio::test]
  async fn test_subscribers_only_see_changes() {
    let monitor = ConnectivityMonitor::new(Connectivity::Online);
    let mut rx = monitor.subscribe();

    monitor.set(Connectivity::Online);
    assert!(!rx.has_changed().unwrap());

    monitor.set(Connectivity::Offline);
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), Connectivity::Offline);
  }

  #[tokio::test]
  async fn test_http_probe() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
      .respond_with(ResponseTemplate::new(204))
      .mount(&server)
      .await;

    let probe = HttpProbe::new(reqwest::Client::new(), Url::parse(&server.uri()).unwrap());
    assert_eq!(probe.check().await, Connectivity::Online);

    let monitor = ConnectivityMonitor::from_probe(&probe).await;
    assert!(monitor.is_online());

    let dead = HttpProbe::new(reqwest::Client::new(), Url::parse("http://127.0.0.1:9/").unwrap());
    assert_eq!(dead.check().await, Connectivity::Offline);
  }
}
