//! Request classification and strategy dispatch.
//!
//! Every intercepted request is classified by [`classify`] into exactly one
//! [`Route`]; the [`Dispatcher`] then runs the matching strategy:
//!
//! | Route         | Strategy                                   |
//! |---------------|--------------------------------------------|
//! | `Api`         | network-first, cache only safe reads       |
//! | `Page`        | network-first, fall back to the app shell  |
//! | `Static`      | cache-first                                |
//! | `Passthrough` | straight to the network, never cached      |

mod api;
mod assets;
mod page;

use reqwest::Method;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::cache::Cache;
use crate::http::{Fetcher, NetworkError, Request, Response};
use crate::lifecycle::LifecycleManager;

/// Which requests belong to the remote data service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
  /// Host of the remote data service
  pub api_host: Option<String>,
  /// Path prefix of same-origin API calls, e.g. `/api/`
  pub api_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  Api,
  Page,
  Static,
  Passthrough,
}

/// Pick the strategy for `request`. First matching rule wins.
pub fn classify(request: &Request, routes: &Routes) -> Route {
  let targets_api_host = match (&routes.api_host, request.url.host_str()) {
    (Some(api_host), Some(host)) => host.eq_ignore_ascii_case(api_host),
    _ => false,
  };
  let targets_api_path =
    !routes.api_prefix.is_empty() && request.url.path().starts_with(&routes.api_prefix);

  if targets_api_host || targets_api_path {
    Route::Api
  } else if request.destination.is_navigable() {
    Route::Page
  } else if request.method == Method::GET {
    Route::Static
  } else {
    Route::Passthrough
  }
}

/// What a strategy needs to serve one request.
pub(crate) struct StrategyContext<'a> {
  pub fetcher: &'a dyn Fetcher,
  pub static_cache: Cache,
  pub dynamic_cache: Cache,
  pub root: Url,
}

impl StrategyContext<'_> {
  /// Dynamic generation first, then the precached static one.
  pub fn lookup(&self, request: &Request) -> Option<Response> {
    self
      .dynamic_cache
      .lookup(request)
      .or_else(|| self.static_cache.lookup(request))
  }

  /// The cached application shell, used as the last offline fallback for
  /// navigations.
  pub fn root_document(&self) -> Option<Response> {
    let root = Request::get(self.root.clone());
    self
      .static_cache
      .lookup(&root)
      .or_else(|| self.dynamic_cache.lookup(&root))
  }
}

/// Front door of the interception engine.
#[derive(Clone)]
pub struct Dispatcher {
  fetcher: Arc<dyn Fetcher>,
  lifecycle: Arc<LifecycleManager>,
  routes: Routes,
}

impl Dispatcher {
  pub fn new(fetcher: Arc<dyn Fetcher>, lifecycle: Arc<LifecycleManager>, routes: Routes) -> Self {
    Self {
      fetcher,
      lifecycle,
      routes,
    }
  }

  /// Serve `request`.
  ///
  /// Only passthrough (and requests arriving before activation) can fail;
  /// every strategy recovers from network failures itself.
  pub async fn handle(&self, request: &Request) -> Result<Response, NetworkError> {
    if !self.lifecycle.is_controlling() {
      debug!(url = %request.url, "Not controlling yet, passing through");
      return self.fetcher.fetch(request).await;
    }

    let route = classify(request, &self.routes);
    debug!(method = %request.method, url = %request.url, ?route, "Dispatching request");

    let ctx = StrategyContext {
      fetcher: self.fetcher.as_ref(),
      static_cache: self.lifecycle.static_cache(),
      dynamic_cache: self.lifecycle.dynamic_cache(),
      root: self.lifecycle.root_url(),
    };

    match route {
      Route::Api => Ok(api::serve(&ctx, request).await),
      Route::Page => Ok(page::serve(&ctx, request).await),
      Route::Static => Ok(assets::serve(&ctx, request).await),
      Route::Passthrough => self.fetcher.fetch(request).await,
    }
  }
}

#[cfg(test)]
pub(crate) mod test_support {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::lifecycle::Generations;
  use crate::testing::ScriptedFetcher;

  pub const ORIGIN: &str = "https://app.test/";

  pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  pub fn routes() -> Routes {
    Routes {
      api_host: Some("data.remote.test".to_string()),
      api_prefix: "/api/".to_string(),
    }
  }

  /// An active dispatcher whose static generation holds the app shell.
  pub async fn active_dispatcher() -> (Dispatcher, Arc<ScriptedFetcher>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.route(ORIGIN, Response::new(200, "<html>shell</html>"));

    let lifecycle = Arc::new(LifecycleManager::new(
      storage.clone(),
      fetcher.clone(),
      Generations::new("app", "v1"),
      url(ORIGIN),
      vec!["/".to_string()],
    ));
    lifecycle.start().await.unwrap();
    fetcher.reset_calls();

    let dispatcher = Dispatcher::new(fetcher.clone(), lifecycle, routes());
    (dispatcher, fetcher, storage)
  }
}
