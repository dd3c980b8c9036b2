//! Network-first strategy for navigable documents.

use tracing::{debug, info};

use super::StrategyContext;
use crate::http::{Request, Response};

/// 1. Network; on success keep a copy in the dynamic cache.
/// 2. Offline: the cached copy of this document.
/// 3. Offline and never seen: the cached app shell.
pub(crate) async fn serve(ctx: &StrategyContext<'_>, request: &Request) -> Response {
  match ctx.fetcher.fetch(request).await {
    Ok(response) => {
      ctx.dynamic_cache.store(request, &response);
      response
    }
    Err(e) => {
      debug!(url = %request.url, error = %e, "Page fetch failed, trying cache");

      if let Some(cached) = ctx.dynamic_cache.lookup(request) {
        return cached;
      }
      if let Some(shell) = ctx.root_document() {
        info!(url = %request.url, "Serving app shell for uncached page");
        return shell;
      }
      Response::offline_page()
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::http::{Request, Response};
  use crate::strategy::test_support::*;

  #[tokio::test]
  async fn test_online_returns_live_and_caches() {
    let (dispatcher, fetcher, _) = active_dispatcher().await;
    fetcher.route("https://app.test/projects", Response::new(200, "v1 list"));
    let request = Request::navigate(url("https://app.test/projects"));

    assert_eq!(dispatcher.handle(&request).await.unwrap().text(), "v1 list");

    fetcher.route("https://app.test/projects", Response::new(200, "v2 list"));
    assert_eq!(dispatcher.handle(&request).await.unwrap().text(), "v2 list");

    fetcher.set_offline(true);
    assert_eq!(dispatcher.handle(&request).await.unwrap().text(), "v2 list");
  }

  #[tokio::test]
  async fn test_offline_uncached_page_gets_shell() {
    let (dispatcher, fetcher, _) = active_dispatcher().await;
    fetcher.set_offline(true);

    let response = dispatcher
      .handle(&Request::navigate(url("https://app.test/never-visited")))
      .await
      .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "<html>shell</html>");
  }

  #[tokio::test]
  async fn test_error_status_is_returned_but_not_cached() {
    let (dispatcher, fetcher, storage) = active_dispatcher().await;
    fetcher.route("https://app.test/broken", Response::new(500, "boom"));

    let request = Request::navigate(url("https://app.test/broken"));
    assert_eq!(dispatcher.handle(&request).await.unwrap().status, 500);

    use crate::cache::CacheStorage;
    assert!(storage.keys("app-dynamic-v1").unwrap().is_empty());
  }
}
