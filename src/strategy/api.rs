//! Network-first strategy for the remote data service.

use tracing::{debug, warn};

use super::StrategyContext;
use crate::http::{Request, Response};

/// Reads may be served stale from cache when offline; writes never are. A
/// request that cannot be answered gets the synthetic 503 offline response
/// instead of a raw network error.
pub(crate) async fn serve(ctx: &StrategyContext<'_>, request: &Request) -> Response {
  match ctx.fetcher.fetch(request).await {
    Ok(response) => {
      ctx.dynamic_cache.store(request, &response);
      response
    }
    Err(e) => {
      if request.is_cacheable() {
        if let Some(cached) = ctx.lookup(request) {
          debug!(url = %request.url, "Serving cached API response while offline");
          return cached;
        }
      }
      warn!(method = %request.method, url = %request.url, error = %e, "API request failed offline");
      Response::offline_api()
    }
  }
}
