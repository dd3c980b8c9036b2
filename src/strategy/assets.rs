//! Cache-first strategy for static assets.

use tracing::debug;

use super::StrategyContext;
use crate::http::{Request, Response};

pub(crate) async fn serve(ctx: &StrategyContext<'_>, request: &Request) -> Response {
  if let Some(cached) = ctx.lookup(request) {
    return cached;
  }

  match ctx.fetcher.fetch(request).await {
    Ok(response) => {
      ctx.dynamic_cache.store(request, &response);
      response
    }
    Err(e) => {
      debug!(url = %request.url, error = %e, "Asset unavailable");
      if request.destination.is_navigable() {
        if let Some(shell) = ctx.root_document() {
          return shell;
        }
      }
      Response::unavailable()
    }
  }
}
