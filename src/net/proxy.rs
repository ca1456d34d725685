//! Per-request-class caching strategies.
//!
//! Sits between the application and the network. Reads degrade tier by tier
//! from the exact-match cache down to the hard failure, while writes never
//! come through here at all (they go to the outbox).

use std::future::Future;
use url::Url;

use tracing::{debug, warn};

use crate::error::Result;

use super::request::{classify, FetchRequest, FetchResponse, RequestClass};
use super::response_cache::ResponseCache;

/// Where a served response came from. `Cache` and `Shell` are degraded
/// tiers; `Degraded` is the typed empty result for an asset that could not
/// be produced at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
  Network,
  Cache,
  Shell,
  Degraded,
}

/// A response plus its provenance.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: FetchResponse,
  pub from: ServedFrom,
}

pub struct FetchProxy {
  cache: ResponseCache,
  app_origin: Url,
  shell_request: FetchRequest,
}

impl FetchProxy {
  /// `shell_path` names the document served when a navigation has no more
  /// specific cached response (the application shell).
  pub fn new(cache: ResponseCache, app_origin: Url, shell_path: &str) -> Result<Self> {
    let shell_url = app_origin.join(shell_path).map_err(|e| {
      crate::error::EngineError::Config(format!("invalid shell path {}: {}", shell_path, e))
    })?;

    Ok(Self {
      cache,
      app_origin,
      shell_request: FetchRequest::get(shell_url),
    })
  }

  pub fn classify(&self, req: &FetchRequest) -> RequestClass {
    classify(req, &self.app_origin)
  }

  /// Apply the strategy for `req`, calling `fetch` for network access.
  ///
  /// Any fetch rejection (timeout included) counts as a network failure
  /// and falls back per the request's class.
  pub async fn handle<F, Fut>(&self, req: FetchRequest, fetch: F) -> Result<Served>
  where
    F: FnOnce(FetchRequest) -> Fut + Send + 'static,
    Fut: Future<Output = Result<FetchResponse>> + Send + 'static,
  {
    match self.classify(&req) {
      RequestClass::Bypass => {
        let response = fetch(req).await?;
        Ok(Served {
          response,
          from: ServedFrom::Network,
        })
      }
      RequestClass::Api => self.network_first(req, fetch, false).await,
      RequestClass::Navigation => self.network_first(req, fetch, true).await,
      RequestClass::Asset => self.cache_first(req, fetch).await,
    }
  }

  /// Network-first: a completed response is returned as-is (and stored when
  /// successful); a failed attempt falls back to the exact stored response,
  /// then, for navigations, to the app shell.
  async fn network_first<F, Fut>(
    &self,
    req: FetchRequest,
    fetch: F,
    shell_fallback: bool,
  ) -> Result<Served>
  where
    F: FnOnce(FetchRequest) -> Fut,
    Fut: Future<Output = Result<FetchResponse>>,
  {
    match fetch(req.clone()).await {
      Ok(response) => {
        self.store(&req, &response);
        Ok(Served {
          response,
          from: ServedFrom::Network,
        })
      }
      Err(e) => {
        if let Some(cached) = self.lookup(&req) {
          debug!(url = %req.url, "network failed, serving cached response");
          return Ok(Served {
            response: cached,
            from: ServedFrom::Cache,
          });
        }

        if shell_fallback {
          if let Some(shell) = self.lookup(&self.shell_request) {
            debug!(url = %req.url, "network failed, serving app shell");
            return Ok(Served {
              response: shell,
              from: ServedFrom::Shell,
            });
          }
        }

        Err(e)
      }
    }
  }

  /// Cache-first: a hit is returned without waiting on the network while a
  /// background fetch refreshes the entry for the next request. A miss
  /// fetches directly; a miss that also fails on the network yields a typed
  /// empty result rather than an error.
  async fn cache_first<F, Fut>(&self, req: FetchRequest, fetch: F) -> Result<Served>
  where
    F: FnOnce(FetchRequest) -> Fut + Send + 'static,
    Fut: Future<Output = Result<FetchResponse>> + Send + 'static,
  {
    if let Some(cached) = self.lookup(&req) {
      let cache = self.cache.clone();
      tokio::spawn(async move {
        match fetch(req.clone()).await {
          Ok(response) => {
            if let Err(e) = cache.put(&req, &response) {
              warn!(url = %req.url, error = %e, "revalidation store failed");
            }
          }
          Err(e) => debug!(url = %req.url, error = %e, "background revalidation failed"),
        }
      });

      return Ok(Served {
        response: cached,
        from: ServedFrom::Cache,
      });
    }

    match fetch(req.clone()).await {
      Ok(response) => {
        self.store(&req, &response);
        Ok(Served {
          response,
          from: ServedFrom::Network,
        })
      }
      Err(e) => {
        debug!(url = %req.url, error = %e, "asset unavailable offline");
        Ok(Served {
          response: FetchResponse::empty(503),
          from: ServedFrom::Degraded,
        })
      }
    }
  }

  /// Cache reads degrade to a miss when the store is unavailable; the
  /// request must still be answerable from the network.
  fn lookup(&self, req: &FetchRequest) -> Option<FetchResponse> {
    match self.cache.get(req) {
      Ok(cached) => cached,
      Err(e) => {
        warn!(url = %req.url, error = %e, "response cache read failed");
        None
      }
    }
  }

  /// Cache writes never fail the request being served.
  fn store(&self, req: &FetchRequest, response: &FetchResponse) {
    if let Err(e) = self.cache.put(req, response) {
      warn!(url = %req.url, error = %e, "response cache write failed");
    }
  }
}
