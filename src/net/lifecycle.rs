//! Install/activate lifecycle for the interception layer.

use std::future::Future;
use url::Url;

use tracing::{info, warn};

use crate::error::Result;

use super::request::{FetchRequest, FetchResponse};
use super::response_cache::ResponseCache;

/// Controls the two lifecycle edges: seeding the minimal offline shell on
/// install, and evicting previous-version cache entries on activation. An
/// explicit version-bump message from the application maps to an immediate
/// `activate` call.
pub struct Lifecycle {
  cache: ResponseCache,
  app_origin: Url,
  shell_assets: Vec<String>,
}

impl Lifecycle {
  pub fn new(cache: ResponseCache, app_origin: Url, shell_assets: Vec<String>) -> Self {
    Self {
      cache,
      app_origin,
      shell_assets,
    }
  }

  /// Seed the shell assets into the runtime cache. Individual assets that
  /// cannot be fetched or stored are skipped; installation itself never
  /// fails because an optional asset is missing.
  pub async fn install<F, Fut>(&self, fetch: F) -> Result<usize>
  where
    F: Fn(FetchRequest) -> Fut,
    Fut: Future<Output = Result<FetchResponse>>,
  {
    let mut seeded = 0;

    for path in &self.shell_assets {
      let url = match self.app_origin.join(path) {
        Ok(url) => url,
        Err(e) => {
          warn!(path = %path, error = %e, "invalid shell asset path");
          continue;
        }
      };

      let req = FetchRequest::get(url);
      match fetch(req.clone()).await {
        Ok(response) if response.is_success() => match self.cache.put(&req, &response) {
          Ok(()) => seeded += 1,
          Err(e) => warn!(path = %path, error = %e, "failed to store shell asset"),
        },
        Ok(response) => {
          warn!(path = %path, status = response.status, "skipping shell asset");
        }
        Err(e) => {
          warn!(path = %path, error = %e, "failed to fetch shell asset");
        }
      }
    }

    info!(seeded, total = self.shell_assets.len(), "install complete");
    Ok(seeded)
  }

  /// Evict runtime-cache entries from any other version, then take over
  /// in-flight traffic.
  pub fn activate(&self) -> Result<usize> {
    let evicted = self.cache.evict_stale_versions()?;
    info!(version = self.cache.version(), evicted, "activated");
    Ok(evicted)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::error::EngineError;
  use std::sync::Arc;

  fn origin() -> Url {
    Url::parse("https://pos.example.com").unwrap()
  }

  fn setup(version: &str) -> (Arc<Database>, ResponseCache) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let cache = ResponseCache::new(Arc::clone(&db), version);
    (db, cache)
  }

  #[tokio::test]
  async fn test_install_seeds_available_assets_and_skips_failures() {
    let (_db, cache) = setup("v1");
    let lifecycle = Lifecycle::new(
      cache.clone(),
      origin(),
      vec![
        "/".to_string(),
        "/manifest.json".to_string(),
        "/logo-qk.png".to_string(),
      ],
    );

    let seeded = lifecycle
      .install(|req| async move {
        if req.url.path() == "/logo-qk.png" {
          return Err(EngineError::NetworkUnavailable("timeout".into()));
        }
        Ok(FetchResponse::new(200, req.url.path().as_bytes().to_vec()))
      })
      .await
      .unwrap();

    assert_eq!(seeded, 2);
    assert!(cache
      .get(&FetchRequest::get(origin().join("/manifest.json").unwrap()))
      .unwrap()
      .is_some());
    assert!(cache
      .get(&FetchRequest::get(origin().join("/logo-qk.png").unwrap()))
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn test_activation_evicts_previous_version_entries() {
    let (db, old) = setup("v1");
    let asset = FetchRequest::get(origin().join("/static/app.js").unwrap());
    old
      .put(&asset, &FetchResponse::new(200, b"old".to_vec()))
      .unwrap();

    let current = ResponseCache::new(db, "v2");
    let shell = FetchRequest::get(origin().join("/index.html").unwrap());
    current
      .put(&shell, &FetchResponse::new(200, b"shell".to_vec()))
      .unwrap();

    let lifecycle = Lifecycle::new(current.clone(), origin(), Vec::new());
    let evicted = lifecycle.activate().unwrap();

    assert_eq!(evicted, 1);
    assert!(current.get(&asset).unwrap().is_none());
    assert!(current.get(&shell).unwrap().is_some());
  }
}
