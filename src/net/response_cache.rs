//! Runtime response cache keyed by the exact outgoing request.
//!
//! A transport-level artifact: it knows nothing about businesses or entity
//! shapes, only `(method, url) -> last successful response`. Entries carry
//! the cache version tag they were written under so activation can evict
//! leftovers from previous releases.

use chrono::Utc;
use rusqlite::params;
use std::sync::Arc;

use crate::db::{self, Database};
use crate::error::Result;

use super::request::{FetchRequest, FetchResponse};

#[derive(Clone)]
pub struct ResponseCache {
  db: Arc<Database>,
  version: String,
}

impl ResponseCache {
  pub fn new(db: Arc<Database>, version: &str) -> Self {
    Self {
      db,
      version: version.to_string(),
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  /// The most recent stored response for the exact request, if any.
  pub fn get(&self, req: &FetchRequest) -> Result<Option<FetchResponse>> {
    self.db.with_conn(|conn| {
      let row: Option<(u16, String, Vec<u8>)> = conn
        .query_row(
          "SELECT status, headers, body FROM response_cache WHERE method = ? AND url = ?",
          params![req.method.as_str(), req.url.as_str()],
          |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .ok();

      Ok(row.map(|(status, headers, body)| FetchResponse {
        status,
        headers: serde_json::from_str(&headers).unwrap_or_default(),
        body,
      }))
    })
  }

  /// Store a successful response, superseding any previous entry for the
  /// same request. Failed responses are never cached.
  pub fn put(&self, req: &FetchRequest, response: &FetchResponse) -> Result<()> {
    if !response.is_success() {
      return Ok(());
    }

    let headers = serde_json::to_string(&response.headers)?;

    self.db.with_conn(|conn| {
      conn.execute(
        "INSERT OR REPLACE INTO response_cache
           (method, url, status, headers, body, version, fetched_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          req.method.as_str(),
          req.url.as_str(),
          response.status,
          headers,
          response.body,
          self.version,
          db::timestamp(Utc::now()),
        ],
      )?;
      Ok(())
    })
  }

  /// Drop every entry written under a different version tag. Called on
  /// activation after a version bump.
  pub fn evict_stale_versions(&self) -> Result<usize> {
    self.db.with_conn(|conn| {
      conn.execute(
        "DELETE FROM response_cache WHERE version != ?",
        params![self.version],
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn req(path: &str) -> FetchRequest {
    FetchRequest::get(Url::parse("https://pos.example.com").unwrap().join(path).unwrap())
  }

  fn cache(version: &str) -> (Arc<Database>, ResponseCache) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let cache = ResponseCache::new(Arc::clone(&db), version);
    (db, cache)
  }

  #[test]
  fn test_round_trip_preserves_bytes() {
    let (_db, cache) = cache("v1");
    let request = req("/api/products");
    let response = FetchResponse::new(200, b"[{\"id\":1}]".to_vec())
      .with_header("content-type", "application/json");

    cache.put(&request, &response).unwrap();

    let stored = cache.get(&request).unwrap().unwrap();
    assert_eq!(stored, response);
  }

  #[test]
  fn test_failed_responses_are_never_stored() {
    let (_db, cache) = cache("v1");
    let request = req("/api/products");

    cache
      .put(&request, &FetchResponse::new(500, b"oops".to_vec()))
      .unwrap();

    assert!(cache.get(&request).unwrap().is_none());
  }

  #[test]
  fn test_most_recent_wins() {
    let (_db, cache) = cache("v1");
    let request = req("/api/products");

    cache
      .put(&request, &FetchResponse::new(200, b"old".to_vec()))
      .unwrap();
    cache
      .put(&request, &FetchResponse::new(200, b"new".to_vec()))
      .unwrap();

    assert_eq!(cache.get(&request).unwrap().unwrap().body, b"new".to_vec());
  }

  #[test]
  fn test_eviction_keeps_current_version() {
    let (db, old) = cache("v1");
    old
      .put(&req("/static/app.js"), &FetchResponse::new(200, b"v1".to_vec()))
      .unwrap();

    let new = ResponseCache::new(db, "v2");
    new
      .put(&req("/static/app.2.js"), &FetchResponse::new(200, b"v2".to_vec()))
      .unwrap();

    let evicted = new.evict_stale_versions().unwrap();
    assert_eq!(evicted, 1);

    assert!(new.get(&req("/static/app.js")).unwrap().is_none());
    assert!(new.get(&req("/static/app.2.js")).unwrap().is_some());
  }
}
