//! Key/value settings and per-collection sync metadata.

use chrono::{DateTime, Utc};
use rusqlite::params;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::db::{self, Database};
use crate::error::Result;

/// Small key/value settings table (active business, last shown prompts, ...).
#[derive(Clone)]
pub struct Settings {
  db: Arc<Database>,
}

impl Settings {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  pub fn get(&self, key: &str) -> Result<Option<String>> {
    self.db.with_conn(|conn| {
      let value: Option<String> = conn
        .query_row(
          "SELECT value FROM settings WHERE key = ?",
          params![key],
          |row| row.get(0),
        )
        .ok();
      Ok(value)
    })
  }

  pub fn set(&self, key: &str, value: &str) -> Result<()> {
    self.db.with_conn(|conn| {
      conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
        params![key, value],
      )?;
      Ok(())
    })
  }

  pub fn delete(&self, key: &str) -> Result<()> {
    self.db.with_conn(|conn| {
      conn.execute("DELETE FROM settings WHERE key = ?", params![key])?;
      Ok(())
    })
  }
}

/// Tracks when each collection was last synced and the hash of the snapshot
/// that was applied, so a full re-sync can be skipped when nothing changed.
#[derive(Clone)]
pub struct SyncMeta {
  db: Arc<Database>,
}

impl SyncMeta {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  pub fn last_sync(&self, collection: &str) -> Result<Option<DateTime<Utc>>> {
    self.db.with_conn(|conn| {
      let value: Option<String> = conn
        .query_row(
          "SELECT last_sync FROM sync_meta WHERE collection = ?",
          params![collection],
          |row| row.get(0),
        )
        .ok();
      Ok(value.and_then(|s| db::parse_timestamp(&s)))
    })
  }

  pub fn data_hash(&self, collection: &str) -> Result<Option<String>> {
    self.db.with_conn(|conn| {
      let value: Option<Option<String>> = conn
        .query_row(
          "SELECT data_hash FROM sync_meta WHERE collection = ?",
          params![collection],
          |row| row.get(0),
        )
        .ok();
      Ok(value.flatten())
    })
  }

  /// Record a completed sync of `collection`.
  pub fn record_sync(&self, collection: &str, data_hash: Option<&str>) -> Result<()> {
    self.db.with_conn(|conn| {
      conn.execute(
        "INSERT OR REPLACE INTO sync_meta (collection, last_sync, data_hash) VALUES (?, ?, ?)",
        params![collection, db::timestamp(Utc::now()), data_hash],
      )?;
      Ok(())
    })
  }

  /// Whether the given snapshot differs from the one last applied.
  pub fn needs_full_sync(&self, collection: &str, snapshot_hash: &str) -> Result<bool> {
    Ok(match self.data_hash(collection)? {
      Some(stored) => stored != snapshot_hash,
      None => true,
    })
  }
}

/// Stable hash of a serialized snapshot, for change detection.
pub fn snapshot_hash(data: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(data);
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_settings_round_trip() {
    let settings = Settings::new(Arc::new(Database::open_in_memory().unwrap()));

    assert_eq!(settings.get("active_business").unwrap(), None);

    settings.set("active_business", "4").unwrap();
    assert_eq!(
      settings.get("active_business").unwrap(),
      Some("4".to_string())
    );

    settings.delete("active_business").unwrap();
    assert_eq!(settings.get("active_business").unwrap(), None);
  }

  #[test]
  fn test_needs_full_sync_tracks_hash() {
    let meta = SyncMeta::new(Arc::new(Database::open_in_memory().unwrap()));
    let hash = snapshot_hash(b"[{\"id\":1}]");

    assert!(meta.needs_full_sync("products:1", &hash).unwrap());

    meta.record_sync("products:1", Some(&hash)).unwrap();
    assert!(!meta.needs_full_sync("products:1", &hash).unwrap());
    assert!(meta.needs_full_sync("products:1", "other").unwrap());
    assert!(meta.last_sync("products:1").unwrap().is_some());
  }
}
