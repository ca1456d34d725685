pub mod schema;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{EngineError, Result};

/// Handle to the persistent local store.
///
/// All access goes through short-lived transactions scoped to a single
/// logical operation; the connection is shared behind a mutex and no lock is
/// held across an await point.
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        EngineError::StorageUnavailable(format!("failed to create data directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      EngineError::StorageUnavailable(format!("failed to open {}: {}", path.display(), e))
    })?;

    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;

    Ok(db)
  }

  /// Open an in-memory store. Used by tests and as a last-resort fallback
  /// when the on-disk store cannot be created.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;

    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;

    Ok(db)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| {
        EngineError::StorageUnavailable("could not determine data directory".to_string())
      })?;

    Ok(data_dir.join("kasir-sync").join("offline.db"))
  }

  /// Run database migrations.
  fn run_migrations(&self) -> Result<()> {
    self.with_conn(|conn| conn.execute_batch(schema::SCHEMA))
  }

  /// Run a closure against the connection, mapping storage failures to
  /// `StorageUnavailable`.
  pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
    let conn = self
      .conn
      .lock()
      .map_err(|_| EngineError::StorageUnavailable("connection lock poisoned".to_string()))?;

    f(&conn).map_err(EngineError::from)
  }
}

/// Format a timestamp the way the store expects it: UTC, second precision,
/// parseable by both SQLite's datetime() and RFC 3339 parsers.
pub fn timestamp(t: DateTime<Utc>) -> String {
  t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse a stored timestamp back. Returns None on malformed input.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_migrations_are_idempotent() {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().unwrap();
    db.run_migrations().unwrap();
  }

  #[test]
  fn test_timestamp_round_trip() {
    let now = Utc::now();
    let parsed = parse_timestamp(&timestamp(now)).unwrap();
    assert_eq!(parsed.timestamp(), now.timestamp());
  }
}
