//! Durable queue of write intents pending server confirmation.
//!
//! Sale transactions performed while offline land here first and are
//! replayed in creation order once connectivity returns. Items are owned
//! exclusively by this queue; nothing else mutates them.

mod drain;

pub use drain::{DrainReport, Drainer};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use crate::db::{self, Database};
use crate::error::{EngineError, Result};

/// Outbox item lifecycle.
///
/// `pending -> syncing -> synced` with `syncing -> failed` on a rejected or
/// unreachable submit, and `failed -> pending` as the explicit retry edge.
/// No transition skips a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
  Pending,
  Syncing,
  Synced,
  Failed,
}

impl OutboxStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      OutboxStatus::Pending => "pending",
      OutboxStatus::Syncing => "syncing",
      OutboxStatus::Synced => "synced",
      OutboxStatus::Failed => "failed",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "pending" => Some(OutboxStatus::Pending),
      "syncing" => Some(OutboxStatus::Syncing),
      "synced" => Some(OutboxStatus::Synced),
      "failed" => Some(OutboxStatus::Failed),
      _ => None,
    }
  }
}

/// A queued write intent. The payload is opaque order data; the engine only
/// inspects it at the submit boundary.
#[derive(Debug, Clone)]
pub struct OutboxItem {
  pub id: i64,
  pub payload: serde_json::Value,
  pub status: OutboxStatus,
  pub error: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
  pub synced_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct OutboxQueue {
  db: Arc<Database>,
}

impl OutboxQueue {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Record a write intent. Returns the item's id, which is stable for its
  /// entire lifetime; ids are assigned in monotonically increasing order.
  pub fn enqueue(&self, payload: serde_json::Value) -> Result<i64> {
    let data = serde_json::to_vec(&payload)?;

    self.db.with_conn(|conn| {
      conn.execute(
        "INSERT INTO outbox (payload, status, created_at) VALUES (?, 'pending', ?)",
        params![data, db::timestamp(Utc::now())],
      )?;
      Ok(conn.last_insert_rowid())
    })
  }

  pub fn get(&self, id: i64) -> Result<Option<OutboxItem>> {
    self.db.with_conn(|conn| {
      conn
        .query_row(
          "SELECT id, payload, status, error, created_at, synced_at
           FROM outbox WHERE id = ?",
          params![id],
          row_to_item,
        )
        .optional()
    })
  }

  /// All items not yet confirmed by the server, in creation order. This is
  /// the replay contract: later items may depend on side effects of earlier
  /// ones, so the order is exactly the order the user acted in.
  pub fn list_pending(&self) -> Result<Vec<OutboxItem>> {
    self.list_where("status != 'synced'")
  }

  /// Items needing user-visible resolution.
  pub fn list_failed(&self) -> Result<Vec<OutboxItem>> {
    self.list_where("status = 'failed'")
  }

  /// Head of the replay queue: the oldest unconfirmed item, whatever its
  /// state. A `failed` head blocks the drain; a `syncing` head is a crash
  /// leftover and must be retried, not assumed synced.
  pub fn next_unsynced(&self) -> Result<Option<OutboxItem>> {
    self.db.with_conn(|conn| {
      conn
        .query_row(
          "SELECT id, payload, status, error, created_at, synced_at
           FROM outbox WHERE status != 'synced' ORDER BY id LIMIT 1",
          [],
          row_to_item,
        )
        .optional()
    })
  }

  pub fn mark_syncing(&self, id: i64) -> Result<()> {
    self.transition(id, OutboxStatus::Pending, OutboxStatus::Syncing, None)
  }

  pub fn mark_synced(&self, id: i64) -> Result<()> {
    self.transition(id, OutboxStatus::Syncing, OutboxStatus::Synced, None)
  }

  pub fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
    self.transition(id, OutboxStatus::Syncing, OutboxStatus::Failed, Some(error))
  }

  /// Put a failed item back at its place in the queue. The id (and therefore
  /// the replay position) is unchanged.
  pub fn retry(&self, id: i64) -> Result<()> {
    self.transition(id, OutboxStatus::Failed, OutboxStatus::Pending, None)
  }

  /// Periodic sweep bounding growth of the terminal-state backlog.
  pub fn purge_synced_older_than(&self, max_age: Duration) -> Result<usize> {
    let cutoff = db::timestamp(Utc::now() - max_age);

    self.db.with_conn(|conn| {
      conn.execute(
        "DELETE FROM outbox
         WHERE status = 'synced' AND synced_at IS NOT NULL
           AND datetime(synced_at) < datetime(?)",
        params![cutoff],
      )
    })
  }

  pub fn count(&self) -> Result<i64> {
    self
      .db
      .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0)))
  }

  pub fn count_unsynced(&self) -> Result<i64> {
    self.db.with_conn(|conn| {
      conn.query_row(
        "SELECT COUNT(*) FROM outbox WHERE status != 'synced'",
        [],
        |row| row.get(0),
      )
    })
  }

  fn list_where(&self, filter: &str) -> Result<Vec<OutboxItem>> {
    self.db.with_conn(|conn| {
      let mut stmt = conn.prepare(&format!(
        "SELECT id, payload, status, error, created_at, synced_at
         FROM outbox WHERE {} ORDER BY id",
        filter
      ))?;

      let items = stmt
        .query_map([], row_to_item)?
        .filter_map(|r| r.ok())
        .collect();

      Ok(items)
    })
  }

  /// Guarded state transition: the update only applies when the item is in
  /// the expected state, so an out-of-order call surfaces as
  /// `InvalidTransition` instead of silently coercing the state machine.
  fn transition(
    &self,
    id: i64,
    expected: OutboxStatus,
    to: OutboxStatus,
    error: Option<&str>,
  ) -> Result<()> {
    let synced_at = match to {
      OutboxStatus::Synced => Some(db::timestamp(Utc::now())),
      _ => None,
    };

    let updated = self.db.with_conn(|conn| {
      conn.execute(
        "UPDATE outbox SET status = ?, error = ?, synced_at = ?
         WHERE id = ? AND status = ?",
        params![to.as_str(), error, synced_at, id, expected.as_str()],
      )
    })?;

    if updated == 1 {
      return Ok(());
    }

    match self.get(id)? {
      Some(item) => Err(EngineError::InvalidTransition {
        from: item.status.as_str(),
        to: to.as_str(),
      }),
      None => Err(EngineError::UnknownItem(id)),
    }
  }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxItem> {
  let payload: Vec<u8> = row.get(1)?;
  let status: String = row.get(2)?;
  let created_at: String = row.get(4)?;
  let synced_at: Option<String> = row.get(5)?;

  Ok(OutboxItem {
    id: row.get(0)?,
    payload: serde_json::from_slice(&payload).unwrap_or(serde_json::Value::Null),
    status: OutboxStatus::parse(&status).unwrap_or(OutboxStatus::Failed),
    error: row.get(3)?,
    created_at: db::parse_timestamp(&created_at),
    synced_at: synced_at.as_deref().and_then(db::parse_timestamp),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn queue() -> OutboxQueue {
    OutboxQueue::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  #[test]
  fn test_enqueue_assigns_monotonic_ids() {
    let queue = queue();
    let a = queue.enqueue(json!({"order": "a"})).unwrap();
    let b = queue.enqueue(json!({"order": "b"})).unwrap();
    let c = queue.enqueue(json!({"order": "c"})).unwrap();

    assert!(a < b && b < c);

    let pending = queue.list_pending().unwrap();
    assert_eq!(
      pending.iter().map(|i| i.id).collect::<Vec<_>>(),
      vec![a, b, c]
    );
  }

  #[test]
  fn test_full_lifecycle() {
    let queue = queue();
    let id = queue.enqueue(json!({"total": 25000})).unwrap();

    queue.mark_syncing(id).unwrap();
    queue.mark_synced(id).unwrap();

    let item = queue.get(id).unwrap().unwrap();
    assert_eq!(item.status, OutboxStatus::Synced);
    assert!(item.synced_at.is_some());
    assert!(queue.list_pending().unwrap().is_empty());
  }

  #[test]
  fn test_transitions_cannot_skip_states() {
    let queue = queue();
    let id = queue.enqueue(json!({})).unwrap();

    // pending -> synced skips syncing
    let err = queue.mark_synced(id).unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    // pending -> failed skips syncing
    assert!(queue.mark_failed(id, "boom").is_err());

    // retry only applies to failed items
    assert!(queue.retry(id).is_err());

    let item = queue.get(id).unwrap().unwrap();
    assert_eq!(item.status, OutboxStatus::Pending);
  }

  #[test]
  fn test_retry_restores_pending_and_clears_error() {
    let queue = queue();
    let id = queue.enqueue(json!({})).unwrap();

    queue.mark_syncing(id).unwrap();
    queue.mark_failed(id, "validation failed").unwrap();

    let failed = queue.get(id).unwrap().unwrap();
    assert_eq!(failed.status, OutboxStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("validation failed"));

    queue.retry(id).unwrap();
    let retried = queue.get(id).unwrap().unwrap();
    assert_eq!(retried.status, OutboxStatus::Pending);
    assert_eq!(retried.error, None);
  }

  #[test]
  fn test_unknown_item_is_an_error() {
    let queue = queue();
    assert!(matches!(
      queue.mark_syncing(999).unwrap_err(),
      EngineError::UnknownItem(999)
    ));
  }

  #[test]
  fn test_purge_only_removes_old_synced_items() {
    let queue = queue();
    let old = queue.enqueue(json!({"n": 1})).unwrap();
    let fresh = queue.enqueue(json!({"n": 2})).unwrap();
    let open = queue.enqueue(json!({"n": 3})).unwrap();

    queue.mark_syncing(old).unwrap();
    queue.mark_synced(old).unwrap();
    queue.mark_syncing(fresh).unwrap();
    queue.mark_synced(fresh).unwrap();

    // Age the first item past the retention window
    let stale_ts = db::timestamp(Utc::now() - Duration::days(8));
    queue
      .db
      .with_conn(|conn| {
        conn.execute(
          "UPDATE outbox SET synced_at = ? WHERE id = ?",
          params![stale_ts, old],
        )
      })
      .unwrap();

    let removed = queue.purge_synced_older_than(Duration::days(7)).unwrap();
    assert_eq!(removed, 1);

    assert!(queue.get(old).unwrap().is_none());
    assert!(queue.get(fresh).unwrap().is_some());
    assert!(queue.get(open).unwrap().is_some());
  }
}
