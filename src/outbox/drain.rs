//! Sequential replay of the outbox to the server.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::Result;

use super::{OutboxQueue, OutboxStatus};

/// Outcome of one drain cycle.
#[derive(Debug, Clone)]
pub struct DrainReport {
  /// Items confirmed by the server this cycle, in replay order.
  pub sent: Vec<i64>,
  /// The item that stopped the cycle, if any. It stays at the head of the
  /// queue until retried or purged.
  pub blocked: Option<i64>,
  /// Unconfirmed items left in the queue after the cycle.
  pub remaining: usize,
}

/// Drives drain cycles. One instance is shared by the engine; cycles are
/// never run concurrently, which is what preserves the replay order.
#[derive(Debug, Clone)]
pub struct Drainer {
  pace: Duration,
}

impl Default for Drainer {
  fn default() -> Self {
    Self::new()
  }
}

impl Drainer {
  pub fn new() -> Self {
    Self {
      pace: Duration::from_millis(100),
    }
  }

  /// Set the delay between consecutive submissions.
  pub fn with_pace(mut self, pace: Duration) -> Self {
    self.pace = pace;
    self
  }

  /// Replay the queue oldest-first until it is empty or an item fails.
  ///
  /// A `failed` item at the head blocks the cycle immediately: later items
  /// are never sent ahead of it. An item found already `syncing` is a crash
  /// leftover and is submitted again rather than assumed confirmed.
  pub async fn drain_cycle<F, Fut>(&self, queue: &OutboxQueue, submit: F) -> Result<DrainReport>
  where
    F: Fn(serde_json::Value) -> Fut,
    Fut: Future<Output = Result<()>>,
  {
    let mut sent = Vec::new();
    let mut blocked = None;

    loop {
      let item = match queue.next_unsynced()? {
        Some(item) => item,
        None => break,
      };

      match item.status {
        OutboxStatus::Pending => queue.mark_syncing(item.id)?,
        OutboxStatus::Syncing => {
          info!(id = item.id, "resuming interrupted sync");
        }
        OutboxStatus::Failed => {
          blocked = Some(item.id);
          break;
        }
        OutboxStatus::Synced => break,
      }

      match submit(item.payload.clone()).await {
        Ok(()) => {
          queue.mark_synced(item.id)?;
          info!(id = item.id, "outbox item confirmed");
          sent.push(item.id);
        }
        Err(e) => {
          warn!(id = item.id, error = %e, "outbox item failed, stopping cycle");
          queue.mark_failed(item.id, &e.to_string())?;
          blocked = Some(item.id);
          break;
        }
      }

      if !self.pace.is_zero() {
        tokio::time::sleep(self.pace).await;
      }
    }

    Ok(DrainReport {
      sent,
      blocked,
      remaining: queue.count_unsynced()? as usize,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::error::EngineError;
  use serde_json::{json, Value};
  use std::sync::{Arc, Mutex};

  fn queue() -> OutboxQueue {
    OutboxQueue::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  fn drainer() -> Drainer {
    Drainer::new().with_pace(Duration::ZERO)
  }

  /// Submit closure recording what the "server" receives, rejecting any
  /// payload whose "n" field matches `fail_on`.
  fn recording_submit(
    log: Arc<Mutex<Vec<Value>>>,
    fail_on: Option<&'static str>,
  ) -> impl Fn(Value) -> std::pin::Pin<Box<dyn Future<Output = Result<()>> + Send>> {
    move |payload: Value| {
      let log = log.clone();
      Box::pin(async move {
        if fail_on.is_some_and(|n| payload["n"] == n) {
          return Err(EngineError::NetworkUnavailable("connection reset".into()));
        }
        log.lock().unwrap().push(payload);
        Ok(())
      })
    }
  }

  #[tokio::test]
  async fn test_drain_stops_at_first_failure_preserving_order() {
    let queue = queue();
    let a = queue.enqueue(json!({"n": "A"})).unwrap();
    let b = queue.enqueue(json!({"n": "B"})).unwrap();
    let c = queue.enqueue(json!({"n": "C"})).unwrap();

    let server = Arc::new(Mutex::new(Vec::new()));
    let report = drainer()
      .drain_cycle(&queue, recording_submit(server.clone(), Some("B")))
      .await
      .unwrap();

    // The server saw exactly [A]; C was never sent ahead of B
    let received: Vec<Value> = server.lock().unwrap().clone();
    assert_eq!(received, vec![json!({"n": "A"})]);
    assert_eq!(report.sent, vec![a]);
    assert_eq!(report.blocked, Some(b));
    assert_eq!(report.remaining, 2);

    let pending = queue.list_pending().unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id, b);
    assert_eq!(pending[0].status, OutboxStatus::Failed);
    assert_eq!(pending[1].id, c);
    assert_eq!(pending[1].status, OutboxStatus::Pending);
  }

  #[tokio::test]
  async fn test_failed_head_blocks_until_retried() {
    let queue = queue();
    queue.enqueue(json!({"n": "B"})).unwrap();
    queue.enqueue(json!({"n": "C"})).unwrap();

    let server = Arc::new(Mutex::new(Vec::new()));

    // First cycle fails B and stops
    let report = drainer()
      .drain_cycle(&queue, recording_submit(server.clone(), Some("B")))
      .await
      .unwrap();
    let blocked = report.blocked.unwrap();

    // Second cycle would succeed, but the failed head still blocks it
    let report = drainer()
      .drain_cycle(&queue, recording_submit(server.clone(), None))
      .await
      .unwrap();
    assert!(report.sent.is_empty());
    assert_eq!(report.blocked, Some(blocked));
    assert!(server.lock().unwrap().is_empty());

    // After an explicit retry the queue drains in order
    queue.retry(blocked).unwrap();
    let report = drainer()
      .drain_cycle(&queue, recording_submit(server.clone(), None))
      .await
      .unwrap();
    assert_eq!(report.sent.len(), 2);
    assert_eq!(report.remaining, 0);

    let received: Vec<Value> = server.lock().unwrap().clone();
    assert_eq!(received, vec![json!({"n": "B"}), json!({"n": "C"})]);
  }

  #[tokio::test]
  async fn test_crash_leftover_syncing_item_is_retried() {
    let queue = queue();
    let id = queue.enqueue(json!({"n": "X"})).unwrap();

    // Simulate a crash mid-sync: the item stays `syncing` across restart
    queue.mark_syncing(id).unwrap();

    let server = Arc::new(Mutex::new(Vec::new()));
    let report = drainer()
      .drain_cycle(&queue, recording_submit(server.clone(), None))
      .await
      .unwrap();

    // Retried exactly once, not skipped and not double-confirmed
    assert_eq!(report.sent, vec![id]);
    assert_eq!(server.lock().unwrap().len(), 1);
    assert_eq!(queue.get(id).unwrap().unwrap().status, OutboxStatus::Synced);
  }

  #[tokio::test]
  async fn test_server_rejection_surfaces_reason() {
    let queue = queue();
    let id = queue.enqueue(json!({"total": -1})).unwrap();

    let report = drainer()
      .drain_cycle(&queue, |_payload| async {
        Err(EngineError::ServerRejected {
          status: 422,
          reason: "total must be positive".into(),
        })
      })
      .await
      .unwrap();

    assert_eq!(report.blocked, Some(id));
    let item = queue.get(id).unwrap().unwrap();
    assert_eq!(item.status, OutboxStatus::Failed);
    assert!(item.error.unwrap().contains("total must be positive"));
  }
}
