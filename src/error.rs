//! Error taxonomy for the offline engine.
//!
//! Every failure mode the engine can hit is an explicit, inspectable variant.
//! A cache miss is deliberately *not* here: misses are a legitimate fallback
//! signal and are modelled as `Option::None` on the read paths.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  /// The local store is inaccessible (corruption, quota, locked file).
  /// Callers degrade to network-only reads; this must never crash the app.
  #[error("local store unavailable: {0}")]
  StorageUnavailable(String),

  /// Transient network failure (refused connection, timeout, 5xx).
  #[error("network unavailable: {0}")]
  NetworkUnavailable(String),

  /// The server understood the request and rejected it (4xx class).
  /// Surfaced to the user; never silently retried.
  #[error("server rejected request ({status}): {reason}")]
  ServerRejected { status: u16, reason: String },

  /// Outbox state machine guard: the requested transition skips a state.
  #[error("invalid outbox transition: {from} -> {to}")]
  InvalidTransition {
    from: &'static str,
    to: &'static str,
  },

  /// Outbox item id does not exist.
  #[error("outbox item {0} not found")]
  UnknownItem(i64),

  /// Malformed data at a boundary (record JSON, push payload).
  #[error("invalid payload: {0}")]
  Payload(String),

  #[error("configuration error: {0}")]
  Config(String),
}

impl EngineError {
  /// Whether a failed network write is transient and safe to auto-retry.
  /// Server rejections require user-visible resolution first.
  pub fn is_transient(&self) -> bool {
    matches!(self, EngineError::NetworkUnavailable(_))
  }
}

impl From<rusqlite::Error> for EngineError {
  fn from(e: rusqlite::Error) -> Self {
    EngineError::StorageUnavailable(e.to_string())
  }
}

impl From<serde_json::Error> for EngineError {
  fn from(e: serde_json::Error) -> Self {
    EngineError::Payload(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, EngineError>;
