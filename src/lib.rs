//! Offline-first cache and sync engine for the Kasir POS client.
//!
//! The engine keeps the point of sale usable without connectivity:
//! - business-partitioned entity caches over a persistent local store
//!   ([`store`], [`catalog`]);
//! - a durable outbox replaying offline writes in order ([`outbox`]);
//! - a network interception layer applying a caching strategy per request
//!   class ([`net`]);
//! - a push-notification router ([`push`]);
//! - a message-passing actor tying them together ([`engine`]).

pub mod catalog;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod net;
pub mod outbox;
pub mod push;
pub mod store;
