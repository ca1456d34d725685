//! Structured local caches of server-authoritative reference data.
//!
//! This module holds the business-partitioned entity caches plus the small
//! settings and sync-metadata tables. It is deliberately unaware of the
//! transport-level runtime response cache in `net`; the two answer
//! different questions and never share keys.

mod cache;
mod meta;
mod records;

pub use cache::EntityCache;
pub use meta::{snapshot_hash, Settings, SyncMeta};
pub use records::{CacheRecord, Category, Customer, Product};
