//! Network interception layer.
//!
//! Every outgoing request passes through here. GETs against the application
//! origin are answered by a per-class caching strategy backed by a runtime
//! response cache; non-GET and cross-origin traffic passes straight through.
//! Writes that must survive offline never enter this module; they go to the
//! outbox.

mod client;
mod lifecycle;
mod proxy;
mod request;
mod response_cache;

pub use client::ApiClient;
pub use lifecycle::Lifecycle;
pub use proxy::{FetchProxy, Served, ServedFrom};
pub use request::{classify, FetchRequest, FetchResponse, RequestClass, RequestMode};
pub use response_cache::ResponseCache;
