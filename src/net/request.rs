//! Request/response model and request classification.

use reqwest::Method;
use url::Url;

/// How the request was initiated. Full-page loads carry `Navigate`;
/// everything else is `Standard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
  Standard,
  Navigate,
}

/// An outgoing request as seen by the interception layer.
#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
}

impl FetchRequest {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      mode: RequestMode::Standard,
    }
  }

  pub fn navigate(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      mode: RequestMode::Navigate,
    }
  }

  pub fn post(url: Url) -> Self {
    Self {
      method: Method::POST,
      url,
      mode: RequestMode::Standard,
    }
  }
}

/// A response as held by the runtime cache: status, headers and raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl FetchResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn empty(status: u16) -> Self {
    Self::new(status, Vec::new())
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// Whether the status is in the success range. Only such responses are
  /// ever written to the runtime cache.
  pub fn is_success(&self) -> bool {
    (200..=299).contains(&self.status)
  }
}

/// Strategy class for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Same-origin GET under /api/: network-first with cache fallback.
  Api,
  /// Same-origin GET for scripts, styles, images: cache-first with
  /// background revalidation.
  Asset,
  /// Full-page load: network-first with app-shell fallback.
  Navigation,
  /// Not intercepted: non-GET or cross-origin. Passes straight through.
  Bypass,
}

/// Decide the strategy for a request against the application origin.
pub fn classify(req: &FetchRequest, app_origin: &Url) -> RequestClass {
  if req.method != Method::GET {
    return RequestClass::Bypass;
  }

  if req.url.origin() != app_origin.origin() {
    return RequestClass::Bypass;
  }

  if req.mode == RequestMode::Navigate {
    return RequestClass::Navigation;
  }

  if req.url.path().starts_with("/api/") {
    return RequestClass::Api;
  }

  RequestClass::Asset
}

#[cfg(test)]
mod tests {
  use super::*;

  fn origin() -> Url {
    Url::parse("https://pos.example.com").unwrap()
  }

  fn url(path: &str) -> Url {
    origin().join(path).unwrap()
  }

  #[test]
  fn test_api_requests_are_network_first() {
    let req = FetchRequest::get(url("/api/products?business_id=1"));
    assert_eq!(classify(&req, &origin()), RequestClass::Api);
  }

  #[test]
  fn test_same_origin_get_defaults_to_asset() {
    let req = FetchRequest::get(url("/static/js/main.3f8a2c.js"));
    assert_eq!(classify(&req, &origin()), RequestClass::Asset);
  }

  #[test]
  fn test_navigation_mode_wins_over_path() {
    let req = FetchRequest::navigate(url("/pos"));
    assert_eq!(classify(&req, &origin()), RequestClass::Navigation);
  }

  #[test]
  fn test_non_get_is_never_intercepted() {
    let req = FetchRequest::post(url("/api/orders"));
    assert_eq!(classify(&req, &origin()), RequestClass::Bypass);
  }

  #[test]
  fn test_cross_origin_is_never_intercepted() {
    let req = FetchRequest::get(Url::parse("https://cdn.example.net/lib.js").unwrap());
    assert_eq!(classify(&req, &origin()), RequestClass::Bypass);
  }
}
