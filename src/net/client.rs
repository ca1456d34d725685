use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use url::Url;

use crate::config::Config;
use crate::error::{EngineError, Result};

use super::request::{FetchRequest, FetchResponse};

/// Backend API client. Response bodies are opaque to the engine except for
/// the status-code class; entity snapshots are decoded by the caller.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::api_token()?;

    let mut headers = HeaderMap::new();
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
      .map_err(|e| EngineError::Config(format!("invalid API token: {}", e)))?;
    headers.insert(AUTHORIZATION, bearer);

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(Duration::from_secs(config.sync.request_timeout_secs))
      .build()
      .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self {
      http,
      base_url: config.api_base_url()?,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Perform a request as-is. This is the network half the interception
  /// layer's strategies run against; any transport failure (timeout
  /// included) maps to `NetworkUnavailable`.
  pub async fn fetch_raw(&self, req: &FetchRequest) -> Result<FetchResponse> {
    let response = self
      .http
      .request(req.method.clone(), req.url.clone())
      .send()
      .await
      .map_err(|e| EngineError::NetworkUnavailable(e.to_string()))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| EngineError::NetworkUnavailable(e.to_string()))?
      .to_vec();

    Ok(FetchResponse {
      status,
      headers,
      body,
    })
  }

  /// Submit one queued sale to the orders endpoint.
  pub async fn submit_order(&self, payload: &serde_json::Value) -> Result<()> {
    let url = self
      .base_url
      .join("api/orders")
      .map_err(|e| EngineError::Config(format!("invalid orders endpoint: {}", e)))?;

    let response = self
      .http
      .post(url)
      .json(payload)
      .send()
      .await
      .map_err(|e| EngineError::NetworkUnavailable(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
      return Ok(());
    }

    let reason = response.text().await.unwrap_or_default();
    Err(rejection(status, reason))
  }
}

/// A 4xx is the server refusing the payload: it needs user-visible
/// resolution, not a blind retry. Everything else is treated as transient.
fn rejection(status: StatusCode, reason: String) -> EngineError {
  if status.is_client_error() {
    EngineError::ServerRejected {
      status: status.as_u16(),
      reason: reason.chars().take(500).collect(),
    }
  } else {
    EngineError::NetworkUnavailable(format!("server returned {}", status))
  }
}
