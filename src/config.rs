use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Business partition to operate on when none is given explicitly
  pub default_business: Option<i64>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the backend, e.g. https://pos.example.com
  pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Version tag written on runtime-cache entries; bumping it makes the
  /// next activation evict everything from previous versions
  #[serde(default = "default_cache_version")]
  pub version: String,
  /// Document served when a navigation has no more specific cached response
  #[serde(default = "default_shell_path")]
  pub shell_path: String,
  /// Assets seeded into the runtime cache on install
  #[serde(default = "default_shell_assets")]
  pub shell_assets: Vec<String>,
  /// Days to keep confirmed outbox items before the purge sweep drops them
  #[serde(default = "default_purge_after_days")]
  pub purge_after_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Delay between consecutive outbox submissions, in milliseconds
  #[serde(default = "default_drain_pace_ms")]
  pub drain_pace_ms: u64,
  /// Seconds between periodic drain ticks while online
  #[serde(default = "default_tick_secs")]
  pub tick_secs: u64,
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
}

fn default_cache_version() -> String {
  "2".to_string()
}

fn default_shell_path() -> String {
  "/index.html".to_string()
}

fn default_shell_assets() -> Vec<String> {
  vec![
    "/".to_string(),
    "/index.html".to_string(),
    "/manifest.json".to_string(),
    "/logo-qk.png".to_string(),
  ]
}

fn default_purge_after_days() -> i64 {
  7
}

fn default_drain_pace_ms() -> u64 {
  100
}

fn default_tick_secs() -> u64 {
  30
}

fn default_request_timeout_secs() -> u64 {
  30
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: default_cache_version(),
      shell_path: default_shell_path(),
      shell_assets: default_shell_assets(),
      purge_after_days: default_purge_after_days(),
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      drain_pace_ms: default_drain_pace_ms(),
      tick_secs: default_tick_secs(),
      request_timeout_secs: default_request_timeout_secs(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./kasir-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/kasir-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(EngineError::Config(format!(
          "config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(EngineError::Config(
        "no configuration file found. Create one at ~/.config/kasir-sync/config.yaml\n\
         See config.example.yaml for the format."
          .to_string(),
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("kasir-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("kasir-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      EngineError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = serde_yaml::from_str(&contents).map_err(|e| {
      EngineError::Config(format!(
        "failed to parse config file {}: {}",
        path.display(),
        e
      ))
    })?;

    Ok(config)
  }

  /// Parsed API base URL, normalized with a trailing slash so endpoint
  /// paths join under it instead of replacing the last segment.
  pub fn api_base_url(&self) -> Result<Url> {
    let mut base = self.api.base_url.trim_end_matches('/').to_string();
    base.push('/');

    Url::parse(&base)
      .map_err(|e| EngineError::Config(format!("invalid api.base_url {}: {}", base, e)))
  }

  /// Get the API token from environment variables.
  ///
  /// Checks KASIR_SYNC_TOKEN first, then KASIR_API_TOKEN as fallback.
  pub fn api_token() -> Result<String> {
    std::env::var("KASIR_SYNC_TOKEN")
      .or_else(|_| std::env::var("KASIR_API_TOKEN"))
      .map_err(|_| {
        EngineError::Config(
          "API token not found. Set KASIR_SYNC_TOKEN or KASIR_API_TOKEN environment variable."
            .to_string(),
        )
      })
  }
}
