use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Seconds the most recent action stays undoable.
  #[serde(default = "default_undo_window_secs")]
  pub undo_window_secs: u64,
  /// Override for the local state directory (default: platform data dir).
  #[serde(default)]
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the jobs API, e.g. "https://api.example.com"
  pub base_url: String,
  /// Per-attempt request timeout; a hit counts as a network error
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Feed page size requested from the server
  #[serde(default = "default_page_size")]
  pub page_size: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryConfig {
  /// Retries after the first attempt for transient failures
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default = "default_base_delay_ms")]
  pub base_delay_ms: u64,
  #[serde(default = "default_max_delay_ms")]
  pub max_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: default_max_retries(),
      base_delay_ms: default_base_delay_ms(),
      max_delay_ms: default_max_delay_ms(),
    }
  }
}

impl RetryConfig {
  /// Delay before the given retry (1-based): doubles from the base,
  /// capped at `max_delay_ms`.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let ms = self
      .base_delay_ms
      .saturating_mul(1u64 << exp)
      .min(self.max_delay_ms);
    Duration::from_millis(ms)
  }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CacheConfig {
  /// How long a cached feed page is served before it expires
  #[serde(default = "default_feed_ttl_secs")]
  pub feed_ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      feed_ttl_secs: default_feed_ttl_secs(),
    }
  }
}

impl CacheConfig {
  pub fn feed_ttl(&self) -> Duration {
    Duration::from_secs(self.feed_ttl_secs)
  }
}

fn default_undo_window_secs() -> u64 {
  5
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_page_size() -> u32 {
  20
}

fn default_max_retries() -> u32 {
  3
}

fn default_base_delay_ms() -> u64 {
  500
}

fn default_max_delay_ms() -> u64 {
  30_000
}

fn default_feed_ttl_secs() -> u64 {
  300
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swipesync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swipesync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/swipesync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swipesync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swipesync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  pub fn undo_window(&self) -> Duration {
    Duration::from_secs(self.undo_window_secs)
  }
}
