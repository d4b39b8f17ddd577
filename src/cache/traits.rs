//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};

/// Key for a cached entry.
///
/// Implementors describe a query whose result is cached; the key is hashed
/// for a stable fixed-length storage key and prefixed with a domain so
/// related entries can be enumerated together.
pub trait CacheKey {
  /// Domain prefix grouping related entries (e.g. "feed")
  fn domain(&self) -> &'static str;

  /// Stable hash of the query parameters
  fn cache_hash(&self) -> String;

  /// Human-readable description for logging
  fn description(&self) -> String;

  /// Full key as stored: `<domain>:<hash>`
  fn storage_key(&self) -> String {
    format!("{}:{}", self.domain(), self.cache_hash())
  }
}

/// Result from a cache operation, including where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was stored (if from cache)
  pub stored_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      stored_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, stored_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      stored_at: Some(stored_at),
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, within its TTL
  Cache,
}
