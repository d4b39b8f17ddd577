//! Typed TTL cache with read-through fetching.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::store::{CacheStore, StoredEntry};
use super::traits::{CacheKey, CacheResult};

/// Cache layer that sits between the application and the network client.
///
/// Reads are TTL-checked: an entry past its expiry is treated as a miss and
/// purged as a side effect of the read (lazy eviction, no background sweep).
pub struct CacheLayer<S: CacheStore> {
  store: Arc<S>,
}

impl<S: CacheStore> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(store: S) -> Self {
    Self {
      store: Arc::new(store),
    }
  }

  /// Read and TTL-check the raw entry behind a storage key.
  fn read_entry(&self, storage_key: &str) -> Result<Option<StoredEntry>> {
    match self.store.get(storage_key)? {
      Some(entry) if entry.is_expired(Utc::now()) => {
        // Lazy eviction: an expired read purges the row
        self.store.invalidate(storage_key)?;
        Ok(None)
      }
      other => Ok(other),
    }
  }

  /// Typed read. Expired entries count as misses.
  pub fn get<T: DeserializeOwned>(&self, key: &impl CacheKey) -> Result<Option<T>> {
    match self.read_entry(&key.storage_key())? {
      Some(entry) => {
        let value = serde_json::from_slice(&entry.value).map_err(|e| {
          eyre!(
            "Failed to deserialize cache entry for {}: {}",
            key.description(),
            e
          )
        })?;
        Ok(Some(value))
      }
      None => Ok(None),
    }
  }

  /// Store a value. `ttl: None` means the entry never expires (durable
  /// reference data); `Some` is used for short-lived fetch results.
  pub fn set<T: Serialize>(&self, key: &impl CacheKey, value: &T, ttl: Option<Duration>) -> Result<()> {
    let now = Utc::now();
    let expires_at = match ttl {
      Some(ttl) => {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| eyre!("TTL out of range: {}", e))?;
        Some(now + ttl)
      }
      None => None,
    };

    let entry = StoredEntry {
      value: serde_json::to_vec(value)
        .map_err(|e| eyre!("Failed to serialize value for {}: {}", key.description(), e))?,
      stored_at: now,
      expires_at,
    };

    self.store.put(&key.storage_key(), &entry)
  }

  /// Drop an entry explicitly.
  pub fn invalidate(&self, key: &impl CacheKey) -> Result<()> {
    self.store.invalidate(&key.storage_key())
  }

  /// Live storage keys under a domain, oldest first.
  pub fn keys_in_domain(&self, domain: &str) -> Result<Vec<String>> {
    self.store.keys_with_prefix(&format!("{}:", domain))
  }

  /// Modify a stored value in place, keeping its timing metadata, so a
  /// patch never extends an entry's lifetime. The closure returns whether
  /// it changed anything; unchanged or absent entries are left alone.
  ///
  /// Returns true when the entry was rewritten.
  pub fn modify_raw<T, F>(&self, storage_key: &str, f: F) -> Result<bool>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&mut T) -> bool,
  {
    let mut entry = match self.read_entry(storage_key)? {
      Some(entry) => entry,
      None => return Ok(false),
    };

    let mut value: T = serde_json::from_slice(&entry.value)
      .map_err(|e| eyre!("Failed to deserialize cache entry {}: {}", storage_key, e))?;

    if !f(&mut value) {
      return Ok(false);
    }

    entry.value = serde_json::to_vec(&value)
      .map_err(|e| eyre!("Failed to serialize cache entry {}: {}", storage_key, e))?;
    self.store.put(storage_key, &entry)?;

    Ok(true)
  }

  /// Read-through fetch: a live cached value is returned without touching
  /// the network; otherwise the fetcher runs and its result is stored
  /// under `ttl`.
  pub async fn fetch_with<T, F, Fut>(
    &self,
    key: &impl CacheKey,
    ttl: Option<Duration>,
    fetcher: F,
  ) -> Result<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    match self.read_entry(&key.storage_key())? {
      Some(entry) => {
        let value = serde_json::from_slice(&entry.value).map_err(|e| {
          eyre!(
            "Failed to deserialize cache entry for {}: {}",
            key.description(),
            e
          )
        })?;
        tracing::debug!("cache hit for {}", key.description());
        Ok(CacheResult::from_cache(value, entry.stored_at))
      }
      None => {
        tracing::debug!("cache miss for {}, fetching", key.description());
        let data = fetcher().await?;
        self.set(key, &data, ttl)?;
        Ok(CacheResult::from_network(data))
      }
    }
  }
}

impl<S: CacheStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
    }
  }
}
