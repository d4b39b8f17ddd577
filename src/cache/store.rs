//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use crate::db::Database;

/// A raw cache row: opaque serialized payload plus timing metadata.
#[derive(Debug, Clone)]
pub struct StoredEntry {
  pub value: Vec<u8>,
  pub stored_at: DateTime<Utc>,
  /// None means the entry never expires
  pub expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
  /// Whether the entry has outlived its TTL at `now`.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    match self.expires_at {
      Some(at) => now >= at,
      None => false,
    }
  }
}

/// Trait for cache storage backends.
pub trait CacheStore: Send + Sync {
  /// Read a raw entry; expiry is the layer's concern, not the store's.
  fn get(&self, key: &str) -> Result<Option<StoredEntry>>;

  /// Store or overwrite an entry.
  fn put(&self, key: &str, entry: &StoredEntry) -> Result<()>;

  /// Drop an entry.
  fn invalidate(&self, key: &str) -> Result<()>;

  /// Keys currently stored under a prefix, oldest first.
  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all reads miss, all writes discard.
pub struct NoopCacheStore;

impl CacheStore for NoopCacheStore {
  fn get(&self, _key: &str) -> Result<Option<StoredEntry>> {
    Ok(None) // Always miss
  }

  fn put(&self, _key: &str, _entry: &StoredEntry) -> Result<()> {
    Ok(()) // Discard
  }

  fn invalidate(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>> {
    Ok(Vec::new())
  }
}

/// SQLite-backed cache storage over the shared sync database.
pub struct SqliteCacheStore {
  db: Arc<Database>,
}

impl SqliteCacheStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl CacheStore for SqliteCacheStore {
  fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
    let conn = self.db.lock()?;

    let row: Option<(Vec<u8>, i64, Option<i64>)> = conn
      .query_row(
        "SELECT value, stored_at, expires_at FROM cache_entries WHERE cache_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))?;

    match row {
      Some((value, stored_at, expires_at)) => Ok(Some(StoredEntry {
        value,
        stored_at: from_millis(stored_at)?,
        expires_at: expires_at.map(from_millis).transpose()?,
      })),
      None => Ok(None),
    }
  }

  fn put(&self, key: &str, entry: &StoredEntry) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries (cache_key, value, stored_at, expires_at)
         VALUES (?, ?, ?, ?)",
        params![
          key,
          entry.value,
          entry.stored_at.timestamp_millis(),
          entry.expires_at.map(|at| at.timestamp_millis()),
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;
    Ok(())
  }

  fn invalidate(&self, key: &str) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute("DELETE FROM cache_entries WHERE cache_key = ?", params![key])
      .map_err(|e| eyre!("Failed to invalidate cache entry: {}", e))?;
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT cache_key FROM cache_entries WHERE cache_key LIKE ? || '%' ORDER BY stored_at",
      )
      .map_err(|e| eyre!("Failed to prepare key query: {}", e))?;

    let keys = stmt
      .query_map(params![prefix], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache keys: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
  DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| eyre!("Invalid cache timestamp: {}", ms))
}
