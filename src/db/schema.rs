/// Schema for the local sync database.
pub const SCHEMA: &str = r#"
-- Pending mutating actions awaiting transmission, strict FIFO by seq
CREATE TABLE IF NOT EXISTS offline_queue (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    action_id TEXT NOT NULL UNIQUE,
    payload BLOB NOT NULL,
    created_at TEXT NOT NULL
);

-- Key/value cache with per-entry TTL (timestamps are unix millis)
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    stored_at INTEGER NOT NULL,
    expires_at INTEGER
);

-- Sync bookkeeping, e.g. last_sync_at
CREATE TABLE IF NOT EXISTS sync_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
