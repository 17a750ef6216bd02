//! Cache store persisted in a SQLite table.
//!
//! Entries outlive the process that wrote them. A fresh `InvalidationGate`
//! flushes each kind prefix before trusting it, so a restarted process never
//! serves rows cached by an earlier run. Processes writing the same database
//! concurrently must not share one cache file: invalidations only reach
//! decorators on the same gate. Every SQLite failure is reported as
//! `CacheError::Unavailable`.

use super::lock::mutex_lock;
use super::store::{CacheError, CacheResult, CacheStore};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SOURCE: &str = "cache::sqlite_store";

const CACHE_SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    expires_at INTEGER NULL
);";

/// SQLite-backed cache store; one connection guarded by a mutex.
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        Self::from_connection(Connection::open(path).map_err(unavailable)?)
    }

    pub fn open_in_memory() -> CacheResult<Self> {
        Self::from_connection(Connection::open_in_memory().map_err(unavailable)?)
    }

    fn from_connection(conn: Connection) -> CacheResult<Self> {
        conn.execute_batch(CACHE_SCHEMA_SQL).map_err(unavailable)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Deletes expired rows; returns how many were removed.
    pub fn purge_expired(&self) -> CacheResult<usize> {
        let conn = mutex_lock(&self.conn, SOURCE, "purge_expired");
        conn.execute(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1;",
            [now_ms()],
        )
        .map_err(unavailable)
    }
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let conn = mutex_lock(&self.conn, SOURCE, "get");
        conn.query_row(
            "SELECT value FROM cache_entries
             WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2);",
            params![key, now_ms()],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(unavailable)
    }

    fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| {
            now_ms().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
        });
        let conn = mutex_lock(&self.conn, SOURCE, "put");
        conn.execute(
            "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at;",
            params![key, value, expires_at],
        )
        .map_err(unavailable)?;
        Ok(())
    }

    fn forget(&self, key: &str) -> CacheResult<bool> {
        let conn = mutex_lock(&self.conn, SOURCE, "forget");
        let removed = conn
            .execute("DELETE FROM cache_entries WHERE key = ?1;", [key])
            .map_err(unavailable)?;
        Ok(removed > 0)
    }

    fn flush_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let conn = mutex_lock(&self.conn, SOURCE, "flush_prefix");
        conn.execute(
            "DELETE FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1;",
            [prefix],
        )
        .map_err(unavailable)
    }
}

fn unavailable(err: rusqlite::Error) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
