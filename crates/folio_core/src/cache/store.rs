//! Generic key/value cache store contract and the in-memory store.
//!
//! # Invariants
//! - Stores are value-agnostic: they hold opaque strings.
//! - `get`/`put`/`forget` are atomic per key; `flush_prefix` is atomic with
//!   respect to other calls on the same store.
//! - An entry without TTL lives until forgotten, flushed or, in a bounded
//!   store, evicted.

use super::lock::mutex_lock;
use crate::config::DEFAULT_CACHE_CAPACITY;
use log::debug;
use lru::LruCache;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub type CacheResult<T> = Result<T, CacheError>;

/// Cache store failure. Never fatal to repository operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    Unavailable(String),
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "cache store unavailable: {reason}"),
        }
    }
}

impl Error for CacheError {}

/// Key/value store used by the cache decorator.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> CacheResult<Option<String>>;
    fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;
    /// Returns whether an entry was removed.
    fn forget(&self, key: &str) -> CacheResult<bool>;
    /// Removes every entry whose key starts with `prefix`; returns the count.
    fn flush_prefix(&self, prefix: &str) -> CacheResult<usize>;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Process-local store bounded to a fixed number of entries.
///
/// The least recently used entry is evicted when a new key would exceed the
/// capacity. Expired entries are dropped lazily on access.
#[derive(Debug)]
pub struct MemoryCacheStore {
    entries: Mutex<LruCache<String, StoredEntry>>,
}

const SOURCE: &str = "cache::store";

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::with_capacity(
            NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        )
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "capacity").cap().get()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        mutex_lock(&self.entries, SOURCE, "len")
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of live entries starting with `prefix`, in order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = mutex_lock(&self.entries, SOURCE, "keys_with_prefix")
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let found = entries
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));
        match found {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let displaced = mutex_lock(&self.entries, SOURCE, "put")
            .push(key.to_string(), StoredEntry { value, expires_at });
        if let Some((evicted, _)) = displaced.filter(|(displaced, _)| displaced != key) {
            debug!("event=cache_evict module=cache status=ok key={evicted}");
        }
        Ok(())
    }

    fn forget(&self, key: &str) -> CacheResult<bool> {
        Ok(mutex_lock(&self.entries, SOURCE, "forget")
            .pop(key)
            .is_some())
    }

    fn flush_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "flush_prefix");
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_forget() {
        let store = MemoryCacheStore::new();
        store.put("a:1", "one".to_string(), None).unwrap();

        assert_eq!(store.get("a:1").unwrap().as_deref(), Some("one"));
        assert!(store.forget("a:1").unwrap());
        assert!(!store.forget("a:1").unwrap());
        assert_eq!(store.get("a:1").unwrap(), None);
    }

    #[test]
    fn flush_prefix_only_touches_matching_keys() {
        let store = MemoryCacheStore::new();
        for key in ["ns:page:1", "ns:pages:1", "ns:pages:2", "ns:posts:1"] {
            store.put(key, key.to_string(), None).unwrap();
        }

        assert_eq!(store.flush_prefix("ns:pages:").unwrap(), 2);
        assert_eq!(
            store.keys_with_prefix("ns:"),
            vec!["ns:page:1".to_string(), "ns:posts:1".to_string()]
        );
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let store = MemoryCacheStore::new();
        store
            .put("k", "v".to_string(), Some(Duration::ZERO))
            .unwrap();
        store
            .put("keep", "v".to_string(), Some(Duration::from_secs(60)))
            .unwrap();

        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.get("keep").unwrap().as_deref(), Some("v"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn full_store_evicts_least_recently_used_entry() {
        let store = MemoryCacheStore::with_capacity(NonZeroUsize::new(2).unwrap());
        store.put("ns:a", "a".to_string(), None).unwrap();
        store.put("ns:b", "b".to_string(), None).unwrap();

        // Reading `a` makes `b` the eviction candidate.
        assert_eq!(store.get("ns:a").unwrap().as_deref(), Some("a"));
        store.put("ns:c", "c".to_string(), None).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("ns:b").unwrap(), None);
        assert_eq!(
            store.keys_with_prefix("ns:"),
            vec!["ns:a".to_string(), "ns:c".to_string()]
        );
    }

    #[test]
    fn overwriting_a_key_does_not_evict_others() {
        let store = MemoryCacheStore::with_capacity(NonZeroUsize::new(2).unwrap());
        store.put("ns:a", "1".to_string(), None).unwrap();
        store.put("ns:b", "1".to_string(), None).unwrap();
        store.put("ns:a", "2".to_string(), None).unwrap();

        assert_eq!(store.capacity(), 2);
        assert_eq!(store.get("ns:a").unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("ns:b").unwrap().as_deref(), Some("1"));
    }
}
