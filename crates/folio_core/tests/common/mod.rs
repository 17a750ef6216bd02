#![allow(dead_code)]

use folio_core::{CacheError, CacheResult, CacheStore, MemoryCacheStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Memory store that can be switched to fail every call.
#[derive(Debug, Default)]
pub struct FlakyCacheStore {
    inner: MemoryCacheStore,
    down: AtomicBool,
    gets: AtomicUsize,
}

impl FlakyCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryCacheStore {
        &self.inner
    }

    /// Number of `get` calls served while the store was up.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    fn check(&self) -> CacheResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

impl CacheStore for FlakyCacheStore {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        self.check()?;
        self.inner.put(key, value, ttl)
    }

    fn forget(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        self.inner.forget(key)
    }

    fn flush_prefix(&self, prefix: &str) -> CacheResult<usize> {
        self.check()?;
        self.inner.flush_prefix(prefix)
    }
}
