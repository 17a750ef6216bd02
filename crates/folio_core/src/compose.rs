//! Composition root for repositories.
//!
//! # Responsibility
//! - Decide once, at construction, whether consumers get cached repositories.
//! - Hand consumers `Box<dyn Repository>` so the decision stays invisible.
//!
//! # Invariants
//! - Every cached repository built by one provider shares one store and one
//!   invalidation gate.
//! - Cached repositories also invalidate the built-in kinds that embed them.

use crate::cache::decorator::CachedRepository;
use crate::cache::gate::InvalidationGate;
use crate::cache::store::CacheStore;
use crate::config::CacheConfig;
use crate::model::kind::EntityKind;
use crate::repo::repository::{RepoResult, Repository};
use crate::repo::sqlite_repo::SqliteRepository;
use log::info;
use rusqlite::Connection;
use std::sync::Arc;

struct CacheLayer {
    store: Arc<dyn CacheStore>,
    gate: Arc<InvalidationGate>,
    config: CacheConfig,
}

/// Builds repositories over one migrated connection.
pub struct RepositoryProvider<'conn> {
    conn: &'conn Connection,
    cache: Option<CacheLayer>,
}

impl<'conn> RepositoryProvider<'conn> {
    /// Caches through `store` when `config.enabled`; otherwise `store` and
    /// `gate` are dropped and repositories talk to SQLite directly.
    pub fn new(
        conn: &'conn Connection,
        config: &CacheConfig,
        store: Arc<dyn CacheStore>,
        gate: Arc<InvalidationGate>,
    ) -> Self {
        let cache = config.enabled.then(|| CacheLayer {
            store,
            gate,
            config: config.clone(),
        });
        info!(
            "event=provider_init module=compose status=ok cache={}",
            if cache.is_some() { "enabled" } else { "disabled" }
        );
        Self { conn, cache }
    }

    /// Provider without caching.
    pub fn plain(conn: &'conn Connection) -> Self {
        Self { conn, cache: None }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Repository for `kind`, cached when this provider caches.
    ///
    /// # Errors
    /// - `StorageUnavailable` when the kind's table is missing.
    pub fn repository(&self, kind: EntityKind) -> RepoResult<Box<dyn Repository + 'conn>> {
        let direct = SqliteRepository::try_new(self.conn, kind)?;
        Ok(match &self.cache {
            Some(layer) => Box::new(
                CachedRepository::new(
                    direct,
                    Arc::clone(&layer.store),
                    Arc::clone(&layer.gate),
                    &layer.config,
                )
                .with_dependents(EntityKind::BUILTIN),
            ),
            None => Box::new(direct),
        })
    }
}
