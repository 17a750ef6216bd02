//! Read-through cache decorator over any repository.
//!
//! # Invariants
//! - Reads never fail because of the cache store; they fall back to the
//!   wrapped repository.
//! - Writes are delegated first; invalidation runs only afterwards and never
//!   turns a committed write into an error.
//! - Invalidation flushes the whole kind prefix plus the prefixes of kinds
//!   whose relation reads embed this kind.
//! - Repository errors pass through unchanged and are never cached.

use super::gate::{InvalidationGate, PopulateOutcome};
use super::keys::{kind_prefix, CacheKeyEncoder, KeyArgs};
use super::store::CacheStore;
use crate::config::CacheConfig;
use crate::model::condition::Condition;
use crate::model::entity::{Entity, EntityId};
use crate::model::field::Attributes;
use crate::model::kind::EntityKind;
use crate::repo::repository::{
    DeleteOutcome, PluckedValue, ReadOptions, RepoError, RepoResult, Repository, Upsert,
};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Whether the decorator currently serves from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheHealth {
    Healthy,
    /// A flush failed; reads bypass the cache until a retry succeeds.
    Degraded,
}

/// Repository wrapper adding transparent read-through caching.
pub struct CachedRepository<R> {
    inner: R,
    store: Arc<dyn CacheStore>,
    gate: Arc<InvalidationGate>,
    keys: CacheKeyEncoder,
    namespace: String,
    ttl: Option<Duration>,
    flush_prefixes: Vec<String>,
}

impl<R: Repository> CachedRepository<R> {
    pub fn new(
        inner: R,
        store: Arc<dyn CacheStore>,
        gate: Arc<InvalidationGate>,
        config: &CacheConfig,
    ) -> Self {
        let keys = CacheKeyEncoder::new(&config.namespace, inner.kind().name);
        let flush_prefixes = vec![keys.kind_prefix().to_string()];
        Self {
            inner,
            store,
            gate,
            keys,
            namespace: config.namespace.clone(),
            ttl: config.ttl(),
            flush_prefixes,
        }
    }

    /// Also invalidates kinds among `kinds` whose relation reads embed this
    /// kind's rows.
    pub fn with_dependents(mut self, kinds: &[EntityKind]) -> Self {
        let prefixes: Vec<String> = self
            .inner
            .kind()
            .dependents(kinds)
            .into_iter()
            .map(|kind| kind_prefix(&self.namespace, kind.name))
            .collect();
        for prefix in prefixes {
            if !self.flush_prefixes.contains(&prefix) {
                self.flush_prefixes.push(prefix);
            }
        }
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Prefixes flushed after every write.
    pub fn flush_prefixes(&self) -> &[String] {
        &self.flush_prefixes
    }

    pub fn cache_health(&self) -> CacheHealth {
        if self
            .flush_prefixes
            .iter()
            .any(|prefix| self.gate.is_pending(prefix))
        {
            CacheHealth::Degraded
        } else {
            CacheHealth::Healthy
        }
    }

    fn kind_name(&self) -> &'static str {
        self.inner.kind().name
    }

    fn read_through<T, F>(&self, op: &'static str, args: KeyArgs, load: F) -> RepoResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> RepoResult<T>,
    {
        let prefix = self.keys.kind_prefix();
        self.retry_pending_flush(prefix);
        let Some(ticket) = self.gate.ticket(prefix) else {
            debug!(
                "event=cache_bypass module=cache status=degraded kind={} op={op}",
                self.kind_name()
            );
            return load();
        };

        let key = self.keys.key(op, &args);
        match self.store.get(&key) {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!(
                        "event=cache_hit module=cache status=ok kind={} op={op}",
                        self.kind_name()
                    );
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        "event=cache_decode module=cache status=error kind={} op={op} error={err}",
                        self.kind_name()
                    );
                    if let Err(err) = self.store.forget(&key) {
                        warn!(
                            "event=cache_forget module=cache status=error kind={} op={op} error={err}",
                            self.kind_name()
                        );
                    }
                }
            },
            Ok(None) => {
                debug!(
                    "event=cache_miss module=cache status=ok kind={} op={op}",
                    self.kind_name()
                );
            }
            Err(err) => {
                warn!(
                    "event=cache_degraded module=cache status=read_fallback kind={} op={op} error={err}",
                    self.kind_name()
                );
                return load();
            }
        }

        let value = load()?;
        match serde_json::to_string(&value) {
            Ok(raw) => {
                let outcome = self
                    .gate
                    .populate(prefix, ticket, || self.store.put(&key, raw, self.ttl));
                match outcome {
                    PopulateOutcome::Stored => {}
                    PopulateOutcome::Stale => debug!(
                        "event=cache_populate module=cache status=skipped reason=invalidated kind={} op={op}",
                        self.kind_name()
                    ),
                    PopulateOutcome::Failed(err) => warn!(
                        "event=cache_populate module=cache status=error kind={} op={op} error={err}",
                        self.kind_name()
                    ),
                }
            }
            Err(err) => warn!(
                "event=cache_encode module=cache status=error kind={} op={op} error={err}",
                self.kind_name()
            ),
        }
        Ok(value)
    }

    fn write_through<T, F>(&self, op: &'static str, write: F) -> RepoResult<T>
    where
        F: FnOnce() -> RepoResult<T>,
    {
        let result = write();
        match &result {
            // Nothing was applied.
            Err(RepoError::Validation(_)) | Err(RepoError::NotFound { .. }) => {}
            // Success, or a failure that may have followed a commit.
            _ => self.invalidate(op),
        }
        result
    }

    fn invalidate(&self, op: &'static str) {
        let report = self
            .gate
            .invalidate(&self.flush_prefixes, |prefix| self.store.flush_prefix(prefix));
        if report.is_complete() {
            debug!(
                "event=cache_invalidate module=cache status=ok kind={} op={op} flushed={}",
                self.kind_name(),
                report.flushed
            );
        } else {
            warn!(
                "event=cache_degraded module=cache status=pending_flush kind={} op={op} prefixes={}",
                self.kind_name(),
                report.failed.join(",")
            );
        }
    }

    /// Flushes the kind prefix if the gate does not trust it yet. Entries a
    /// previous process left in a persistent store are dropped here.
    fn retry_pending_flush(&self, prefix: &str) {
        if !self.gate.needs_flush(prefix) {
            return;
        }
        let event = if self.gate.is_pending(prefix) {
            "cache_recover"
        } else {
            "cache_reset"
        };
        match self
            .gate
            .retry_pending(prefix, |prefix| self.store.flush_prefix(prefix))
        {
            Ok(_) => debug!(
                "event={event} module=cache status=ok kind={}",
                self.kind_name()
            ),
            Err(err) => warn!(
                "event={event} module=cache status=error kind={} error={err}",
                self.kind_name()
            ),
        }
    }
}

impl<R: Repository> Repository for CachedRepository<R> {
    fn kind(&self) -> &EntityKind {
        self.inner.kind()
    }

    fn find_by_id(&self, id: EntityId, options: &ReadOptions) -> RepoResult<Entity> {
        self.read_through("find_by_id", KeyArgs::new().id(id).options(options), || {
            self.inner.find_by_id(id, options)
        })
    }

    fn find_first(
        &self,
        condition: &Condition,
        options: &ReadOptions,
    ) -> RepoResult<Option<Entity>> {
        let args = KeyArgs::new().condition(condition).options(options);
        self.read_through("find_first", args, || {
            self.inner.find_first(condition, options)
        })
    }

    fn list_all(&self, options: &ReadOptions) -> RepoResult<Vec<Entity>> {
        self.read_through("list_all", KeyArgs::new().options(options), || {
            self.inner.list_all(options)
        })
    }

    fn list_matching(
        &self,
        condition: &Condition,
        options: &ReadOptions,
    ) -> RepoResult<Vec<Entity>> {
        let args = KeyArgs::new().condition(condition).options(options);
        self.read_through("list_matching", args, || {
            self.inner.list_matching(condition, options)
        })
    }

    fn count(&self, condition: &Condition) -> RepoResult<usize> {
        self.read_through("count", KeyArgs::new().condition(condition), || {
            self.inner.count(condition)
        })
    }

    fn pluck(&self, field: &str, key_field: Option<&str>) -> RepoResult<Vec<PluckedValue>> {
        let args = KeyArgs::new()
            .text("field", Some(field))
            .text("key", key_field);
        self.read_through("pluck", args, || self.inner.pluck(field, key_field))
    }

    fn create(&self, attributes: Attributes) -> RepoResult<Entity> {
        self.write_through("create", || self.inner.create(attributes))
    }

    fn create_or_update(&self, upsert: Upsert, condition: &Condition) -> RepoResult<Entity> {
        self.write_through("create_or_update", || {
            self.inner.create_or_update(upsert, condition)
        })
    }

    fn first_or_create(&self, attributes: Attributes) -> RepoResult<Entity> {
        self.write_through("first_or_create", || self.inner.first_or_create(attributes))
    }

    fn insert(&self, rows: Vec<Attributes>) -> RepoResult<usize> {
        self.write_through("insert", || self.inner.insert(rows))
    }

    fn update(&self, condition: &Condition, attributes: Attributes) -> RepoResult<usize> {
        self.write_through("update", || self.inner.update(condition, attributes))
    }

    fn delete(&self, entity: &Entity) -> RepoResult<DeleteOutcome> {
        self.write_through("delete", || self.inner.delete(entity))
    }

    fn delete_matching(&self, condition: &Condition) -> RepoResult<usize> {
        self.write_through("delete_matching", || self.inner.delete_matching(condition))
    }

    fn force_delete_matching(&self, condition: &Condition) -> RepoResult<usize> {
        self.write_through("force_delete_matching", || {
            self.inner.force_delete_matching(condition)
        })
    }

    fn trash_matching(&self, condition: &Condition) -> RepoResult<usize> {
        self.write_through("trash_matching", || self.inner.trash_matching(condition))
    }

    fn restore_matching(&self, condition: &Condition) -> RepoResult<usize> {
        self.write_through("restore_matching", || {
            self.inner.restore_matching(condition)
        })
    }
}
