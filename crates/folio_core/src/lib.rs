//! Storage core for the Folio CMS.
//!
//! Entities of every kind go through one [`Repository`] contract. A
//! [`RepositoryProvider`] decides once whether consumers get SQLite-backed
//! repositories directly or wrapped in the read-through [`CachedRepository`].

pub mod cache;
pub mod compose;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use cache::decorator::{CacheHealth, CachedRepository};
pub use cache::gate::InvalidationGate;
pub use cache::keys::{CacheKeyEncoder, KeyArgs};
pub use cache::sqlite_store::SqliteCacheStore;
pub use cache::store::{CacheError, CacheResult, CacheStore, MemoryCacheStore};
pub use compose::RepositoryProvider;
pub use config::{CacheConfig, ConfigError, CoreConfig, LoggingConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::condition::{Clause, Condition, Predicate};
pub use model::entity::{Entity, EntityId};
pub use model::field::{Attributes, FieldValue, ValidationError};
pub use model::kind::{EntityKind, Relation};
pub use repo::repository::{
    DeleteOutcome, OrderBy, PluckedValue, ReadOptions, RepoError, RepoResult, Repository, Upsert,
};
pub use repo::sqlite_repo::SqliteRepository;
pub use service::content_service::{ContentService, ContentStatus};
pub use service::settings_service::SettingsService;
pub use service::{ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
