//! Generic repository contract shared by every entity kind.
//!
//! # Responsibility
//! - Define the CRUD operation set consumers depend on.
//! - Define the error taxonomy repositories report.
//!
//! # Invariants
//! - `NotFound` is only reported by id lookups.
//! - Deleting an absent entity is a successful no-op.
//! - Storage failures are always propagated, never swallowed.

use crate::db::DbError;
use crate::model::condition::Condition;
use crate::model::entity::{Entity, EntityId};
use crate::model::field::{Attributes, FieldValue, ValidationError};
use crate::model::kind::EntityKind;
use rusqlite::ErrorCode;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error taxonomy.
#[derive(Debug)]
pub enum RepoError {
    NotFound { kind: &'static str, id: EntityId },
    Validation(ValidationError),
    StorageUnavailable(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, id } => write!(f, "{kind} entity not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::StorageUnavailable(err) => write!(f, "storage unavailable: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::StorageUnavailable(err) => Some(err),
            Self::NotFound { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::StorageUnavailable(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match value.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => {
                Self::Validation(ValidationError::Constraint(value.to_string()))
            }
            _ => Self::StorageUnavailable(DbError::Sqlite(value)),
        }
    }
}

/// Ordering term for list reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// Shape of a read: relations, projection, visibility, ordering, limit.
///
/// The default reads every attribute of live entities in storage order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Relation names to load into `Entity::related`.
    pub include: Vec<String>,
    /// Attribute projection; empty or `*` selects every attribute.
    pub fields: Vec<String>,
    /// Also return soft-deleted entities.
    pub with_trashed: bool,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u32>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, relation: impl Into<String>) -> Self {
        self.include.push(relation.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_trashed(mut self) -> Self {
        self.with_trashed = true;
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn selects_all_fields(&self) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|field| field == "*")
    }
}

/// Input of `create_or_update`.
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    /// Matched by its own id when no condition is given; keeps its id on create.
    Entity(Entity),
    Attributes(Attributes),
}

/// Outcome of deleting one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

/// One row of a `pluck` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluckedValue {
    pub key: Option<FieldValue>,
    pub value: FieldValue,
}

/// CRUD contract over one entity kind.
///
/// Implemented by the SQLite repository and by the cache decorator; callers
/// cannot tell them apart.
pub trait Repository {
    /// Kind this repository is bound to.
    fn kind(&self) -> &EntityKind;

    fn find_by_id(&self, id: EntityId, options: &ReadOptions) -> RepoResult<Entity>;
    fn find_first(&self, condition: &Condition, options: &ReadOptions)
        -> RepoResult<Option<Entity>>;
    fn list_all(&self, options: &ReadOptions) -> RepoResult<Vec<Entity>>;
    fn list_matching(&self, condition: &Condition, options: &ReadOptions)
        -> RepoResult<Vec<Entity>>;
    fn count(&self, condition: &Condition) -> RepoResult<usize>;
    fn pluck(&self, field: &str, key_field: Option<&str>) -> RepoResult<Vec<PluckedValue>>;

    fn create(&self, attributes: Attributes) -> RepoResult<Entity>;
    fn create_or_update(&self, upsert: Upsert, condition: &Condition) -> RepoResult<Entity>;
    fn first_or_create(&self, attributes: Attributes) -> RepoResult<Entity>;
    /// Inserts all rows atomically; returns the number inserted.
    fn insert(&self, rows: Vec<Attributes>) -> RepoResult<usize>;
    /// Merges `attributes` into every live match; returns the count changed.
    fn update(&self, condition: &Condition, attributes: Attributes) -> RepoResult<usize>;
    /// Hard-deletes one entity.
    fn delete(&self, entity: &Entity) -> RepoResult<DeleteOutcome>;
    /// Hard-deletes live matches.
    fn delete_matching(&self, condition: &Condition) -> RepoResult<usize>;
    /// Hard-deletes matches including trashed ones.
    fn force_delete_matching(&self, condition: &Condition) -> RepoResult<usize>;
    /// Soft-deletes live matches.
    fn trash_matching(&self, condition: &Condition) -> RepoResult<usize>;
    /// Clears the soft-delete marker of trashed matches.
    fn restore_matching(&self, condition: &Condition) -> RepoResult<usize>;
}

macro_rules! forward_repository {
    ($($target:ty),+) => {$(
        impl<R: Repository + ?Sized> Repository for $target {
            fn kind(&self) -> &EntityKind {
                (**self).kind()
            }

            fn find_by_id(&self, id: EntityId, options: &ReadOptions) -> RepoResult<Entity> {
                (**self).find_by_id(id, options)
            }

            fn find_first(
                &self,
                condition: &Condition,
                options: &ReadOptions,
            ) -> RepoResult<Option<Entity>> {
                (**self).find_first(condition, options)
            }

            fn list_all(&self, options: &ReadOptions) -> RepoResult<Vec<Entity>> {
                (**self).list_all(options)
            }

            fn list_matching(
                &self,
                condition: &Condition,
                options: &ReadOptions,
            ) -> RepoResult<Vec<Entity>> {
                (**self).list_matching(condition, options)
            }

            fn count(&self, condition: &Condition) -> RepoResult<usize> {
                (**self).count(condition)
            }

            fn pluck(&self, field: &str, key_field: Option<&str>) -> RepoResult<Vec<PluckedValue>> {
                (**self).pluck(field, key_field)
            }

            fn create(&self, attributes: Attributes) -> RepoResult<Entity> {
                (**self).create(attributes)
            }

            fn create_or_update(&self, upsert: Upsert, condition: &Condition) -> RepoResult<Entity> {
                (**self).create_or_update(upsert, condition)
            }

            fn first_or_create(&self, attributes: Attributes) -> RepoResult<Entity> {
                (**self).first_or_create(attributes)
            }

            fn insert(&self, rows: Vec<Attributes>) -> RepoResult<usize> {
                (**self).insert(rows)
            }

            fn update(&self, condition: &Condition, attributes: Attributes) -> RepoResult<usize> {
                (**self).update(condition, attributes)
            }

            fn delete(&self, entity: &Entity) -> RepoResult<DeleteOutcome> {
                (**self).delete(entity)
            }

            fn delete_matching(&self, condition: &Condition) -> RepoResult<usize> {
                (**self).delete_matching(condition)
            }

            fn force_delete_matching(&self, condition: &Condition) -> RepoResult<usize> {
                (**self).force_delete_matching(condition)
            }

            fn trash_matching(&self, condition: &Condition) -> RepoResult<usize> {
                (**self).trash_matching(condition)
            }

            fn restore_matching(&self, condition: &Condition) -> RepoResult<usize> {
                (**self).restore_matching(condition)
            }
        }
    )+};
}

forward_repository!(&R, Box<R>);
