//! Publishing workflow for trashable content kinds (pages, posts, ...).
//!
//! # Invariants
//! - New content always starts as a draft.
//! - Status changes only touch live entities; trashed ones must be restored
//!   first.

use super::{ServiceError, ServiceResult};
use crate::model::condition::Condition;
use crate::model::entity::{Entity, EntityId};
use crate::model::field::{Attributes, FieldValue};
use crate::attributes;
use crate::repo::repository::{ReadOptions, Repository};
use log::info;

const STATUS_FIELD: &str = "status";

/// Publication state stored in the `status` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStatus {
    Draft,
    Published,
}

impl ContentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    /// Status of `entity`; anything unrecognized counts as a draft.
    pub fn of(entity: &Entity) -> Self {
        match entity.text(STATUS_FIELD) {
            Some("published") => Self::Published,
            _ => Self::Draft,
        }
    }
}

pub struct ContentService<R: Repository> {
    repo: R,
}

impl<R: Repository> ContentService<R> {
    /// # Errors
    /// - `WrongKind` when the repository's kind cannot be trashed.
    pub fn new(repo: R) -> ServiceResult<Self> {
        let kind = repo.kind();
        if !kind.soft_deletes {
            return Err(ServiceError::WrongKind {
                expected: "soft-deleting content kind",
                actual: kind.name,
            });
        }
        Ok(Self { repo })
    }

    /// Creates a draft; a caller-supplied `status` is overridden.
    pub fn create_draft(&self, mut attributes: Attributes) -> ServiceResult<Entity> {
        attributes.insert(
            STATUS_FIELD.to_string(),
            FieldValue::from(ContentStatus::Draft.as_str()),
        );
        let entity = self.repo.create(attributes)?;
        info!(
            "event=content_create module=service status=ok kind={} id={}",
            self.repo.kind().name,
            entity.id
        );
        Ok(entity)
    }

    pub fn publish(&self, id: EntityId) -> ServiceResult<Entity> {
        self.set_status(id, ContentStatus::Published)
    }

    pub fn unpublish(&self, id: EntityId) -> ServiceResult<Entity> {
        self.set_status(id, ContentStatus::Draft)
    }

    /// Live published entities, shaped by `options`.
    pub fn published(&self, options: &ReadOptions) -> ServiceResult<Vec<Entity>> {
        let condition = Condition::all().eq(STATUS_FIELD, ContentStatus::Published.as_str());
        Ok(self.repo.list_matching(&condition, options)?)
    }

    /// Moves a live entity to the trash; returns whether anything moved.
    pub fn trash(&self, id: EntityId) -> ServiceResult<bool> {
        Ok(self.repo.trash_matching(&Condition::by_id(id))? > 0)
    }

    /// Brings a trashed entity back; returns whether anything was restored.
    pub fn restore(&self, id: EntityId) -> ServiceResult<bool> {
        Ok(self.repo.restore_matching(&Condition::by_id(id))? > 0)
    }

    pub fn get(&self, id: EntityId) -> ServiceResult<Entity> {
        Ok(self.repo.find_by_id(id, &ReadOptions::new())?)
    }

    fn set_status(&self, id: EntityId, status: ContentStatus) -> ServiceResult<Entity> {
        let changed = self.repo.update(
            &Condition::by_id(id),
            attributes! { STATUS_FIELD => status.as_str() },
        )?;
        if changed == 0 {
            return Err(ServiceError::NotFound {
                kind: self.repo.kind().name,
                id,
            });
        }
        info!(
            "event=content_status module=service status=ok kind={} id={id} to={}",
            self.repo.kind().name,
            status.as_str()
        );
        self.get(id)
    }
}
