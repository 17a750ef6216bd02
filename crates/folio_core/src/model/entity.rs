//! Persisted entity record.
//!
//! # Invariants
//! - `id` is assigned by storage and never reused within one kind.
//! - `deleted_at` is the source of truth for soft-delete state.
//! - `related` is only populated when a read asks for relations.

use super::field::{Attributes, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primary key of an entity within its kind.
pub type EntityId = i64;

/// One persisted record of some entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub attributes: Attributes,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
    /// Set when the entity is soft-deleted (trashed).
    pub deleted_at: Option<i64>,
    /// Relation name to loaded related entities.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub related: BTreeMap<String, Vec<Entity>>,
}

impl Entity {
    /// Returns an attribute value, `None` when the attribute is absent.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.attributes.get(field)
    }

    /// Returns a text attribute.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    /// Returns any field value, including storage-managed columns.
    pub fn field(&self, field: &str) -> FieldValue {
        match field {
            "id" => FieldValue::Integer(self.id),
            "created_at" => FieldValue::Integer(self.created_at),
            "updated_at" => FieldValue::Integer(self.updated_at),
            "deleted_at" => self.deleted_at.into(),
            other => self.get(other).cloned().unwrap_or(FieldValue::Null),
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns the first entity loaded for a belongs-to relation.
    pub fn related_one(&self, relation: &str) -> Option<&Entity> {
        self.related.get(relation).and_then(|items| items.first())
    }
}
