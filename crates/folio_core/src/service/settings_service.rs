//! Site settings as a key/value facade over the `settings` kind.
//!
//! # Invariants
//! - At most one settings row exists per key (enforced by the kind's unique
//!   `key` field).
//! - `set` never creates a second row for an existing key.

use super::{ServiceError, ServiceResult};
use crate::model::condition::Condition;
use crate::model::field::FieldValue;
use crate::model::kind::EntityKind;
use crate::attributes;
use crate::repo::repository::{ReadOptions, Repository, Upsert};
use log::info;
use std::collections::BTreeMap;

const KEY_FIELD: &str = "key";
const VALUE_FIELD: &str = "value";

pub struct SettingsService<R: Repository> {
    repo: R,
}

impl<R: Repository> SettingsService<R> {
    /// # Errors
    /// - `WrongKind` unless `repo` serves the `settings` kind.
    pub fn new(repo: R) -> ServiceResult<Self> {
        let actual = repo.kind().name;
        if actual != EntityKind::SETTINGS.name {
            return Err(ServiceError::WrongKind {
                expected: EntityKind::SETTINGS.name,
                actual,
            });
        }
        Ok(Self { repo })
    }

    /// Stored value of `key`, `None` when unset.
    pub fn get(&self, key: &str) -> ServiceResult<Option<FieldValue>> {
        let options = ReadOptions::new().fields([VALUE_FIELD]);
        let found = self.repo.find_first(&by_key(key), &options)?;
        Ok(found.map(|entity| entity.field(VALUE_FIELD)))
    }

    pub fn get_or(&self, key: &str, default: impl Into<FieldValue>) -> ServiceResult<FieldValue> {
        Ok(self.get(key)?.unwrap_or_else(|| default.into()))
    }

    /// Creates or overwrites `key`.
    pub fn set(&self, key: &str, value: impl Into<FieldValue>) -> ServiceResult<()> {
        let value: FieldValue = value.into();
        let attributes = attributes! { KEY_FIELD => key, VALUE_FIELD => value };
        let entity = self
            .repo
            .create_or_update(Upsert::Attributes(attributes), &by_key(key))?;
        info!(
            "event=setting_set module=service status=ok id={}",
            entity.id
        );
        Ok(())
    }

    /// Removes `key`; returns whether it existed.
    pub fn forget(&self, key: &str) -> ServiceResult<bool> {
        Ok(self.repo.delete_matching(&by_key(key))? > 0)
    }

    /// Every setting as `key -> value`.
    pub fn all(&self) -> ServiceResult<BTreeMap<String, FieldValue>> {
        let plucked = self.repo.pluck(VALUE_FIELD, Some(KEY_FIELD))?;
        Ok(plucked
            .into_iter()
            .filter_map(|row| match row.key {
                Some(FieldValue::Text(key)) => Some((key, row.value)),
                _ => None,
            })
            .collect())
    }
}

fn by_key(key: &str) -> Condition {
    Condition::all().eq(KEY_FIELD, key)
}
