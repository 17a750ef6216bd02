//! SQLite implementation of the repository contract.
//!
//! # Invariants
//! - One instance serves exactly one entity kind for its lifetime.
//! - Write paths validate attribute keys and required fields before SQL.
//! - Read paths reject corrupt persisted attributes instead of masking them.
//! - Relations are resolved against live rows of the target kind only.

use crate::db::{table_exists, DbError};
use crate::model::condition::Condition;
use crate::model::entity::{Entity, EntityId};
use crate::model::field::{
    validate_attribute_keys, validate_field_name, Attributes, FieldValue, ValidationError,
};
use crate::model::kind::{EntityKind, Relation};
use crate::repo::query::{
    build_filter, build_order, field_expr, field_json_expr, RowScope, SqlFilter,
};
use crate::repo::repository::{
    DeleteOutcome, PluckedValue, ReadOptions, RepoError, RepoResult, Repository, Upsert,
};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::{BTreeMap, BTreeSet};

const ENTITY_COLUMNS: &str = "id, attributes, created_at, updated_at, deleted_at";
const NOW_MS_SQL: &str = "(strftime('%s', 'now') * 1000)";

/// SQLite-backed repository bound to one entity kind.
pub struct SqliteRepository<'conn> {
    conn: &'conn Connection,
    kind: EntityKind,
}

impl<'conn> SqliteRepository<'conn> {
    /// Binds a migrated connection to `kind`.
    ///
    /// # Errors
    /// - `Validation` when the kind name is not a plain identifier.
    /// - `StorageUnavailable` when the kind's table is missing.
    pub fn try_new(conn: &'conn Connection, kind: EntityKind) -> RepoResult<Self> {
        validate_field_name(kind.name)?;
        if !table_exists(conn, kind.table())? {
            return Err(DbError::MissingTable(kind.table().to_string()).into());
        }
        Ok(Self { conn, kind })
    }

    fn read(&self, condition: &Condition, options: &ReadOptions) -> RepoResult<Vec<Entity>> {
        self.validate_read(condition, options)?;
        let filter = build_filter(
            &self.kind,
            condition,
            RowScope::from_with_trashed(options.with_trashed),
        )?;
        let order = build_order(&options.order_by)?;
        let mut entities = select_entities(self.conn, &self.kind, &filter, &order, options.limit)?;

        self.attach_related(&mut entities, &options.include)?;
        if !options.selects_all_fields() {
            project(&mut entities, &options.fields);
        }
        Ok(entities)
    }

    fn validate_read(&self, condition: &Condition, options: &ReadOptions) -> RepoResult<()> {
        condition.validate()?;
        for field in options.fields.iter().filter(|field| field.as_str() != "*") {
            validate_field_name(field)?;
        }
        for name in &options.include {
            self.relation(name)?;
        }
        Ok(())
    }

    fn relation(&self, name: &str) -> RepoResult<&'static Relation> {
        self.kind.relation(name).ok_or_else(|| {
            RepoError::Validation(ValidationError::UnknownRelation {
                kind: self.kind.name,
                relation: name.to_string(),
            })
        })
    }

    fn attach_related(&self, entities: &mut [Entity], include: &[String]) -> RepoResult<()> {
        let mut seen = BTreeSet::new();
        for name in include {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let relation = self.relation(name)?;
            let ids: BTreeSet<EntityId> = entities
                .iter()
                .filter_map(|entity| local_key(entity, relation))
                .collect();

            let targets: BTreeMap<EntityId, Entity> = if ids.is_empty() {
                BTreeMap::new()
            } else {
                let condition = Condition::all().is_in("id", ids);
                let filter = build_filter(relation.target, &condition, RowScope::Live)?;
                select_entities(self.conn, relation.target, &filter, "id ASC", None)?
                    .into_iter()
                    .map(|target| (target.id, target))
                    .collect()
            };

            for entity in entities.iter_mut() {
                let related = local_key(entity, relation)
                    .and_then(|id| targets.get(&id))
                    .cloned()
                    .into_iter()
                    .collect();
                entity.related.insert(relation.name.to_string(), related);
            }
        }
        Ok(())
    }

    fn validate_new(&self, attributes: &Attributes) -> RepoResult<()> {
        validate_attribute_keys(attributes)?;
        for field in self.kind.required {
            if attributes.get(*field).map_or(true, FieldValue::is_null) {
                return Err(ValidationError::MissingField {
                    kind: self.kind.name,
                    field: (*field).to_string(),
                }
                .into());
            }
        }
        for field in self.kind.unique {
            let Some(value) = attributes.get(*field).filter(|value| !value.is_null()) else {
                continue;
            };
            let taken: i64 = self.conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE {} IS ?1;",
                    self.kind.table(),
                    field_expr(field)?
                ),
                [value.to_sql_value()],
                |row| row.get(0),
            )?;
            if taken > 0 {
                return Err(ValidationError::Duplicate {
                    kind: self.kind.name,
                    field: (*field).to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn validate_changes(&self, attributes: &Attributes) -> RepoResult<()> {
        validate_attribute_keys(attributes)?;
        for field in self.kind.required {
            if attributes.get(*field).is_some_and(FieldValue::is_null) {
                return Err(ValidationError::MissingField {
                    kind: self.kind.name,
                    field: (*field).to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn insert_row(&self, id: Option<EntityId>, attributes: &Attributes) -> RepoResult<EntityId> {
        let json = encode_attributes(attributes)?;
        match id {
            Some(id) => {
                self.conn.execute(
                    &format!(
                        "INSERT INTO {} (id, attributes, created_at, updated_at)
                         VALUES (?1, ?2, {NOW_MS_SQL}, {NOW_MS_SQL});",
                        self.kind.table()
                    ),
                    params![id, json],
                )?;
                Ok(id)
            }
            None => {
                self.conn.execute(
                    &format!(
                        "INSERT INTO {} (attributes, created_at, updated_at)
                         VALUES (?1, {NOW_MS_SQL}, {NOW_MS_SQL});",
                        self.kind.table()
                    ),
                    [json],
                )?;
                Ok(self.conn.last_insert_rowid())
            }
        }
    }

    fn update_where(&self, filter: &SqlFilter, attributes: &Attributes) -> RepoResult<usize> {
        let mut bind_values = Vec::with_capacity(attributes.len() + filter.params.len());
        let mut assignment = String::from("attributes");
        if !attributes.is_empty() {
            let mut paths = Vec::with_capacity(attributes.len());
            for (field, value) in attributes {
                paths.push(format!("'$.{field}', json(?)"));
                bind_values.push(Value::Text(encode_value(value)?));
            }
            assignment = format!("json_set(attributes, {})", paths.join(", "));
        }
        bind_values.extend(filter.params.iter().cloned());

        let changed = self.conn.execute(
            &format!(
                "UPDATE {} SET attributes = {assignment}, updated_at = {NOW_MS_SQL} WHERE {};",
                self.kind.table(),
                filter.sql
            ),
            params_from_iter(bind_values),
        )?;
        Ok(changed)
    }

    fn load(&self, id: EntityId) -> RepoResult<Entity> {
        self.find_by_id(id, &ReadOptions::new().with_trashed())
    }

    fn find_any_by_id(&self, id: EntityId) -> RepoResult<Option<Entity>> {
        match self.load(id) {
            Ok(entity) => Ok(Some(entity)),
            Err(RepoError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn execute_filtered(&self, statement: &str, filter: &SqlFilter) -> RepoResult<usize> {
        let changed = self.conn.execute(
            &format!("{statement} WHERE {};", filter.sql),
            params_from_iter(filter.params.iter()),
        )?;
        Ok(changed)
    }

    fn log_write(&self, op: &'static str, affected: usize) {
        debug!(
            "event=entity_write module=repo status=ok kind={} op={op} affected={affected}",
            self.kind.name
        );
    }
}

impl Repository for SqliteRepository<'_> {
    fn kind(&self) -> &EntityKind {
        &self.kind
    }

    fn find_by_id(&self, id: EntityId, options: &ReadOptions) -> RepoResult<Entity> {
        let options = ReadOptions {
            limit: Some(1),
            ..options.clone()
        };
        self.read(&Condition::by_id(id), &options)?
            .into_iter()
            .next()
            .ok_or(RepoError::NotFound {
                kind: self.kind.name,
                id,
            })
    }

    fn find_first(
        &self,
        condition: &Condition,
        options: &ReadOptions,
    ) -> RepoResult<Option<Entity>> {
        let options = ReadOptions {
            limit: Some(1),
            ..options.clone()
        };
        Ok(self.read(condition, &options)?.into_iter().next())
    }

    fn list_all(&self, options: &ReadOptions) -> RepoResult<Vec<Entity>> {
        self.read(&Condition::all(), options)
    }

    fn list_matching(
        &self,
        condition: &Condition,
        options: &ReadOptions,
    ) -> RepoResult<Vec<Entity>> {
        self.read(condition, options)
    }

    fn count(&self, condition: &Condition) -> RepoResult<usize> {
        condition.validate()?;
        let filter = build_filter(&self.kind, condition, RowScope::Live)?;
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {};",
                self.kind.table(),
                filter.sql
            ),
            params_from_iter(filter.params.iter()),
            |row| row.get(0),
        )?;
        usize::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count {count}")))
    }

    fn pluck(&self, field: &str, key_field: Option<&str>) -> RepoResult<Vec<PluckedValue>> {
        let value_expr = field_json_expr(field)?;
        let key_expr = key_field.map(field_json_expr).transpose()?;
        let filter = build_filter(&self.kind, &Condition::all(), RowScope::Live)?;
        let sql = format!(
            "SELECT {value_expr}, {} FROM {} WHERE {} ORDER BY id ASC;",
            key_expr.as_deref().unwrap_or("NULL"),
            self.kind.table(),
            filter.sql
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(filter.params.iter()))?;
        let mut plucked = Vec::new();
        while let Some(row) = rows.next()? {
            let value = decode_json_cell(&self.kind, field, row.get(0)?)?;
            let key = match key_field {
                Some(key_field) => Some(decode_json_cell(&self.kind, key_field, row.get(1)?)?),
                None => None,
            };
            plucked.push(PluckedValue { key, value });
        }
        Ok(plucked)
    }

    fn create(&self, attributes: Attributes) -> RepoResult<Entity> {
        self.validate_new(&attributes)?;
        let id = self.insert_row(None, &attributes)?;
        self.log_write("create", 1);
        self.load(id)
    }

    fn create_or_update(&self, upsert: Upsert, condition: &Condition) -> RepoResult<Entity> {
        let (existing, attributes, explicit_id) = match upsert {
            Upsert::Attributes(attributes) => {
                let existing = if condition.is_empty() {
                    None
                } else {
                    self.find_first(condition, &ReadOptions::new())?
                };
                (existing, attributes, None)
            }
            Upsert::Entity(entity) => {
                let existing = if condition.is_empty() {
                    self.find_any_by_id(entity.id)?
                } else {
                    self.find_first(condition, &ReadOptions::new())?
                };
                (existing, entity.attributes, Some(entity.id))
            }
        };

        match existing {
            Some(found) => {
                self.validate_changes(&attributes)?;
                let filter = build_filter(
                    &self.kind,
                    &Condition::by_id(found.id),
                    RowScope::WithTrashed,
                )?;
                self.update_where(&filter, &attributes)?;
                self.log_write("create_or_update.update", 1);
                self.load(found.id)
            }
            None => {
                self.validate_new(&attributes)?;
                let id = self.insert_row(explicit_id, &attributes)?;
                self.log_write("create_or_update.create", 1);
                self.load(id)
            }
        }
    }

    fn first_or_create(&self, attributes: Attributes) -> RepoResult<Entity> {
        validate_attribute_keys(&attributes)?;
        let condition = Condition::from_attributes(&attributes);
        if let Some(found) = self.find_first(&condition, &ReadOptions::new())? {
            return Ok(found);
        }
        self.create(attributes)
    }

    fn insert(&self, rows: Vec<Attributes>) -> RepoResult<usize> {
        for attributes in &rows {
            self.validate_new(attributes)?;
        }

        let tx = self.conn.unchecked_transaction()?;
        for attributes in &rows {
            self.insert_row(None, attributes)?;
        }
        tx.commit()?;

        self.log_write("insert", rows.len());
        Ok(rows.len())
    }

    fn update(&self, condition: &Condition, attributes: Attributes) -> RepoResult<usize> {
        condition.validate()?;
        self.validate_changes(&attributes)?;
        let filter = build_filter(&self.kind, condition, RowScope::Live)?;
        let changed = self.update_where(&filter, &attributes)?;
        self.log_write("update", changed);
        Ok(changed)
    }

    fn delete(&self, entity: &Entity) -> RepoResult<DeleteOutcome> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1;", self.kind.table()),
            [entity.id],
        )?;
        self.log_write("delete", changed);
        if changed == 0 {
            Ok(DeleteOutcome::AlreadyAbsent)
        } else {
            Ok(DeleteOutcome::Deleted)
        }
    }

    fn delete_matching(&self, condition: &Condition) -> RepoResult<usize> {
        let filter = build_filter(&self.kind, condition, RowScope::Live)?;
        let changed =
            self.execute_filtered(&format!("DELETE FROM {}", self.kind.table()), &filter)?;
        self.log_write("delete_matching", changed);
        Ok(changed)
    }

    fn force_delete_matching(&self, condition: &Condition) -> RepoResult<usize> {
        let filter = build_filter(&self.kind, condition, RowScope::WithTrashed)?;
        let changed =
            self.execute_filtered(&format!("DELETE FROM {}", self.kind.table()), &filter)?;
        self.log_write("force_delete_matching", changed);
        Ok(changed)
    }

    fn trash_matching(&self, condition: &Condition) -> RepoResult<usize> {
        if !self.kind.soft_deletes {
            return Err(ValidationError::SoftDeletesUnsupported(self.kind.name).into());
        }
        let filter = build_filter(&self.kind, condition, RowScope::Live)?;
        let changed = self.execute_filtered(
            &format!(
                "UPDATE {} SET deleted_at = {NOW_MS_SQL}, updated_at = {NOW_MS_SQL}",
                self.kind.table()
            ),
            &filter,
        )?;
        self.log_write("trash_matching", changed);
        Ok(changed)
    }

    fn restore_matching(&self, condition: &Condition) -> RepoResult<usize> {
        let filter = build_filter(&self.kind, condition, RowScope::TrashedOnly)?;
        let changed = self.execute_filtered(
            &format!(
                "UPDATE {} SET deleted_at = NULL, updated_at = {NOW_MS_SQL}",
                self.kind.table()
            ),
            &filter,
        )?;
        self.log_write("restore_matching", changed);
        Ok(changed)
    }
}

fn select_entities(
    conn: &Connection,
    kind: &EntityKind,
    filter: &SqlFilter,
    order: &str,
    limit: Option<u32>,
) -> RepoResult<Vec<Entity>> {
    let mut sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM {} WHERE {} ORDER BY {order}",
        kind.table(),
        filter.sql
    );
    let mut bind_values = filter.params.clone();
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut entities = Vec::new();
    while let Some(row) = rows.next()? {
        entities.push(parse_entity_row(kind, row)?);
    }
    Ok(entities)
}

fn parse_entity_row(kind: &EntityKind, row: &Row<'_>) -> RepoResult<Entity> {
    let id: EntityId = row.get(0)?;
    let raw: String = row.get(1)?;
    let attributes: Attributes = serde_json::from_str(&raw).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid attributes for {}#{id}: {err}",
            kind.name
        ))
    })?;

    Ok(Entity {
        id,
        attributes,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
        deleted_at: row.get(4)?,
        related: BTreeMap::new(),
    })
}

fn decode_json_cell(
    kind: &EntityKind,
    field: &str,
    raw: Option<String>,
) -> RepoResult<FieldValue> {
    let Some(raw) = raw else {
        return Ok(FieldValue::Null);
    };
    serde_json::from_str(&raw).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid value of {}.{field}: {err}",
            kind.name
        ))
    })
}

fn project(entities: &mut [Entity], fields: &[String]) {
    for entity in entities {
        entity
            .attributes
            .retain(|field, _| fields.iter().any(|wanted| wanted == field));
    }
}

fn local_key(entity: &Entity, relation: &Relation) -> Option<EntityId> {
    entity
        .get(relation.local_field)
        .and_then(FieldValue::as_integer)
}

fn encode_attributes(attributes: &Attributes) -> RepoResult<String> {
    serde_json::to_string(attributes)
        .map_err(|err| RepoError::InvalidData(format!("attributes are not encodable: {err}")))
}

fn encode_value(value: &FieldValue) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("value is not encodable: {err}")))
}
