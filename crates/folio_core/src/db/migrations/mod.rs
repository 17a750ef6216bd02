//! Schema migrations for the content store.
//!
//! Each migration creates the tables of one group of entity kinds. Versions
//! are tracked through `PRAGMA user_version`; every pending step runs in a
//! single transaction, so a failing step leaves the schema at the version it
//! had before the call.

use crate::db::{table_exists, DbError, DbResult};
use crate::model::kind::EntityKind;
use log::{error, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "content",
        sql: include_str!("0001_content.sql"),
    },
    Migration {
        version: 2,
        name: "site",
        sql: include_str!("0002_site.sql"),
    },
];

/// What one `apply_migrations` call changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    /// Names of the applied steps, oldest first.
    pub applied: Vec<&'static str>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Latest schema version this binary can create.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings the schema up to [`latest_version`].
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database was written by a newer
///   binary.
/// - `Migration` naming the step that failed; nothing is committed then.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<MigrationReport> {
    let from_version = schema_version(conn)?;
    let latest = latest_version();
    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    let mut report = MigrationReport {
        from_version,
        to_version: from_version,
        applied: Vec::new(),
    };
    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > from_version)
        .collect();
    if pending.is_empty() {
        return Ok(report);
    }

    let tx = conn.transaction()?;
    for migration in pending {
        let step = format!(
            "{}\nPRAGMA user_version = {};",
            migration.sql, migration.version
        );
        if let Err(source) = tx.execute_batch(&step) {
            error!(
                "event=db_migrate module=db status=error version={} name={} error={source}",
                migration.version, migration.name
            );
            return Err(DbError::Migration {
                version: migration.version,
                name: migration.name,
                source,
            });
        }
        report.to_version = migration.version;
        report.applied.push(migration.name);
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={} applied={}",
        report.from_version,
        report.to_version,
        report.applied.join(",")
    );
    Ok(report)
}

/// Current `PRAGMA user_version` of the connected database.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Fails with `MissingTable` for the first of `kinds` without a table.
pub fn verify_kind_tables(conn: &Connection, kinds: &[EntityKind]) -> DbResult<()> {
    for kind in kinds {
        if !table_exists(conn, kind.table())? {
            return Err(DbError::MissingTable(kind.table().to_string()));
        }
    }
    Ok(())
}
