//! Versioned schema for the record table.
//!
//! Applied versions are tracked in `_migrations`; each pending step runs in
//! its own transaction together with its bookkeeping row.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "create_records_table",
    sql: include_str!("sql/001_create_records.sql"),
}];

/// Highest schema version this build knows how to read.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Brings the schema up to date and returns the resulting version.
pub fn run_all(conn: &Connection) -> Result<u32, DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let found = schema_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(DatabaseError::SchemaTooNew { found, supported });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > found) {
        apply(conn, migration).map_err(|e| DatabaseError::Migration {
            version: migration.version,
            name: migration.name,
            reason: e.to_string(),
        })?;
        log::info!("Applied migration v{} {}", migration.version, migration.name);
    }

    schema_version(conn)
}

fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?)
}

fn apply(conn: &Connection, migration: &Migration) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.name],
    )?;
    tx.commit()
}
