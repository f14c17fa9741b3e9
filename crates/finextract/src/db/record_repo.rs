//! Record repository: JSON documents in the `records` table, keyed by
//! `(kind, id)`.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw record row. `body` holds the serialized JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub kind: String,
    pub id: String,
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            kind: row.get("kind")?,
            id: row.get("id")?,
            body: row.get("body")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts or replaces a record. `created_at` of an existing row is kept.
pub fn upsert(db: &Database, record: &RecordRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO records (kind, id, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(kind, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![
                record.kind,
                record.id,
                record.body,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find(db: &Database, kind: &str, id: &str) -> Result<Option<RecordRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM records WHERE kind = ?1 AND id = ?2",
                params![kind, id],
                RecordRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// All records of a kind, oldest first.
pub fn list(db: &Database, kind: &str) -> Result<Vec<RecordRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM records WHERE kind = ?1 ORDER BY created_at ASC, id ASC")?;
        let rows = stmt
            .query_map(params![kind], RecordRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes a record, returning whether a row existed.
pub fn delete(db: &Database, kind: &str, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "DELETE FROM records WHERE kind = ?1 AND id = ?2",
            params![kind, id],
        )?;
        Ok(affected > 0)
    })
}
