use std::path::Path;

use chrono::{SecondsFormat, Utc};

use crate::db::record_repo::{self, RecordRow};
use crate::db::Database;
use crate::error::StoreError;

use super::{RecordKind, StoreBackend};

/// Durable backend: one row per record in the `records` table.
#[derive(Clone)]
pub struct SqliteBackend {
    db: Database,
}

impl SqliteBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Database::open_in_memory()?))
    }
}

fn now_timestamp() -> String {
    // Fixed-width so lexical order matches time order.
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl StoreBackend for SqliteBackend {
    fn put(&self, kind: RecordKind, id: &str, body: &str) -> Result<(), StoreError> {
        let now = now_timestamp();
        record_repo::upsert(
            &self.db,
            &RecordRow {
                kind: kind.as_str().to_string(),
                id: id.to_string(),
                body: body.to_string(),
                created_at: now.clone(),
                updated_at: now,
            },
        )?;
        Ok(())
    }

    fn get(&self, kind: RecordKind, id: &str) -> Result<Option<String>, StoreError> {
        Ok(record_repo::find(&self.db, kind.as_str(), id)?.map(|row| row.body))
    }

    fn list(&self, kind: RecordKind) -> Result<Vec<String>, StoreError> {
        Ok(record_repo::list(&self.db, kind.as_str())?
            .into_iter()
            .map(|row| row.body)
            .collect())
    }

    fn delete(&self, kind: RecordKind, id: &str) -> Result<bool, StoreError> {
        Ok(record_repo::delete(&self.db, kind.as_str(), id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend
                .put(RecordKind::ExtractionResult, "doc-1", r#"{"text":"a"}"#)
                .unwrap();
        }

        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(
            backend
                .get(RecordKind::ExtractionResult, "doc-1")
                .unwrap()
                .as_deref(),
            Some(r#"{"text":"a"}"#)
        );
        assert_eq!(backend.list(RecordKind::BatchJob).unwrap().len(), 0);
    }

    #[test]
    fn test_put_replaces_whole_record() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.put(RecordKind::BatchJob, "j", "v1").unwrap();
        backend.put(RecordKind::BatchJob, "j", "v2").unwrap();

        assert_eq!(backend.list(RecordKind::BatchJob).unwrap(), vec!["v2"]);
        assert!(backend.delete(RecordKind::BatchJob, "j").unwrap());
        assert_eq!(backend.get(RecordKind::BatchJob, "j").unwrap(), None);
    }
}
