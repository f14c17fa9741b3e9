use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;

use super::{RecordKind, StoreBackend};

struct Entry {
    seq: u64,
    body: String,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    records: HashMap<(RecordKind, String), Entry>,
}

/// Process-local backend. Contents are lost on drop.
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryBackend {
    fn put(&self, kind: RecordKind, id: &str, body: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let inner = &mut *guard;
        let key = (kind, id.to_string());
        match inner.records.get_mut(&key) {
            Some(entry) => entry.body = body.to_string(),
            None => {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.records.insert(
                    key,
                    Entry {
                        seq,
                        body: body.to_string(),
                    },
                );
            }
        }
        Ok(())
    }

    fn get(&self, kind: RecordKind, id: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner
            .records
            .get(&(kind, id.to_string()))
            .map(|e| e.body.clone()))
    }

    fn list(&self, kind: RecordKind) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut entries: Vec<&Entry> = inner
            .records
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, entry)| entry)
            .collect();
        entries.sort_by_key(|e| e.seq);
        Ok(entries.into_iter().map(|e| e.body.clone()).collect())
    }

    fn delete(&self, kind: RecordKind, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner.records.remove(&(kind, id.to_string())).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_replace() {
        let backend = MemoryBackend::new();
        backend.put(RecordKind::BatchJob, "a", "1").unwrap();
        backend.put(RecordKind::BatchJob, "a", "2").unwrap();

        assert_eq!(
            backend.get(RecordKind::BatchJob, "a").unwrap().as_deref(),
            Some("2")
        );
        assert_eq!(backend.get(RecordKind::ExtractionResult, "a").unwrap(), None);
    }

    #[test]
    fn test_list_keeps_insertion_order_across_updates() {
        let backend = MemoryBackend::new();
        backend.put(RecordKind::ExtractionResult, "z", "first").unwrap();
        backend.put(RecordKind::ExtractionResult, "a", "second").unwrap();
        backend.put(RecordKind::BatchJob, "m", "other").unwrap();
        backend.put(RecordKind::ExtractionResult, "z", "first-v2").unwrap();

        assert_eq!(
            backend.list(RecordKind::ExtractionResult).unwrap(),
            vec!["first-v2", "second"]
        );
    }

    #[test]
    fn test_delete() {
        let backend = MemoryBackend::new();
        backend.put(RecordKind::BatchJob, "a", "1").unwrap();
        assert!(backend.delete(RecordKind::BatchJob, "a").unwrap());
        assert!(!backend.delete(RecordKind::BatchJob, "a").unwrap());
    }
}
