//! Result store: the single source of truth for extraction results and
//! batch jobs.
//!
//! Each record is one JSON document, written whole. Job updates are
//! read-modify-write under a per-job lock so a progress write and a
//! cancellation can never interleave into a torn record.

pub mod memory;
pub mod sqlite;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::batch::job::{BatchJob, JobStatus};
use crate::config::schema::{StoreBackendKind, StoreConfig};
use crate::error::{BatchError, StoreError};
use crate::model::ExtractionResult;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

const INTERRUPTED_MESSAGE: &str = "Processing was interrupted before this file finished";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    BatchJob,
    ExtractionResult,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::BatchJob => "batch_job",
            RecordKind::ExtractionResult => "extraction_result",
        }
    }
}

/// Persistence adapter. Implementations store opaque JSON bodies and must
/// make each `put` visible atomically.
pub trait StoreBackend: Send + Sync {
    fn put(&self, kind: RecordKind, id: &str, body: &str) -> Result<(), StoreError>;

    fn get(&self, kind: RecordKind, id: &str) -> Result<Option<String>, StoreError>;

    /// All bodies of a kind, in first-insertion order.
    fn list(&self, kind: RecordKind) -> Result<Vec<String>, StoreError>;

    /// Returns whether a record was removed.
    fn delete(&self, kind: RecordKind, id: &str) -> Result<bool, StoreError>;
}

/// Typed access over a [`StoreBackend`]. Cloning shares the backend.
#[derive(Clone)]
pub struct ResultStore {
    backend: Arc<dyn StoreBackend>,
    job_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ResultStore {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend,
            job_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let backend: Arc<dyn StoreBackend> = match config.backend {
            StoreBackendKind::Memory => Arc::new(MemoryBackend::new()),
            StoreBackendKind::Sqlite => Arc::new(SqliteBackend::open(&config.sqlite_path())?),
        };
        Ok(Self::new(backend))
    }

    // ─── Extraction results ────────────────────────────────────────────────

    /// Stores a result, replacing any previous extraction of the document.
    pub fn put_result(&self, result: &ExtractionResult) -> Result<(), StoreError> {
        self.put(RecordKind::ExtractionResult, &result.document_id, result)
    }

    pub fn get_result(&self, document_id: &str) -> Result<ExtractionResult, StoreError> {
        self.get(RecordKind::ExtractionResult, document_id)?
            .ok_or_else(|| StoreError::DocumentNotFound(document_id.to_string()))
    }

    pub fn list_results(&self) -> Result<Vec<ExtractionResult>, StoreError> {
        self.list(RecordKind::ExtractionResult)
    }

    pub fn delete_result(&self, document_id: &str) -> Result<(), StoreError> {
        if self
            .backend
            .delete(RecordKind::ExtractionResult, document_id)?
        {
            Ok(())
        } else {
            Err(StoreError::DocumentNotFound(document_id.to_string()))
        }
    }

    // ─── Batch jobs ────────────────────────────────────────────────────────

    pub fn put_job(&self, job: &BatchJob) -> Result<(), StoreError> {
        self.with_job_lock(&job.id, || self.put(RecordKind::BatchJob, &job.id, job))
    }

    pub fn get_job(&self, job_id: &str) -> Result<BatchJob, StoreError> {
        self.get(RecordKind::BatchJob, job_id)?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }

    pub fn list_jobs(&self) -> Result<Vec<BatchJob>, StoreError> {
        self.list(RecordKind::BatchJob)
    }

    pub fn delete_job(&self, job_id: &str) -> Result<(), StoreError> {
        let removed =
            self.with_job_lock(job_id, || self.backend.delete(RecordKind::BatchJob, job_id))?;
        if removed {
            Ok(())
        } else {
            Err(StoreError::JobNotFound(job_id.to_string()))
        }
    }

    /// Loads a job, applies `f` and writes it back, all under the job's lock.
    ///
    /// Nothing is written when `f` fails. Returns the stored version.
    pub fn update_job<F>(&self, job_id: &str, f: F) -> Result<BatchJob, BatchError>
    where
        F: FnOnce(&mut BatchJob) -> Result<(), BatchError>,
    {
        self.with_job_lock(job_id, || {
            let mut job = self.get_job(job_id)?;
            f(&mut job)?;
            self.put(RecordKind::BatchJob, job_id, &job)?;
            Ok(job)
        })
    }

    /// Settles every job left unfinished by a previous process.
    ///
    /// Nothing drives those jobs any more, so without this they would report
    /// `processing` forever. Returns how many jobs were changed.
    pub fn recover_interrupted_jobs(&self) -> Result<usize, BatchError> {
        let mut recovered = 0;
        for job in self.list_jobs()? {
            if job.status == JobStatus::Completed || job.status == JobStatus::Error {
                continue;
            }
            let mut changed = false;
            self.update_job(&job.id, |job| {
                changed = job.recover_interrupted(INTERRUPTED_MESSAGE);
                Ok(())
            })?;
            if changed {
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    /// Runs `f` while holding the job's lock, then drops the lock entry if
    /// nobody else is waiting on it.
    fn with_job_lock<T, E, F>(&self, job_id: &str, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce() -> Result<T, E>,
    {
        let lock = self.job_lock(job_id)?;
        let outcome = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(StoreError::LockPoisoned.into()),
        };
        self.release_job_lock(job_id, lock);
        outcome
    }

    fn job_lock(&self, job_id: &str) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self.job_locks.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(locks.entry(job_id.to_string()).or_default().clone())
    }

    // Clones are only handed out under the map lock, so a count of one here
    // means no other caller holds or waits on this entry.
    fn release_job_lock(&self, job_id: &str, lock: Arc<Mutex<()>>) {
        let Ok(mut locks) = self.job_locks.lock() else {
            return;
        };
        drop(lock);
        if locks
            .get(job_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(job_id);
        }
    }

    // ─── Serialization ─────────────────────────────────────────────────────

    fn put<T: Serialize>(&self, kind: RecordKind, id: &str, value: &T) -> Result<(), StoreError> {
        let body = serde_json::to_string(value)?;
        self.backend.put(kind, id, &body)
    }

    fn get<T: DeserializeOwned>(&self, kind: RecordKind, id: &str) -> Result<Option<T>, StoreError> {
        self.backend
            .get(kind, id)?
            .map(|body| serde_json::from_str(&body))
            .transpose()
            .map_err(StoreError::from)
    }

    fn list<T: DeserializeOwned>(&self, kind: RecordKind) -> Result<Vec<T>, StoreError> {
        self.backend
            .list(kind)?
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }
}
