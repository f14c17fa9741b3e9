use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument};

use crate::broadcast::{BatchProgressBroadcaster, BatchProgressEvent};
use crate::error::{BatchError, ErrorKind, StoreError};
use crate::store::ResultStore;

use super::job::{BatchFile, BatchJob, FileResultRef, FileStatus, JobStatus};
use super::processor::FileProcessor;

/// One file of a submission: where it is and what the caller called it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub path: PathBuf,
    pub original_name: Option<String>,
}

impl FileSpec {
    pub fn new(path: impl Into<PathBuf>, original_name: Option<&str>) -> Self {
        Self {
            path: path.into(),
            original_name: original_name.map(str::to_string),
        }
    }

    fn into_batch_file(self) -> BatchFile {
        let name = self.original_name.unwrap_or_else(|| {
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string()
        });
        BatchFile::pending(self.path, name)
    }
}

/// Runs batch jobs: one task per job, files in order within a job.
///
/// Submission only persists the job and spawns its task, so status can be
/// polled as soon as `submit` returns. Must be used inside a tokio runtime.
#[derive(Clone)]
pub struct BatchOrchestrator {
    store: ResultStore,
    processor: Arc<dyn FileProcessor>,
    broadcaster: BatchProgressBroadcaster,
    job_slots: Arc<Semaphore>,
    default_timeout: Duration,
    handles: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl BatchOrchestrator {
    pub fn new(
        store: ResultStore,
        processor: Arc<dyn FileProcessor>,
        broadcaster: BatchProgressBroadcaster,
        max_concurrent_jobs: usize,
        default_timeout: Duration,
    ) -> Self {
        Self {
            store,
            processor,
            broadcaster,
            job_slots: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            default_timeout,
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn broadcaster(&self) -> &BatchProgressBroadcaster {
        &self.broadcaster
    }

    /// Creates the job record and schedules processing. Returns the job id.
    pub fn submit(
        &self,
        files: Vec<FileSpec>,
        timeout: Option<Duration>,
    ) -> Result<String, BatchError> {
        let files: Vec<BatchFile> = files.into_iter().map(FileSpec::into_batch_file).collect();
        let job = BatchJob::new(uuid::Uuid::new_v4().to_string(), files)?;
        let job_id = job.id.clone();

        self.store.put_job(&job)?;
        self.broadcaster.send(BatchProgressEvent::for_job(&job));
        info!("Batch {} created with {} files", job_id, job.total_files);

        let run = JobRun {
            job_id: job_id.clone(),
            store: self.store.clone(),
            processor: Arc::clone(&self.processor),
            broadcaster: self.broadcaster.clone(),
            timeout: timeout.unwrap_or(self.default_timeout),
        };
        let slots = Arc::clone(&self.job_slots);
        let span = info_span!("batch", batch_id = %job_id);

        let handle = tokio::spawn(
            async move {
                let Ok(_permit) = slots.acquire_owned().await else {
                    error!("Job slots closed before batch could start");
                    return;
                };
                if let Err(e) = run.execute().await {
                    error!("Batch stopped: {}", e);
                    run.mark_aborted().await;
                }
            }
            .instrument(span),
        );

        if let Ok(mut handles) = self.handles.lock() {
            handles.retain(|_, h| !h.is_finished());
            handles.insert(job_id.clone(), handle);
        }

        Ok(job_id)
    }

    /// Requests cancellation. Files not yet started stay `pending`.
    pub fn cancel(&self, job_id: &str) -> Result<BatchJob, BatchError> {
        let job = self.store.update_job(job_id, |job| job.cancel())?;
        info!("Batch {} cancelled", job_id);
        self.broadcaster.send(BatchProgressEvent::for_job(&job));
        Ok(job)
    }

    pub fn status(&self, job_id: &str) -> Result<BatchJob, StoreError> {
        self.store.get_job(job_id)
    }

    /// Waits for the job's task to end and returns the final record.
    pub async fn wait(&self, job_id: &str) -> Result<BatchJob, StoreError> {
        let handle = self
            .handles
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .remove(job_id);

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Batch task {} ended abnormally: {}", job_id, e);
            }
        }
        self.store.get_job(job_id)
    }
}

/// State moved into a job's task.
struct JobRun {
    job_id: String,
    store: ResultStore,
    processor: Arc<dyn FileProcessor>,
    broadcaster: BatchProgressBroadcaster,
    timeout: Duration,
}

impl JobRun {
    async fn execute(&self) -> Result<(), BatchError> {
        let job = self
            .update(None, |job| match job.status {
                JobStatus::Created => job.start(),
                // Cancelled while queued for a slot.
                _ => Ok(()),
            })
            .await?;
        if job.status != JobStatus::Processing {
            info!("Batch {} not started: {}", self.job_id, job.status);
            return Ok(());
        }

        for index in 0..job.total_files {
            let job = self
                .update(Some(index), move |job| {
                    if job.status == JobStatus::Processing {
                        job.begin_file(index)
                    } else {
                        Ok(())
                    }
                })
                .await?;
            if job.file_status(index) != Some(FileStatus::Processing) {
                info!(
                    "Batch {} stopped before file {} ({})",
                    self.job_id,
                    index + 1,
                    job.status
                );
                return Ok(());
            }

            let file = job.files[index].clone();
            self.process_file(index, &file).await?;
        }

        let job = self
            .update(None, |job| match job.status {
                JobStatus::Processing => job.finish(),
                _ => Ok(()),
            })
            .await?;
        info!(
            "Batch {} {}: {} processed, {} errors",
            self.job_id,
            job.status,
            job.processed_files,
            job.errors.len()
        );
        Ok(())
    }

    async fn process_file(&self, index: usize, file: &BatchFile) -> Result<(), BatchError> {
        let span = info_span!("file", index, name = %file.name);
        let outcome = self
            .processor
            .process(file, self.timeout)
            .instrument(span)
            .await;

        let recorded = match outcome {
            Ok(result) => match self.store.put_result(&result) {
                Ok(()) => {
                    debug!("Stored result {} for {}", result.document_id, file.name);
                    let reference = FileResultRef::from(&result);
                    self.update(Some(index), move |job| job.complete_file(index, reference))
                        .await
                }
                Err(e) => {
                    error!("Failed to store result for {}: {}", file.name, e);
                    let message = e.to_string();
                    self.update(Some(index), move |job| {
                        job.fail_file(index, ErrorKind::Internal, message)
                    })
                    .await
                }
            },
            Err(e) => {
                info!("File {} failed ({}): {}", file.name, e.kind(), e);
                let message = e.to_string();
                let kind = e.kind();
                self.update(Some(index), move |job| job.fail_file(index, kind, message))
                    .await
            }
        };

        recorded.map(|_| ())
    }

    /// Read-modify-write of the job, followed by a progress event.
    ///
    /// The store write blocks on a mutex and possibly on SQLite, so it runs on
    /// the blocking pool.
    async fn update<F>(&self, index: Option<usize>, f: F) -> Result<BatchJob, BatchError>
    where
        F: FnOnce(&mut BatchJob) -> Result<(), BatchError> + Send + 'static,
    {
        let store = self.store.clone();
        let job_id = self.job_id.clone();
        let job = tokio::task::spawn_blocking(move || store.update_job(&job_id, f))
            .await
            .map_err(|e| BatchError::TaskFailed(e.to_string()))??;
        let event = match index {
            Some(index) => BatchProgressEvent::for_file(&job, index),
            None => BatchProgressEvent::for_job(&job),
        };
        self.broadcaster.send(event);
        Ok(job)
    }

    /// Moves a job the loop could not drive any further to `error`.
    async fn mark_aborted(&self) {
        match self.update(None, |job| job.abort()).await {
            Ok(_) => {}
            Err(BatchError::InvalidTransition { .. }) => {}
            Err(e) => error!("Failed to mark batch {} as failed: {}", self.job_id, e),
        }
    }
}
