//! Batch progress broadcaster for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::batch::job::{BatchJob, FileStatus, JobStatus};

/// Snapshot of a batch after one persisted write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgressEvent {
    pub batch_id: String,
    /// File the write concerned; `None` for job-level transitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_status: Option<FileStatus>,
    pub processed_files: usize,
    pub total_files: usize,
    pub progress: u8,
    pub job_status: JobStatus,
    pub timestamp: DateTime<Utc>,
}

impl BatchProgressEvent {
    /// Job-level event.
    pub fn for_job(job: &BatchJob) -> Self {
        Self {
            batch_id: job.id.clone(),
            file_index: None,
            file_name: None,
            file_status: None,
            processed_files: job.processed_files,
            total_files: job.total_files,
            progress: job.progress,
            job_status: job.status,
            timestamp: Utc::now(),
        }
    }

    /// Event for the file at `index`.
    pub fn for_file(job: &BatchJob, index: usize) -> Self {
        let file = job.files.get(index);
        Self {
            file_index: file.map(|_| index),
            file_name: file.map(|f| f.name.clone()),
            file_status: file.map(|f| f.status),
            ..Self::for_job(job)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.job_status.is_terminal()
    }
}

/// Broadcasts batch progress events. Sending never blocks; events are
/// dropped when nobody listens and lagging receivers skip ahead.
#[derive(Clone)]
pub struct BatchProgressBroadcaster {
    sender: Arc<broadcast::Sender<BatchProgressEvent>>,
}

impl BatchProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: BatchProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchProgressEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BatchProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
