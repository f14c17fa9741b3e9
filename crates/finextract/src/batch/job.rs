//! Batch job record and its state machine.
//!
//! Job: `created -> processing -> {completed | error | cancelled}`.
//! File: `pending -> processing -> {completed | error}`.
//! Every transition goes through a method here so the invariants on
//! `processed_files` and `progress` hold for every persisted version.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BatchError, ErrorKind};
use crate::model::ExtractionResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Created => write!(f, "created"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Error => write!(f, "error"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl FileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Error)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Pending => write!(f, "pending"),
            FileStatus::Processing => write!(f, "processing"),
            FileStatus::Completed => write!(f, "completed"),
            FileStatus::Error => write!(f, "error"),
        }
    }
}

/// Pointer from a file entry to its stored extraction result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResultRef {
    pub document_id: String,
    pub security_count: usize,
    pub total_value: Option<f64>,
    pub degraded: bool,
}

impl From<&ExtractionResult> for FileResultRef {
    fn from(result: &ExtractionResult) -> Self {
        Self {
            document_id: result.document_id.clone(),
            security_count: result.securities.len(),
            total_value: result.summary.as_ref().and_then(|s| s.total_value),
            degraded: result.degraded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFile {
    pub path: PathBuf,
    pub name: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<FileResultRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchFile {
    pub fn pending(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            status: FileStatus::Pending,
            result: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileError {
    pub file_name: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    pub id: String,
    pub status: JobStatus,
    pub files: Vec<BatchFile>,
    pub total_files: usize,
    pub processed_files: usize,
    /// `round(100 * processed_files / total_files)`.
    pub progress: u8,
    /// Document ids of stored results, in completion order.
    pub results: Vec<String>,
    pub errors: Vec<FileError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Integer percentage rounded half up.
pub fn progress_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let processed = processed.min(total);
    ((200 * processed + total) / (2 * total)) as u8
}

impl BatchJob {
    pub fn new(id: impl Into<String>, files: Vec<BatchFile>) -> Result<Self, BatchError> {
        if files.is_empty() {
            return Err(BatchError::EmptyFileList);
        }

        let now = Utc::now();
        Ok(Self {
            id: id.into(),
            status: JobStatus::Created,
            total_files: files.len(),
            files,
            processed_files: 0,
            progress: 0,
            results: Vec::new(),
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn start(&mut self) -> Result<(), BatchError> {
        self.transition(JobStatus::Created, JobStatus::Processing)
    }

    /// Marks all files done. Fails while any file is still open.
    pub fn finish(&mut self) -> Result<(), BatchError> {
        if let Some(open) = self.files.iter().find(|f| !f.status.is_terminal()) {
            return Err(self.invalid(&format!("file '{}'", open.name), open.status, "finished"));
        }
        self.transition(JobStatus::Processing, JobStatus::Completed)
    }

    /// Stops the job from starting further files. A file already
    /// processing may still record its outcome.
    pub fn cancel(&mut self) -> Result<(), BatchError> {
        if self.status.is_terminal() {
            return Err(self.invalid("job", self.status, JobStatus::Cancelled));
        }
        self.status = JobStatus::Cancelled;
        self.touch();
        Ok(())
    }

    /// Marks the job as failed outright, for errors outside any single file.
    pub fn abort(&mut self) -> Result<(), BatchError> {
        if self.status.is_terminal() {
            return Err(self.invalid("job", self.status, JobStatus::Error));
        }
        self.status = JobStatus::Error;
        self.touch();
        Ok(())
    }

    /// Settles a job whose run ended with the process that drove it.
    ///
    /// A `created` or `processing` job moves to `error` with every unfinished
    /// file failed. A `cancelled` job keeps its status and only fails the file
    /// that was in flight; its pending files stay pending. Returns whether
    /// anything changed.
    pub fn recover_interrupted(&mut self, message: &str) -> bool {
        let fail_pending = match self.status {
            JobStatus::Created | JobStatus::Processing => true,
            JobStatus::Cancelled => false,
            JobStatus::Completed | JobStatus::Error => return false,
        };

        let mut changed = false;
        for index in 0..self.files.len() {
            let file = &mut self.files[index];
            let unfinished = match file.status {
                FileStatus::Processing => true,
                FileStatus::Pending => fail_pending,
                FileStatus::Completed | FileStatus::Error => false,
            };
            if !unfinished {
                continue;
            }
            file.status = FileStatus::Error;
            file.error = Some(message.to_string());
            self.errors.push(FileError {
                file_name: file.name.clone(),
                kind: ErrorKind::Internal,
                message: message.to_string(),
            });
            self.record_processed();
            changed = true;
        }

        if fail_pending {
            self.status = JobStatus::Error;
            changed = true;
        }
        if changed {
            self.touch();
        }
        changed
    }

    pub fn begin_file(&mut self, index: usize) -> Result<(), BatchError> {
        if self.status != JobStatus::Processing {
            return Err(self.invalid("job", self.status, "file start"));
        }
        self.file_transition(index, FileStatus::Pending, FileStatus::Processing)?;
        self.touch();
        Ok(())
    }

    pub fn complete_file(&mut self, index: usize, result: FileResultRef) -> Result<(), BatchError> {
        self.ensure_accepts_outcome()?;
        self.file_transition(index, FileStatus::Processing, FileStatus::Completed)?;
        self.results.push(result.document_id.clone());
        self.files[index].result = Some(result);
        self.record_processed();
        Ok(())
    }

    pub fn fail_file(
        &mut self,
        index: usize,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Result<(), BatchError> {
        self.ensure_accepts_outcome()?;
        self.file_transition(index, FileStatus::Processing, FileStatus::Error)?;
        let message = message.into();
        self.errors.push(FileError {
            file_name: self.files[index].name.clone(),
            kind,
            message: message.clone(),
        });
        self.files[index].error = Some(message);
        self.record_processed();
        Ok(())
    }

    pub fn file_status(&self, index: usize) -> Option<FileStatus> {
        self.files.get(index).map(|f| f.status)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn ensure_accepts_outcome(&self) -> Result<(), BatchError> {
        match self.status {
            JobStatus::Processing | JobStatus::Cancelled => Ok(()),
            other => Err(self.invalid("job", other, "file outcome")),
        }
    }

    fn record_processed(&mut self) {
        self.processed_files += 1;
        self.progress = progress_percent(self.processed_files, self.total_files);
        self.touch();
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> Result<(), BatchError> {
        if self.status != from {
            return Err(self.invalid("job", self.status, to));
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    fn file_transition(
        &mut self,
        index: usize,
        from: FileStatus,
        to: FileStatus,
    ) -> Result<(), BatchError> {
        let total = self.files.len();
        let file = self
            .files
            .get_mut(index)
            .ok_or(BatchError::FileIndexOutOfRange { index, total })?;
        if file.status != from {
            return Err(BatchError::InvalidTransition {
                subject: format!("file '{}'", file.name),
                from: file.status.to_string(),
                to: to.to_string(),
            });
        }
        file.status = to;
        Ok(())
    }

    fn invalid(
        &self,
        subject: &str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> BatchError {
        BatchError::InvalidTransition {
            subject: if subject == "job" {
                format!("job {}", self.id)
            } else {
                subject.to_string()
            },
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
