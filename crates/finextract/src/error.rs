use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinextractError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Per-file failures. None of these abort sibling files in a batch.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("Failed to process spreadsheet: {0}")]
    SpreadsheetProcessing(String),

    #[error("Failed to process CSV: {0}")]
    CsvProcessing(String),

    #[error("Extraction of '{file}' exceeded {seconds}s")]
    ExtractionTimeout { file: String, seconds: u64 },

    #[error("Extraction task failed: {0}")]
    TaskFailed(String),
}

/// Coarse classification of a per-file failure, recorded on the batch job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    ParseError,
    ExtractionTimeout,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::UnsupportedFormat => write!(f, "UnsupportedFormat"),
            ErrorKind::ParseError => write!(f, "ParseError"),
            ErrorKind::ExtractionTimeout => write!(f, "ExtractionTimeout"),
            ErrorKind::Internal => write!(f, "Internal"),
        }
    }
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ProcessError::ReadDocument { .. }
            | ProcessError::PdfProcessing(_)
            | ProcessError::SpreadsheetProcessing(_)
            | ProcessError::CsvProcessing(_) => ErrorKind::ParseError,
            ProcessError::ExtractionTimeout { .. } => ErrorKind::ExtractionTimeout,
            ProcessError::TaskFailed(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Batch job not found: {0}")]
    JobNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Failed to (de)serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("A batch must contain at least one file")]
    EmptyFileList,

    #[error("Invalid transition for {subject}: {from} -> {to}")]
    InvalidTransition {
        subject: String,
        from: String,
        to: String,
    },

    #[error("File index {index} out of range for batch of {total}")]
    FileIndexOutOfRange { index: usize, total: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Job update task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, FinextractError>;
