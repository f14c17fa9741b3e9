//! Batch job orchestration: the job state machine, the per-file processor
//! seam and the task runner that drives jobs through the result store.

pub mod job;
pub mod orchestrator;
pub mod processor;

pub use job::{BatchFile, BatchJob, FileError, FileResultRef, FileStatus, JobStatus};
pub use orchestrator::{BatchOrchestrator, FileSpec};
pub use processor::{FileProcessor, PipelineProcessor};
