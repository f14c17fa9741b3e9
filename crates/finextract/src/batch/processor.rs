use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProcessError;
use crate::model::ExtractionResult;
use crate::pipeline::Pipeline;

use super::job::BatchFile;

/// Turns one batch file into an extraction result.
///
/// The orchestrator records any `Err` on the file entry and moves on.
#[async_trait]
pub trait FileProcessor: Send + Sync {
    async fn process(
        &self,
        file: &BatchFile,
        timeout: Duration,
    ) -> Result<ExtractionResult, ProcessError>;
}

/// Runs the extraction [`Pipeline`] on the blocking pool under a deadline.
#[derive(Clone)]
pub struct PipelineProcessor {
    pipeline: Arc<Pipeline>,
}

impl PipelineProcessor {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl FileProcessor for PipelineProcessor {
    async fn process(
        &self,
        file: &BatchFile,
        timeout: Duration,
    ) -> Result<ExtractionResult, ProcessError> {
        let pipeline = Arc::clone(&self.pipeline);
        let path = file.path.clone();
        let name = file.name.clone();

        let task = tokio::task::spawn_blocking(move || pipeline.process_file(&path, Some(&name)));

        // On timeout the blocking task keeps running; its result is dropped.
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ProcessError::TaskFailed(join_err.to_string())),
            Err(_) => {
                tracing::warn!(
                    "Extraction of '{}' exceeded {:.1}s",
                    file.name,
                    timeout.as_secs_f64()
                );
                Err(ProcessError::ExtractionTimeout {
                    file: file.name.clone(),
                    seconds: timeout.as_secs(),
                })
            }
        }
    }
}
