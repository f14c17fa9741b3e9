//! Entry points for upstream callers (HTTP handlers, the CLI, chat layers).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::warn;

use crate::batch::{BatchJob, BatchOrchestrator, FileProcessor, FileSpec, PipelineProcessor};
use crate::broadcast::{BatchProgressBroadcaster, BatchProgressEvent};
use crate::config::Config;
use crate::error::{BatchError, StoreError};
use crate::model::ExtractionResult;
use crate::pipeline::Pipeline;
use crate::query::{self, QueryCategory, QueryOutcome};
use crate::store::ResultStore;

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Per-file budget; the configured default when `None`.
    pub timeout: Option<Duration>,
}

/// Composes the result store and the batch orchestrator.
#[derive(Clone)]
pub struct DocumentService {
    store: ResultStore,
    orchestrator: BatchOrchestrator,
}

impl DocumentService {
    /// Builds the production service: configured store backend and the
    /// structural extraction pipeline.
    ///
    /// Jobs a previous process left running are settled before anything new
    /// is accepted.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let store = ResultStore::from_config(&config.store)?;
        let recovered = store.recover_interrupted_jobs()?;
        if recovered > 0 {
            warn!("Marked {} interrupted batch jobs as failed", recovered);
        }
        let pipeline = Arc::new(Pipeline::from_config(&config.extraction));
        Ok(Self::with_parts(
            store,
            Arc::new(PipelineProcessor::new(pipeline)),
            config,
        ))
    }

    /// Service over an explicit store and file processor.
    pub fn with_parts(
        store: ResultStore,
        processor: Arc<dyn FileProcessor>,
        config: &Config,
    ) -> Self {
        let orchestrator = BatchOrchestrator::new(
            store.clone(),
            processor,
            BatchProgressBroadcaster::new(config.batch.progress_channel_capacity),
            config.batch.max_concurrent_jobs,
            config.extraction.timeout(),
        );
        Self {
            store,
            orchestrator,
        }
    }

    /// Returns as soon as the job is recorded; processing runs in the
    /// background.
    pub fn submit_batch(
        &self,
        files: Vec<FileSpec>,
        options: BatchOptions,
    ) -> Result<String, BatchError> {
        self.orchestrator.submit(files, options.timeout)
    }

    pub fn get_batch_status(&self, batch_id: &str) -> Result<BatchJob, StoreError> {
        self.store.get_job(batch_id)
    }

    pub fn cancel_batch(&self, batch_id: &str) -> Result<BatchJob, BatchError> {
        self.orchestrator.cancel(batch_id)
    }

    pub fn list_batches(&self) -> Result<Vec<BatchJob>, StoreError> {
        self.store.list_jobs()
    }

    /// Waits until the batch's task has ended.
    pub async fn wait_for_batch(&self, batch_id: &str) -> Result<BatchJob, StoreError> {
        self.orchestrator.wait(batch_id).await
    }

    pub fn get_result(&self, document_id: &str) -> Result<ExtractionResult, StoreError> {
        self.store.get_result(document_id)
    }

    pub fn list_results(&self) -> Result<Vec<ExtractionResult>, StoreError> {
        self.store.list_results()
    }

    pub fn delete_result(&self, document_id: &str) -> Result<(), StoreError> {
        self.store.delete_result(document_id)
    }

    /// Answers a question about one document.
    ///
    /// A missing or degraded result is reported as not yet available; only
    /// storage failures are errors.
    pub fn answer_query(&self, document_id: &str, query: &str) -> Result<QueryOutcome, StoreError> {
        let result = match self.store.get_result(document_id) {
            Ok(result) => result,
            Err(StoreError::DocumentNotFound(_)) => {
                return Ok(QueryOutcome::NotYetAvailable {
                    document_id: document_id.to_string(),
                    reason: "no extraction result stored".to_string(),
                })
            }
            Err(e) => return Err(e),
        };

        if result.degraded {
            return Ok(QueryOutcome::NotYetAvailable {
                document_id: document_id.to_string(),
                reason: "only fallback text was extracted".to_string(),
            });
        }

        let category = QueryCategory::classify(query);
        let answer = query::answer(&result, &category);
        Ok(QueryOutcome::Answered { category, answer })
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<BatchProgressEvent> {
        self.orchestrator.broadcaster().subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryAnswer;

    fn service() -> DocumentService {
        let config = Config::default();
        let store = ResultStore::in_memory();
        let pipeline = Arc::new(Pipeline::from_config(&config.extraction));
        DocumentService::with_parts(store, Arc::new(PipelineProcessor::new(pipeline)), &config)
    }

    #[tokio::test]
    async fn test_answer_query_not_yet_available() {
        let service = service();
        let outcome = service.answer_query("missing", "total value").unwrap();
        assert!(matches!(outcome, QueryOutcome::NotYetAvailable { .. }));

        let mut degraded = ExtractionResult::new("doc-d", "broken.pdf");
        degraded.degraded = true;
        service.store.put_result(&degraded).unwrap();
        let outcome = service.answer_query("doc-d", "total value").unwrap();
        assert!(matches!(outcome, QueryOutcome::NotYetAvailable { .. }));
    }

    #[tokio::test]
    async fn test_answer_query_on_stored_result() {
        let service = service();
        service
            .store
            .put_result(&ExtractionResult::new("doc-1", "empty.csv"))
            .unwrap();

        match service.answer_query("doc-1", "how many securities?").unwrap() {
            QueryOutcome::Answered { category, answer } => {
                assert_eq!(category, QueryCategory::SecurityCount);
                assert_eq!(
                    answer,
                    QueryAnswer::SecurityCount {
                        count: 0,
                        valid_isins: 0
                    }
                );
            }
            other => panic!("Expected an answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lookups_propagate_not_found() {
        let service = service();
        assert!(matches!(
            service.get_batch_status("nope"),
            Err(StoreError::JobNotFound(_))
        ));
        assert!(matches!(
            service.get_result("nope"),
            Err(StoreError::DocumentNotFound(_))
        ));
        assert!(matches!(
            service.delete_result("nope"),
            Err(StoreError::DocumentNotFound(_))
        ));
    }
}
