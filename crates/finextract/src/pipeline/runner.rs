use std::path::Path;

use tracing::{debug, info_span, warn};

use crate::config::schema::ExtractionConfig;
use crate::error::ProcessError;
use crate::extraction::{ExtractionStrategy, StructuralStrategy};
use crate::model::{Document, ExtractionResult};
use crate::processor::{ExtractedContent, ProcessorRegistry};
use crate::sanitize;
use crate::summary;

use super::context::PipelineContext;

/// Per-file extraction: route, extract, recognize securities, summarize.
///
/// Synchronous and CPU-bound; the batch orchestrator runs it on the
/// blocking pool.
pub struct Pipeline {
    registry: ProcessorRegistry,
    strategy: Box<dyn ExtractionStrategy>,
    top_holdings: usize,
}

impl Pipeline {
    /// Production constructor with the structural strategy.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            registry: ProcessorRegistry::new(config),
            strategy: Box::new(StructuralStrategy),
            top_holdings: config.top_holdings,
        }
    }

    pub fn new(
        registry: ProcessorRegistry,
        strategy: Box<dyn ExtractionStrategy>,
        top_holdings: usize,
    ) -> Self {
        Self {
            registry,
            strategy,
            top_holdings,
        }
    }

    /// Ingests a file from disk and runs the full pipeline on it.
    pub fn process_file(
        &self,
        path: &Path,
        original_name: Option<&str>,
    ) -> Result<ExtractionResult, ProcessError> {
        let document = Document::ingest(path, original_name)?;
        self.run(document)
    }

    /// Runs the pipeline for a single document.
    ///
    /// Only a failure with no fallback text is an `Err`; a degraded
    /// extraction still produces a result.
    pub fn run(&self, document: Document) -> Result<ExtractionResult, ProcessError> {
        let filename = sanitize::redact_path(Path::new(&document.file_name));
        let _pipeline_span = info_span!("pipeline",
            document_id = %document.id,
            filename = %filename,
            file_type = %document.file_type,
        )
        .entered();

        let mut ctx = PipelineContext::new(document);

        // Step 1: Text and tables
        {
            let _step = info_span!("extract_content").entered();
            self.step_extract_content(&mut ctx)?;
        }

        // Step 2: Securities
        {
            let _step = info_span!("extract_securities").entered();
            self.step_extract_securities(&mut ctx);
        }

        // Step 3: Summary
        {
            let _step = info_span!("summarize").entered();
            self.step_summarize(&mut ctx);
        }

        Ok(ctx.into_result())
    }

    fn step_extract_content(&self, ctx: &mut PipelineContext) -> Result<(), ProcessError> {
        let handle = self.registry.route(&ctx.document)?;
        let processor = handle.processor_name();
        let bytes = handle.read_source()?;

        let (content, fallback_reason) = match handle.extract_bytes(&bytes) {
            Ok(content) => (content, None),
            Err(e) => {
                let Some(text) = handle.fallback_text(&bytes) else {
                    return Err(e);
                };
                // Statement text stays out of logs; the span carries the file name.
                warn!(
                    "Primary extraction failed ({}), continuing with {} chars of fallback text",
                    e,
                    text.chars().count()
                );
                let content = ExtractedContent {
                    text,
                    ..ExtractedContent::default()
                };
                (content, Some(e.to_string()))
            }
        };

        debug!(
            "{} extracted {} chars, {} tables",
            processor,
            content.text.len(),
            content.tables.len()
        );

        ctx.processor = Some(processor);
        ctx.content = content;
        ctx.fallback_reason = fallback_reason;
        Ok(())
    }

    fn step_extract_securities(&self, ctx: &mut PipelineContext) {
        // A degraded result carries text only.
        if ctx.is_degraded() {
            return;
        }

        ctx.extraction = self
            .strategy
            .extract_securities(&ctx.content.text, &ctx.content.tables);
        ctx.strategy = Some(self.strategy.name());
        debug!(
            "{} securities, {} warnings",
            ctx.extraction.securities.len(),
            ctx.extraction.warnings.len()
        );
    }

    fn step_summarize(&self, ctx: &mut PipelineContext) {
        ctx.summary = Some(summary::summarize_parts(
            &ctx.extraction.securities,
            &ctx.content.tables,
            self.top_holdings,
        ));
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileType, SemanticType};
    use crate::processor::DocumentProcessor;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    struct BrokenCsvProcessor {
        fallback: Option<&'static str>,
    }

    impl DocumentProcessor for BrokenCsvProcessor {
        fn name(&self) -> &'static str {
            "broken-csv"
        }

        fn extract(
            &self,
            _document: &Document,
            _bytes: &[u8],
        ) -> Result<ExtractedContent, ProcessError> {
            Err(ProcessError::CsvProcessing("unterminated quote".to_string()))
        }

        fn fallback_text(&self, _bytes: &[u8]) -> Option<String> {
            self.fallback.map(str::to_string)
        }

        fn supports(&self, format: FileType) -> bool {
            format == FileType::Csv
        }
    }

    fn broken_pipeline(fallback: Option<&'static str>) -> Pipeline {
        Pipeline::new(
            ProcessorRegistry::with_processors(vec![Box::new(BrokenCsvProcessor { fallback })]),
            Box::new(StructuralStrategy),
            5,
        )
    }

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_full_pipeline_on_csv() {
        let file = csv_file(
            "Security,ISIN,Value,Currency\n\
             Apple Inc,US0378331005,\"95,000.00\",USD\n\
             Tesla Inc,US88160R1014,\"105,000.00\",USD\n",
        );

        let result = Pipeline::default()
            .process_file(file.path(), Some("holdings.csv"))
            .unwrap();

        assert_eq!(result.file_name, "holdings.csv");
        assert!(!result.degraded);
        assert_eq!(result.tables.len(), 1);
        assert_eq!(result.tables[0].semantic_type, SemanticType::Portfolio);
        assert_eq!(result.securities.len(), 2);
        assert_eq!(result.metadata["fileType"], "csv");
        assert_eq!(result.metadata["processor"], "csv");
        assert_eq!(result.metadata["strategy"], "structural");

        let summary = result.summary.unwrap();
        assert_eq!(summary.total_value, Some(200000.0));
        assert_eq!(summary.top_holdings[0].isin, "US88160R1014");
        assert_eq!(summary.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_unsupported_format() {
        let file = csv_file("hello");
        let result = Pipeline::default().process_file(file.path(), Some("notes.docx"));
        assert!(matches!(result, Err(ProcessError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result =
            Pipeline::default().process_file(Path::new("/nonexistent/statement.csv"), None);
        assert!(matches!(result, Err(ProcessError::ReadDocument { .. })));
    }

    #[test]
    fn test_fallback_produces_degraded_result() {
        let file = csv_file("Apple Inc US0378331005");
        let result = broken_pipeline(Some("Apple Inc US0378331005"))
            .process_file(file.path(), Some("export.csv"))
            .unwrap();

        assert!(result.degraded);
        assert_eq!(result.text, "Apple Inc US0378331005");
        assert!(result.tables.is_empty());
        assert!(result.securities.is_empty());
        assert_eq!(result.metadata["degraded"], true);
        assert!(result.metadata["fallbackReason"]
            .as_str()
            .unwrap()
            .contains("unterminated quote"));
        assert!(!result.metadata.contains_key("strategy"));
        assert_eq!(result.summary.unwrap().total_securities, 0);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_fallback_warning_omits_statement_text() {
        let file = csv_file("Apple Inc US0378331005");
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let result = tracing::subscriber::with_default(subscriber, || {
            broken_pipeline(Some("Apple Inc US0378331005"))
                .process_file(file.path(), Some("export.csv"))
        });
        assert!(result.unwrap().degraded);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Primary extraction failed"));
        assert!(output.contains("22 chars of fallback text"));
        assert!(output.contains("export.csv"));
        assert!(!output.contains("Apple"));
        assert!(!output.contains("US0378331005"));
    }

    #[test]
    fn test_no_fallback_keeps_primary_error() {
        let file = csv_file("x");
        let result = broken_pipeline(None).process_file(file.path(), Some("export.csv"));
        assert!(matches!(result, Err(ProcessError::CsvProcessing(_))));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let file = csv_file("Security,ISIN\nApple,US0378331005\n");
        let pipeline = Pipeline::default();
        let document = Document::ingest(file.path(), Some("holdings.csv")).unwrap();

        let first = pipeline.run(document.clone()).unwrap();
        let second = pipeline.run(document).unwrap();
        assert_eq!(first.text, second.text);
        assert_eq!(first.tables, second.tables);
        assert_eq!(first.securities, second.securities);
    }
}
