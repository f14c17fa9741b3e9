pub mod csv;
pub mod pdf;
pub mod spreadsheet;

use std::collections::BTreeMap;

use crate::config::schema::ExtractionConfig;
use crate::error::ProcessError;
use crate::model::{Document, FileType, Table};

/// Normalized output of a format-specific extractor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContent {
    pub text: String,
    pub tables: Vec<Table>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

pub trait DocumentProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Primary extraction: plain text plus tables.
    fn extract(&self, document: &Document, bytes: &[u8]) -> Result<ExtractedContent, ProcessError>;

    /// Degraded text recovery, used only after `extract` failed.
    fn fallback_text(&self, _bytes: &[u8]) -> Option<String> {
        None
    }

    fn supports(&self, format: FileType) -> bool;
}

/// A document bound to the processor that handles its format.
pub struct ParserHandle<'a> {
    pub document: &'a Document,
    processor: &'a dyn DocumentProcessor,
}

impl<'a> ParserHandle<'a> {
    pub fn processor_name(&self) -> &'static str {
        self.processor.name()
    }

    pub fn read_source(&self) -> Result<Vec<u8>, ProcessError> {
        std::fs::read(&self.document.source_path).map_err(|e| ProcessError::ReadDocument {
            path: self.document.source_path.clone(),
            source: e,
        })
    }

    /// Reads the source file and runs the primary extractor.
    pub fn extract(&self) -> Result<ExtractedContent, ProcessError> {
        let bytes = self.read_source()?;
        self.extract_bytes(&bytes)
    }

    pub fn extract_bytes(&self, bytes: &[u8]) -> Result<ExtractedContent, ProcessError> {
        self.processor.extract(self.document, bytes)
    }

    pub fn fallback_text(&self, bytes: &[u8]) -> Option<String> {
        self.processor.fallback_text(bytes)
    }
}

/// Format router: picks a processor purely from the document's file type.
pub struct ProcessorRegistry {
    processors: Vec<Box<dyn DocumentProcessor>>,
}

impl ProcessorRegistry {
    pub fn new(config: &ExtractionConfig) -> Self {
        let processors: Vec<Box<dyn DocumentProcessor>> = vec![
            Box::new(pdf::PdfProcessor::new(
                config.line_merge_threshold,
                config.column_gap_threshold,
            )),
            Box::new(spreadsheet::SpreadsheetProcessor::new()),
            Box::new(csv::CsvProcessor::new()),
        ];

        Self { processors }
    }

    /// Registry with an explicit processor list.
    pub fn with_processors(processors: Vec<Box<dyn DocumentProcessor>>) -> Self {
        Self { processors }
    }

    pub fn route<'a>(&'a self, document: &'a Document) -> Result<ParserHandle<'a>, ProcessError> {
        self.processors
            .iter()
            .find(|p| p.supports(document.file_type))
            .map(|processor| ParserHandle {
                document,
                processor: processor.as_ref(),
            })
            .ok_or_else(|| ProcessError::UnsupportedFormat(document.file_type.to_string()))
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}
