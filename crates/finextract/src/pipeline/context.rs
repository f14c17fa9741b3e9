use crate::extraction::SecurityExtraction;
use crate::model::{Document, ExtractionResult};
use crate::processor::ExtractedContent;
use crate::summary::PortfolioSummary;

pub struct PipelineContext {
    // Input
    pub document: Document,

    // Step 1 result
    pub processor: Option<&'static str>,
    pub content: ExtractedContent,
    /// Set when the primary extractor failed and `content` holds fallback text.
    pub fallback_reason: Option<String>,

    // Step 2 result
    pub strategy: Option<&'static str>,
    pub extraction: SecurityExtraction,

    // Step 3 result
    pub summary: Option<PortfolioSummary>,
}

impl PipelineContext {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            processor: None,
            content: ExtractedContent::default(),
            fallback_reason: None,
            strategy: None,
            extraction: SecurityExtraction::default(),
            summary: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.fallback_reason.is_some()
    }

    /// Assembles the stored record. Raw source bytes are never carried over.
    pub fn into_result(self) -> ExtractionResult {
        let degraded = self.is_degraded();
        let mut result = ExtractionResult::new(self.document.id, self.document.file_name);

        result.metadata = self.content.metadata;
        result
            .metadata
            .insert("fileType".to_string(), self.document.file_type.to_string().into());
        result
            .metadata
            .insert("sizeBytes".to_string(), self.document.size_bytes.into());
        if let Some(mime_type) = self.document.mime_type {
            result.metadata.insert("mimeType".to_string(), mime_type.into());
        }
        if let Some(processor) = self.processor {
            result.metadata.insert("processor".to_string(), processor.into());
        }
        if let Some(strategy) = self.strategy {
            result.metadata.insert("strategy".to_string(), strategy.into());
        }
        if let Some(reason) = self.fallback_reason {
            result.metadata.insert("degraded".to_string(), true.into());
            result.metadata.insert("fallbackReason".to_string(), reason.into());
        }

        result.text = self.content.text;
        result.tables = self.content.tables;
        result.securities = self.extraction.securities;
        result.warnings = self.extraction.warnings;
        result.summary = self.summary;
        result.degraded = degraded;
        result
    }
}
