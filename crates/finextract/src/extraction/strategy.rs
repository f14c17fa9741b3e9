use crate::model::Table;

use super::securities::{self, SecurityExtraction};

/// Turns extracted text and tables into security records.
///
/// The orchestrator only sees this trait, so a model-backed recognizer can
/// replace the structural one without touching the batch or data model.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract_securities(&self, text: &str, tables: &[Table]) -> SecurityExtraction;
}

/// Header binding over tables plus ISIN pattern scanning over text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralStrategy;

impl ExtractionStrategy for StructuralStrategy {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn extract_securities(&self, text: &str, tables: &[Table]) -> SecurityExtraction {
        let _span = tracing::info_span!("extraction.structural", tables = tables.len()).entered();

        let mut warnings = Vec::new();
        let from_tables = securities::from_tables(tables, &mut warnings);
        let from_text = securities::from_text(text);
        tracing::debug!(
            "{} table candidates, {} text candidates",
            from_tables.len(),
            from_text.len()
        );

        let mut merged = securities::merge(from_tables, from_text);
        securities::validate(&mut merged, &mut warnings);

        SecurityExtraction {
            securities: merged,
            warnings,
        }
    }
}
