use std::path::Path;

use crate::error::ProcessError;
use crate::model::{Document, FileType, SemanticType, Table, TableSource};
use crate::processor::{DocumentProcessor, ExtractedContent};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Single-table reader: the first record is the header row.
pub struct CsvProcessor;

impl CsvProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor for CsvProcessor {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn extract(&self, document: &Document, bytes: &[u8]) -> Result<ExtractedContent, ProcessError> {
        let _span = tracing::info_span!("processor.csv").entered();

        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ProcessError::CsvProcessing(e.to_string()))?;
            let cells: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
            if cells.iter().any(|c| !c.is_empty()) {
                records.push(cells);
            }
        }

        let mut records = records.into_iter();
        let Some(headers) = records.next() else {
            return Ok(ExtractedContent::default());
        };

        // Rows are bound to the header order: extra cells dropped, missing ones empty.
        let rows: Vec<Vec<String>> = records
            .map(|mut row| {
                row.resize(headers.len(), String::new());
                row
            })
            .collect();

        let title = Path::new(&document.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("csv")
            .to_string();
        let semantic_type = SemanticType::infer_from_headers(&headers);
        let table = Table::new("csv-1", title, headers, rows, TableSource::File, semantic_type);

        let mut content = ExtractedContent {
            text: table.to_plain_text(),
            tables: vec![table],
            ..Default::default()
        };
        content
            .metadata
            .insert("rowCount".to_string(), content.tables[0].rows.len().into());

        Ok(content)
    }

    fn fallback_text(&self, bytes: &[u8]) -> Option<String> {
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    fn supports(&self, format: FileType) -> bool {
        matches!(format, FileType::Csv)
    }
}
