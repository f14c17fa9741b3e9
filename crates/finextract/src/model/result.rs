use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Security, Table};
use crate::summary::PortfolioSummary;

/// Non-fatal findings recorded alongside an extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// The identifier has the ISIN shape but its check digit does not match.
    InvalidIsinChecksum { isin: String },
    /// A numeric column held text that could not be parsed as a number.
    UnparsedNumber {
        isin: String,
        field: String,
        raw: String,
    },
}

/// Everything derived from one document. Replaced wholesale on re-extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub document_id: String,
    pub file_name: String,
    pub text: String,
    pub tables: Vec<Table>,
    pub securities: Vec<Security>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<PortfolioSummary>,
    #[serde(default)]
    pub warnings: Vec<ValidationWarning>,
    /// True when the primary extractor failed and only fallback text is present.
    #[serde(default)]
    pub degraded: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ExtractionResult {
    pub fn new(document_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            file_name: file_name.into(),
            text: String::new(),
            tables: Vec::new(),
            securities: Vec::new(),
            summary: None,
            warnings: Vec::new(),
            degraded: false,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn security(&self, isin: &str) -> Option<&Security> {
        self.securities.iter().find(|s| s.isin == isin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_collections_are_serialized() {
        let result = ExtractionResult::new("doc-1", "statement.pdf");
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["documentId"], "doc-1");
        assert_eq!(json["tables"], serde_json::json!([]));
        assert_eq!(json["securities"], serde_json::json!([]));
        assert_eq!(json["text"], "");
        assert_eq!(json["degraded"], false);
    }

    #[test]
    fn test_warning_tagging() {
        let warning = ValidationWarning::InvalidIsinChecksum {
            isin: "US0378331006".into(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["type"], "invalid_isin_checksum");
        assert_eq!(json["isin"], "US0378331006");
    }
}
