use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProcessError;

/// Source formats accepted by the format router.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Xlsx,
    Xls,
    Csv,
}

impl FileType {
    /// Case-insensitive lookup by extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "xlsx" => Some(FileType::Xlsx),
            "xls" => Some(FileType::Xls),
            "csv" => Some(FileType::Csv),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ProcessError> {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        Self::from_extension(extension)
            .ok_or_else(|| ProcessError::UnsupportedFormat(extension.to_string()))
    }

    pub fn is_spreadsheet(&self) -> bool {
        matches!(self, FileType::Xlsx | FileType::Xls)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Pdf => write!(f, "pdf"),
            FileType::Xlsx => write!(f, "xlsx"),
            FileType::Xls => write!(f, "xls"),
            FileType::Csv => write!(f, "csv"),
        }
    }
}

/// An ingested source file. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub source_path: PathBuf,
    /// Name the caller uploaded the file under; drives format detection.
    pub file_name: String,
    pub file_type: FileType,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    /// Creates a document record for a file on disk.
    ///
    /// The format comes from `file_name` (uploads are often stored under
    /// extension-less temp paths), falling back to the path's own name.
    pub fn ingest(source_path: &Path, file_name: Option<&str>) -> Result<Self, ProcessError> {
        let file_name = file_name
            .map(str::to_string)
            .or_else(|| {
                source_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        let file_type = FileType::from_name(&file_name)?;

        let size_bytes = std::fs::metadata(source_path)
            .map_err(|e| ProcessError::ReadDocument {
                path: source_path.to_path_buf(),
                source: e,
            })?
            .len();

        let mime_type = mime_guess::from_path(&file_name)
            .first()
            .map(|m| m.to_string());

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_path: source_path.to_path_buf(),
            file_name,
            file_type,
            size_bytes,
            mime_type,
            uploaded_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_type_from_extension_is_case_insensitive() {
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("Xlsx"), Some(FileType::Xlsx));
        assert_eq!(FileType::from_extension("xls"), Some(FileType::Xls));
        assert_eq!(FileType::from_extension("CsV"), Some(FileType::Csv));
        assert_eq!(FileType::from_extension("docx"), None);
        assert_eq!(FileType::from_extension(""), None);
    }

    #[test]
    fn test_from_name_reports_extension() {
        match FileType::from_name("statement.docx") {
            Err(ProcessError::UnsupportedFormat(ext)) => assert_eq!(ext, "docx"),
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
        match FileType::from_name("noextension") {
            Err(ProcessError::UnsupportedFormat(ext)) => assert_eq!(ext, ""),
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_ingest_uses_original_name_over_path() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), b"Security,ISIN\n").unwrap();

        let doc = Document::ingest(temp_file.path(), Some("Holdings.CSV")).unwrap();
        assert_eq!(doc.file_type, FileType::Csv);
        assert_eq!(doc.file_name, "Holdings.CSV");
        assert_eq!(doc.size_bytes, 14);
        assert!(!doc.id.is_empty());
    }

    #[test]
    fn test_ingest_missing_file() {
        let result = Document::ingest(Path::new("/nonexistent/holdings.csv"), None);
        assert!(matches!(result, Err(ProcessError::ReadDocument { .. })));
    }

    #[test]
    fn test_ingest_unsupported_before_reading() {
        let result = Document::ingest(Path::new("/nonexistent/notes.txt"), None);
        assert!(matches!(result, Err(ProcessError::UnsupportedFormat(_))));
    }
}
