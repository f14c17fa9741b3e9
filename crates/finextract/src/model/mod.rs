//! Records produced and consumed by the extraction pipeline.

pub mod document;
pub mod result;
pub mod security;
pub mod table;

pub use document::{Document, FileType};
pub use result::{ExtractionResult, ValidationWarning};
pub use security::{FieldValue, Security, SecuritySource};
pub use table::{SemanticType, Table, TableSource};
