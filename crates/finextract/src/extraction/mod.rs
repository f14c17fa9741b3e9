pub mod columns;
pub mod isin;
pub mod numeric;
pub mod securities;
pub mod strategy;

pub use isin::validate_isin;
pub use numeric::{parse_money, parse_percent};
pub use securities::SecurityExtraction;
pub use strategy::{ExtractionStrategy, StructuralStrategy};

use crate::model::ExtractionResult;

/// Runs the default structural strategy over an existing result.
pub fn extract_securities(result: &ExtractionResult) -> SecurityExtraction {
    StructuralStrategy.extract_securities(&result.text, &result.tables)
}
