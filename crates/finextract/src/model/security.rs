use serde::{Deserialize, Serialize};

/// A numeric field as extracted from a document.
///
/// Strings that fail to parse are kept verbatim as `Raw` instead of being
/// coerced to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Raw(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Raw(_) => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, FieldValue::Raw(_))
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Raw(s) => write!(f, "{}", s),
        }
    }
}

/// How a security record was found.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecuritySource {
    Table,
    Text,
    /// Table record back-filled from a text match.
    Merged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    pub isin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_of_assets: Option<FieldValue>,
    /// Extraction certainty in `[0, 1]`.
    pub confidence: f64,
    pub isin_valid: bool,
    pub source: SecuritySource,
}

impl Security {
    pub fn new(isin: impl Into<String>, source: SecuritySource, confidence: f64) -> Self {
        Self {
            isin: isin.into(),
            name: None,
            quantity: None,
            price: None,
            value: None,
            currency: None,
            percent_of_assets: None,
            confidence: confidence.clamp(0.0, 1.0),
            isin_valid: true,
            source,
        }
    }

    /// Numeric market value, if one was parsed.
    pub fn numeric_value(&self) -> Option<f64> {
        self.value.as_ref().and_then(FieldValue::as_number)
    }

    /// Fills every missing field from `other`, keeping fields already set.
    ///
    /// Returns true when at least one field was taken from `other`.
    pub fn back_fill(&mut self, other: &Security) -> bool {
        let mut filled = false;

        fn fill<T: Clone>(slot: &mut Option<T>, from: &Option<T>, filled: &mut bool) {
            if slot.is_none() && from.is_some() {
                *slot = from.clone();
                *filled = true;
            }
        }

        fill(&mut self.name, &other.name, &mut filled);
        fill(&mut self.quantity, &other.quantity, &mut filled);
        fill(&mut self.price, &other.price, &mut filled);
        fill(&mut self.value, &other.value, &mut filled);
        fill(&mut self.currency, &other.currency, &mut filled);
        fill(
            &mut self.percent_of_assets,
            &other.percent_of_assets,
            &mut filled,
        );

        filled
    }
}
