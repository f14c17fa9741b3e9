//! Question answering over a stored extraction.
//!
//! A free-text question is classified once into a closed set of categories;
//! each category is answered by a pure function of the extraction result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::extraction::isin;
use crate::model::{ExtractionResult, Security};
use crate::summary::{self, AllocationSlice, PortfolioSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", content = "isin", rename_all = "snake_case")]
pub enum QueryCategory {
    TotalValue,
    TopHoldings,
    AssetAllocation,
    SecurityCount,
    SecurityLookup(String),
    DocumentOverview,
}

const ALLOCATION_KEYWORDS: [&str; 4] = ["allocation", "asset class", "breakdown", "diversif"];
const COUNT_KEYWORDS: [&str; 3] = ["how many", "count", "number of"];
const TOP_KEYWORDS: [&str; 4] = ["top", "largest", "biggest", "holdings"];
const TOTAL_KEYWORDS: [&str; 3] = ["total", "worth", "value"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// An ISIN written in capitals, or a lower-case one whose check digit holds.
/// Ordinary words such as `holdings2023` have the shape but not the checksum.
fn find_isin(query: &str) -> Option<String> {
    if let Some((_, _, code)) = isin::find_isins(query).next() {
        return Some(code.to_string());
    }
    let upper = query.to_uppercase();
    let found = isin::find_isins(&upper)
        .map(|(_, _, code)| code)
        .find(|code| isin::validate_isin(code))
        .map(str::to_string);
    found
}

impl QueryCategory {
    /// Maps a question to a category. An ISIN in the question always means
    /// a lookup; otherwise the first matching keyword group wins.
    pub fn classify(query: &str) -> Self {
        if let Some(code) = find_isin(query) {
            return QueryCategory::SecurityLookup(code);
        }

        let lower = query.to_lowercase();
        if contains_any(&lower, &ALLOCATION_KEYWORDS) {
            QueryCategory::AssetAllocation
        } else if contains_any(&lower, &COUNT_KEYWORDS) {
            QueryCategory::SecurityCount
        } else if contains_any(&lower, &TOP_KEYWORDS) {
            QueryCategory::TopHoldings
        } else if contains_any(&lower, &TOTAL_KEYWORDS) {
            QueryCategory::TotalValue
        } else {
            QueryCategory::DocumentOverview
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryAnswer {
    TotalValue {
        value: Option<f64>,
        currency: Option<String>,
    },
    TopHoldings {
        holdings: Vec<Security>,
    },
    AssetAllocation {
        allocation: BTreeMap<String, AllocationSlice>,
    },
    SecurityCount {
        count: usize,
        valid_isins: usize,
    },
    Security {
        isin: String,
        security: Option<Security>,
    },
    Overview {
        file_name: String,
        text_length: usize,
        table_count: usize,
        security_count: usize,
        degraded: bool,
    },
}

/// Result of asking about a document that may not be processed yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Answered {
        category: QueryCategory,
        answer: QueryAnswer,
    },
    NotYetAvailable {
        document_id: String,
        reason: String,
    },
}

pub fn answer(result: &ExtractionResult, category: &QueryCategory) -> QueryAnswer {
    let computed;
    let summary: &PortfolioSummary = match &result.summary {
        Some(summary) => summary,
        None => {
            computed = summary::summarize(result);
            &computed
        }
    };

    match category {
        QueryCategory::TotalValue => QueryAnswer::TotalValue {
            value: summary.total_value,
            currency: summary.currency.clone(),
        },
        QueryCategory::TopHoldings => QueryAnswer::TopHoldings {
            holdings: summary.top_holdings.clone(),
        },
        QueryCategory::AssetAllocation => QueryAnswer::AssetAllocation {
            allocation: summary.asset_allocation.clone(),
        },
        QueryCategory::SecurityCount => QueryAnswer::SecurityCount {
            count: summary.total_securities,
            valid_isins: summary.valid_isin_count,
        },
        QueryCategory::SecurityLookup(code) => QueryAnswer::Security {
            isin: code.clone(),
            security: result.security(code).cloned(),
        },
        QueryCategory::DocumentOverview => QueryAnswer::Overview {
            file_name: result.file_name.clone(),
            text_length: result.text.chars().count(),
            table_count: result.tables.len(),
            security_count: result.securities.len(),
            degraded: result.degraded,
        },
    }
}

fn format_amount(value: f64, currency: Option<&str>) -> String {
    match currency {
        Some(code) => format!("{} {:.2}", code, value),
        None => format!("{:.2}", value),
    }
}

impl QueryAnswer {
    /// One human-readable paragraph, for chat-style consumers.
    pub fn render(&self) -> String {
        match self {
            QueryAnswer::TotalValue {
                value: Some(value),
                currency,
            } => format!(
                "Total portfolio value: {}",
                format_amount(*value, currency.as_deref())
            ),
            QueryAnswer::TotalValue { value: None, .. } => {
                "Total portfolio value is not available for this document.".to_string()
            }
            QueryAnswer::TopHoldings { holdings } if holdings.is_empty() => {
                "No holdings were found.".to_string()
            }
            QueryAnswer::TopHoldings { holdings } => {
                let lines: Vec<String> = holdings
                    .iter()
                    .enumerate()
                    .map(|(i, s)| {
                        let name = s.name.as_deref().unwrap_or("Unknown");
                        let value = s
                            .value
                            .as_ref()
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "n/a".to_string());
                        format!("{}. {} ({}): {}", i + 1, name, s.isin, value)
                    })
                    .collect();
                format!("Top holdings:\n{}", lines.join("\n"))
            }
            QueryAnswer::AssetAllocation { allocation } if allocation.is_empty() => {
                "No asset allocation table was found.".to_string()
            }
            QueryAnswer::AssetAllocation { allocation } => {
                let lines: Vec<String> = allocation
                    .iter()
                    .map(|(class, slice)| match slice.weight {
                        Some(weight) => format!("{}: {:.1}%", class, weight),
                        None => class.clone(),
                    })
                    .collect();
                format!("Asset allocation:\n{}", lines.join("\n"))
            }
            QueryAnswer::SecurityCount { count, valid_isins } => format!(
                "{} securities found ({} with a valid ISIN).",
                count, valid_isins
            ),
            QueryAnswer::Security {
                isin,
                security: None,
            } => format!("{} does not appear in this document.", isin),
            QueryAnswer::Security {
                isin,
                security: Some(s),
            } => format!(
                "{} {}: quantity {}, value {}",
                isin,
                s.name.as_deref().unwrap_or("(unnamed)"),
                s.quantity
                    .as_ref()
                    .map(|q| q.to_string())
                    .unwrap_or_else(|| "n/a".to_string()),
                s.value
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "n/a".to_string()),
            ),
            QueryAnswer::Overview {
                file_name,
                table_count,
                security_count,
                degraded,
                ..
            } => {
                let mut text = format!(
                    "{}: {} tables, {} securities.",
                    file_name, table_count, security_count
                );
                if *degraded {
                    text.push_str(" Only plain text could be recovered.");
                }
                text
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldValue, SecuritySource};

    fn result() -> ExtractionResult {
        let mut result = ExtractionResult::new("doc-1", "statement.pdf");
        for (isin, name, value) in [
            ("US0378331005", "Apple Inc", 95000.0),
            ("US88160R1014", "Tesla Inc", 105000.0),
        ] {
            let mut security = Security::new(isin, SecuritySource::Table, 0.9);
            security.name = Some(name.to_string());
            security.value = Some(FieldValue::Number(value));
            security.currency = Some("USD".to_string());
            result.securities.push(security);
        }
        result
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            QueryCategory::classify("What is my total portfolio value?"),
            QueryCategory::TotalValue
        );
        assert_eq!(
            QueryCategory::classify("Show the top holdings"),
            QueryCategory::TopHoldings
        );
        assert_eq!(
            QueryCategory::classify("How many holdings do I have?"),
            QueryCategory::SecurityCount
        );
        assert_eq!(
            QueryCategory::classify("asset allocation breakdown"),
            QueryCategory::AssetAllocation
        );
        assert_eq!(
            QueryCategory::classify("tell me about us0378331005"),
            QueryCategory::SecurityLookup("US0378331005".to_string())
        );
        assert_eq!(
            QueryCategory::classify("hello"),
            QueryCategory::DocumentOverview
        );
    }

    #[test]
    fn test_classify_ignores_isin_shaped_words() {
        assert_eq!(
            QueryCategory::classify("summary20241 total value"),
            QueryCategory::TotalValue
        );
        assert_eq!(
            QueryCategory::classify("show holdings2023 total value"),
            QueryCategory::TopHoldings
        );
        assert_eq!(
            QueryCategory::classify("what is US88160R1014 worth"),
            QueryCategory::SecurityLookup("US88160R1014".to_string())
        );
    }

    #[test]
    fn test_answer_computes_summary_when_missing() {
        let result = result();
        let answer = answer(&result, &QueryCategory::TotalValue);
        assert_eq!(
            answer,
            QueryAnswer::TotalValue {
                value: Some(200000.0),
                currency: Some("USD".to_string())
            }
        );
        assert_eq!(answer.render(), "Total portfolio value: USD 200000.00");
    }

    #[test]
    fn test_top_holdings_order() {
        let result = result();
        match answer(&result, &QueryCategory::TopHoldings) {
            QueryAnswer::TopHoldings { holdings } => {
                let order: Vec<&str> = holdings.iter().map(|s| s.isin.as_str()).collect();
                assert_eq!(order, vec!["US88160R1014", "US0378331005"]);
            }
            other => panic!("Unexpected answer {:?}", other),
        }
    }

    #[test]
    fn test_lookup_missing_security() {
        let answer = answer(
            &result(),
            &QueryCategory::SecurityLookup("DE0007164600".to_string()),
        );
        assert_eq!(
            answer.render(),
            "DE0007164600 does not appear in this document."
        );
    }

    #[test]
    fn test_empty_document_answers() {
        let empty = ExtractionResult::new("doc-2", "empty.csv");
        assert_eq!(
            answer(&empty, &QueryCategory::TotalValue).render(),
            "Total portfolio value is not available for this document."
        );
        assert_eq!(
            answer(&empty, &QueryCategory::SecurityCount),
            QueryAnswer::SecurityCount {
                count: 0,
                valid_isins: 0
            }
        );
    }
}
