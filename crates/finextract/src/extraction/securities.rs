use std::collections::HashMap;

use crate::model::{
    FieldValue, SemanticType, Security, SecuritySource, Table, ValidationWarning,
};

use super::columns::{ColumnBinding, SecurityField};
use super::isin::{find_isins, is_isin_shaped, validate_isin};
use super::numeric::{
    detect_currency, is_currency_code, looks_like_amount, money_field, percent_field,
};

/// Confidence of a record bound from table columns.
pub const TABLE_CONFIDENCE: f64 = 0.9;
/// Confidence of a record found by scanning free text.
pub const TEXT_CONFIDENCE: f64 = 0.6;
/// Multiplier applied when the ISIN check digit does not match.
pub const INVALID_CHECKSUM_PENALTY: f64 = 0.5;

/// Longest run of capitalized words taken as a name.
const MAX_NAME_WORDS: usize = 6;

/// Securities plus the non-fatal findings made while building them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityExtraction {
    pub securities: Vec<Security>,
    pub warnings: Vec<ValidationWarning>,
}

fn normalize_isin_cell(cell: &str) -> String {
    cell.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

fn cell<'a>(row: &'a [String], index: Option<usize>) -> Option<&'a str> {
    index
        .and_then(|i| row.get(i))
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
}

/// Binding for a table, or `None` when its rows cannot describe holdings.
fn binding_for(table: &Table) -> Option<ColumnBinding> {
    if !table.semantic_type.may_hold_securities() {
        return None;
    }

    let binding = ColumnBinding::from_headers(&table.headers);
    if binding.is_recognized() {
        return Some(binding);
    }

    // Holdings sheets with unlabeled columns fall back to the fixed layout.
    if table.semantic_type == SemanticType::Portfolio && binding.bound_count() == 0 {
        return Some(ColumnBinding::positional(table.headers.len()));
    }

    None
}

/// Maps rows of recognizable holdings tables onto security records.
pub fn from_tables(tables: &[Table], warnings: &mut Vec<ValidationWarning>) -> Vec<Security> {
    let mut securities: Vec<Security> = Vec::new();
    let mut index_by_isin: HashMap<String, usize> = HashMap::new();

    for table in tables {
        let Some(binding) = binding_for(table) else {
            continue;
        };

        for row in &table.rows {
            let Some(security) = security_from_row(row, &binding, warnings) else {
                continue;
            };

            match index_by_isin.get(&security.isin) {
                Some(&existing) => {
                    securities[existing].back_fill(&security);
                }
                None => {
                    index_by_isin.insert(security.isin.clone(), securities.len());
                    securities.push(security);
                }
            }
        }
    }

    securities
}

fn security_from_row(
    row: &[String],
    binding: &ColumnBinding,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<Security> {
    let isin = cell(row, binding.isin)
        .map(normalize_isin_cell)
        .filter(|s| is_isin_shaped(s))
        .or_else(|| {
            row.iter()
                .map(|c| normalize_isin_cell(c))
                .find(|s| is_isin_shaped(s))
        })?;

    let mut security = Security::new(isin, SecuritySource::Table, TABLE_CONFIDENCE);
    security.name = cell(row, binding.name)
        .filter(|n| !is_isin_shaped(&normalize_isin_cell(n)))
        .map(str::to_string);

    let mut numeric = |field: SecurityField, percent: bool| -> Option<FieldValue> {
        let raw = cell(row, binding.get(field))?;
        let parsed = if percent {
            percent_field(raw)
        } else {
            money_field(raw)
        };
        let value = parsed?;
        if let FieldValue::Raw(text) = &value {
            warnings.push(ValidationWarning::UnparsedNumber {
                isin: security.isin.clone(),
                field: field.as_str().to_string(),
                raw: text.clone(),
            });
        }
        Some(value)
    };

    let quantity = numeric(SecurityField::Quantity, false);
    let price = numeric(SecurityField::Price, false);
    let value = numeric(SecurityField::Value, false);
    let percent_of_assets = numeric(SecurityField::PercentOfAssets, true);

    security.quantity = quantity;
    security.price = price;
    security.value = value;
    security.percent_of_assets = percent_of_assets;

    security.currency = cell(row, binding.currency)
        .map(|c| c.to_uppercase())
        .or_else(|| {
            cell(row, binding.value)
                .or_else(|| cell(row, binding.price))
                .and_then(detect_currency)
        });

    Some(security)
}

fn is_name_word(word: &str) -> bool {
    if word == "&" {
        return true;
    }
    let stripped = word.trim_matches(|c: char| !c.is_alphanumeric());
    let Some(first) = stripped.chars().next() else {
        return false;
    };
    first.is_uppercase()
        && !is_isin_shaped(stripped)
        && !stripped.eq_ignore_ascii_case("isin")
        && !is_currency_code(stripped)
}

fn clean_name(words: &[&str]) -> Option<String> {
    let mut words: Vec<&str> = words.to_vec();
    while words.first().is_some_and(|w| *w == "&") {
        words.remove(0);
    }
    while words.last().is_some_and(|w| *w == "&") {
        words.pop();
    }

    let name = words
        .iter()
        .map(|w| w.trim_matches(|c: char| matches!(c, ',' | ':' | ';' | '(' | ')' | '-')))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    (!name.is_empty()).then_some(name)
}

/// Name from the capitalized words right before the identifier, else right after.
fn infer_name(before: &str, after: &str) -> Option<String> {
    let preceding: Vec<&str> = before.split_whitespace().collect();
    let run_start = preceding
        .iter()
        .rposition(|w| !is_name_word(w))
        .map(|i| i + 1)
        .unwrap_or(0);
    let run = &preceding[run_start.max(preceding.len().saturating_sub(MAX_NAME_WORDS))..];
    if let Some(name) = clean_name(run) {
        return Some(name);
    }

    let following: Vec<&str> = after
        .split_whitespace()
        .skip_while(|w| w.chars().all(|c| !c.is_alphanumeric()))
        .take_while(|w| is_name_word(w))
        .take(MAX_NAME_WORDS)
        .collect();
    clean_name(&following)
}

/// Candidates for every ISIN-shaped token in `text`, one per ISIN.
pub fn from_text(text: &str) -> Vec<Security> {
    let mut securities: Vec<Security> = Vec::new();
    let mut index_by_isin: HashMap<String, usize> = HashMap::new();

    for line in text.lines() {
        let matches: Vec<(usize, usize, &str)> = find_isins(line).collect();
        for (n, &(start, end, isin)) in matches.iter().enumerate() {
            // Context for this identifier stops at the next identifier on the line.
            let context_end = matches.get(n + 1).map(|m| m.0).unwrap_or(line.len());
            let context_start = if n == 0 { 0 } else { matches[n - 1].1 };
            let before = &line[context_start..start];
            let after = &line[end..context_end];

            let mut security = Security::new(isin, SecuritySource::Text, TEXT_CONFIDENCE);
            security.name = infer_name(before, after);
            let amount = after
                .split_whitespace()
                .filter(|t| looks_like_amount(t))
                .last();
            security.value = amount.and_then(money_field);
            security.currency = detect_currency(after);

            match index_by_isin.get(isin) {
                Some(&existing) => {
                    securities[existing].back_fill(&security);
                }
                None => {
                    index_by_isin.insert(isin.to_string(), securities.len());
                    securities.push(security);
                }
            }
        }
    }

    securities
}

/// Table records first, in table order, then text-only records.
///
/// A table record keeps its own fields and is back-filled from the text
/// record with the same ISIN.
pub fn merge(table: Vec<Security>, text: Vec<Security>) -> Vec<Security> {
    let mut text_by_isin: HashMap<String, Security> = HashMap::new();
    let mut text_order: Vec<String> = Vec::new();
    for security in text {
        if !text_by_isin.contains_key(&security.isin) {
            text_order.push(security.isin.clone());
            text_by_isin.insert(security.isin.clone(), security);
        }
    }

    let mut merged = Vec::with_capacity(table.len() + text_order.len());
    for mut security in table {
        if let Some(found) = text_by_isin.remove(&security.isin) {
            if security.back_fill(&found) {
                security.source = SecuritySource::Merged;
            }
        }
        merged.push(security);
    }

    for isin in text_order {
        if let Some(security) = text_by_isin.remove(&isin) {
            merged.push(security);
        }
    }

    merged
}

/// Flags failed check digits. Records are kept with reduced confidence.
pub fn validate(securities: &mut [Security], warnings: &mut Vec<ValidationWarning>) {
    for security in securities.iter_mut() {
        security.isin_valid = validate_isin(&security.isin);
        if !security.isin_valid {
            security.confidence *= INVALID_CHECKSUM_PENALTY;
            warnings.push(ValidationWarning::InvalidIsinChecksum {
                isin: security.isin.clone(),
            });
        }
    }
}
