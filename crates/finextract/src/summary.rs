use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::extraction::numeric::is_currency_code;
use crate::extraction::{parse_money, parse_percent};
use crate::model::{ExtractionResult, Security, SemanticType, Table};

pub const DEFAULT_TOP_HOLDINGS: usize = 5;

const TOTAL_VALUE_LABELS: [&str; 3] = ["total value", "portfolio value", "total portfolio value"];

/// One asset class from an allocation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSlice {
    pub value: Option<f64>,
    pub weight: Option<f64>,
}

/// Where `totalValue` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalValueSource {
    Securities,
    Table,
    None,
}

/// Portfolio-level metrics. Derived on demand, never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub total_value: Option<f64>,
    pub total_value_source: TotalValueSource,
    pub currency: Option<String>,
    pub asset_allocation: BTreeMap<String, AllocationSlice>,
    pub top_holdings: Vec<Security>,
    pub total_securities: usize,
    /// `None` when no security carries a numeric value.
    pub average_value: Option<f64>,
    pub valid_isin_count: usize,
}

pub fn summarize(result: &ExtractionResult) -> PortfolioSummary {
    summarize_parts(&result.securities, &result.tables, DEFAULT_TOP_HOLDINGS)
}

pub fn summarize_parts(
    securities: &[Security],
    tables: &[Table],
    top_holdings: usize,
) -> PortfolioSummary {
    let values: Vec<f64> = securities.iter().filter_map(Security::numeric_value).collect();

    let (total_value, total_value_source) = if !values.is_empty() {
        (Some(values.iter().sum()), TotalValueSource::Securities)
    } else if let Some(total) = total_from_tables(tables) {
        (Some(total), TotalValueSource::Table)
    } else {
        (None, TotalValueSource::None)
    };

    let average_value = if securities.is_empty() || values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    };

    PortfolioSummary {
        total_value,
        total_value_source,
        currency: dominant_currency(securities),
        asset_allocation: asset_allocation(tables),
        top_holdings: top_by_value(securities, top_holdings),
        total_securities: securities.len(),
        average_value,
        valid_isin_count: securities.iter().filter(|s| s.isin_valid).count(),
    }
}

/// A whole-cell label such as `Total Value:` or `Portfolio Value (USD)`.
/// Longer phrases like `Total Value Change` or `Subtotal` do not count.
fn is_total_label(text: &str) -> bool {
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let words = match words.split_last() {
        Some((last, rest)) if is_currency_code(last) => rest,
        _ => &words[..],
    };
    let normalized = words.join(" ").to_lowercase();
    TOTAL_VALUE_LABELS.contains(&normalized.as_str())
}

/// First total found: a "total value" column, then a key/value row.
fn total_from_tables(tables: &[Table]) -> Option<f64> {
    tables.iter().find_map(|table| {
        let by_column = table
            .headers
            .iter()
            .position(|h| is_total_label(h))
            .and_then(|col| {
                table
                    .rows
                    .iter()
                    .find_map(|row| row.get(col).and_then(|c| parse_money(c)))
            });

        by_column.or_else(|| {
            table.rows.iter().find_map(|row| match row.as_slice() {
                [label, value, ..] if is_total_label(label) => parse_money(value),
                _ => None,
            })
        })
    })
}

fn asset_allocation(tables: &[Table]) -> BTreeMap<String, AllocationSlice> {
    let mut allocation = BTreeMap::new();

    for table in tables
        .iter()
        .filter(|t| t.semantic_type == SemanticType::Allocation)
    {
        for row in &table.rows {
            let class = row.first().map(|c| c.trim()).unwrap_or_default();
            if class.is_empty() {
                continue;
            }
            allocation.insert(
                class.to_string(),
                AllocationSlice {
                    value: row.get(1).and_then(|c| parse_money(c)),
                    weight: row.get(2).and_then(|c| parse_percent(c)),
                },
            );
        }
    }

    allocation
}

/// Descending by value; unvalued securities last; ties keep extraction order.
fn top_by_value(securities: &[Security], count: usize) -> Vec<Security> {
    let mut ranked: Vec<&Security> = securities.iter().collect();
    ranked.sort_by(|a, b| match (a.numeric_value(), b.numeric_value()) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    ranked.into_iter().take(count).cloned().collect()
}

/// Most frequent currency; the first seen wins a tie.
fn dominant_currency(securities: &[Security]) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (order, currency) in securities
        .iter()
        .filter_map(|s| s.currency.as_deref())
        .enumerate()
    {
        counts.entry(currency).or_insert((0, order)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(currency, _)| currency.to_string())
}
