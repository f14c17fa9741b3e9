use std::sync::LazyLock;

use regex::Regex;

use crate::model::FieldValue;

static RE_CURRENCY_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(USD|EUR|GBP|CHF|JPY|CAD|AUD|SEK|NOK|DKK|HKD|SGD)\b").unwrap());
static RE_NUMBER_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?[0-9][0-9.,]*-?$|^[+-]?[.,][0-9]+$").unwrap());

const CURRENCY_SYMBOLS: [(char, &str); 4] = [('$', "USD"), ('€', "EUR"), ('£', "GBP"), ('¥', "JPY")];

/// Parses a monetary amount.
///
/// Currency codes and symbols, thousands separators (`,` `.` `'` and spaces)
/// and accounting parentheses are handled. Anything else that is not part of
/// a number makes the parse fail instead of being dropped.
pub fn parse_money(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return n.is_finite().then_some(n);
    }

    let (body, parenthesized) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (inner, true),
        None => (trimmed, false),
    };

    let without_codes = RE_CURRENCY_CODE.replace_all(body, "");
    let compact: String = without_codes
        .chars()
        .filter(|c| {
            !c.is_whitespace()
                && *c != '\''
                && *c != '\u{2019}'
                && !CURRENCY_SYMBOLS.iter().any(|(symbol, _)| symbol == c)
        })
        .collect();

    if !RE_NUMBER_BODY.is_match(&compact) {
        return None;
    }

    let (negative, unsigned) = if let Some(rest) = compact.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = compact.strip_suffix('-') {
        (true, rest)
    } else {
        (false, compact.strip_prefix('+').unwrap_or(&compact))
    };

    let normalized = normalize_separators(unsigned)?;
    let value: f64 = normalized.parse().ok()?;
    let value = if negative || parenthesized { -value } else { value };
    value.is_finite().then_some(value)
}

/// Resolves which of `.` and `,` is the decimal separator.
fn normalize_separators(s: &str) -> Option<String> {
    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');

    let decimal = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (None, Some(c)) => {
            let single = s.matches(',').count() == 1;
            let decimals = s.len() - c - 1;
            (single && decimals != 3).then_some(',')
        }
        (Some(_), None) => (s.matches('.').count() == 1).then_some('.'),
        (None, None) => None,
    };

    let mut out = String::with_capacity(s.len());
    let mut seen_decimal = false;
    for c in s.chars() {
        match c {
            '0'..='9' => out.push(c),
            c if Some(c) == decimal => {
                if seen_decimal {
                    return None;
                }
                seen_decimal = true;
                out.push('.');
            }
            // Thousands separators only appear before the decimal mark.
            '.' | ',' if !seen_decimal => {}
            _ => return None,
        }
    }

    (!out.is_empty() && out != ".").then_some(out)
}

/// Parses a percentage such as `12.5%` or `12,5 %`. The number is returned
/// as written, not divided by 100.
pub fn parse_percent(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let without_sign = trimmed.strip_suffix('%').unwrap_or(trimmed);
    parse_money(without_sign)
}

/// Numeric cell to field value: `None` for blank, `Raw` when unparseable.
pub fn money_field(raw: &str) -> Option<FieldValue> {
    field_with(raw, parse_money)
}

pub fn percent_field(raw: &str) -> Option<FieldValue> {
    field_with(raw, parse_percent)
}

fn field_with(raw: &str, parse: fn(&str) -> Option<f64>) -> Option<FieldValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match parse(trimmed) {
        Some(n) => FieldValue::Number(n),
        None => FieldValue::Raw(trimmed.to_string()),
    })
}

/// ISO currency code carried by an amount, e.g. `USD 1,000` or `€95`.
pub fn detect_currency(raw: &str) -> Option<String> {
    if let Some(m) = RE_CURRENCY_CODE.find(raw) {
        return Some(m.as_str().to_string());
    }
    CURRENCY_SYMBOLS
        .iter()
        .find(|(symbol, _)| raw.contains(*symbol))
        .map(|(_, code)| code.to_string())
}

pub fn is_currency_code(token: &str) -> bool {
    RE_CURRENCY_CODE
        .find(token)
        .is_some_and(|m| m.start() == 0 && m.end() == token.len())
}

/// Whether a free-text token reads as an amount rather than a count.
pub fn looks_like_amount(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && token
            .chars()
            .any(|c| matches!(c, '.' | ',') || CURRENCY_SYMBOLS.iter().any(|(s, _)| *s == c))
        && parse_money(token).is_some()
}
