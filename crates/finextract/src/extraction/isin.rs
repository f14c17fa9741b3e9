use std::sync::LazyLock;

use regex::Regex;

/// Two uppercase letters, nine alphanumerics, one check digit.
static RE_ISIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2}[A-Z0-9]{9}[0-9]\b").unwrap());

pub const ISIN_LENGTH: usize = 12;

/// True when `s` (already trimmed) has the structural ISIN shape.
pub fn is_isin_shaped(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == ISIN_LENGTH
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..11]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        && bytes[11].is_ascii_digit()
}

/// Byte ranges of every ISIN-shaped token in `text`, in order.
pub fn find_isins(text: &str) -> impl Iterator<Item = (usize, usize, &str)> {
    RE_ISIN
        .find_iter(text)
        .map(|m| (m.start(), m.end(), m.as_str()))
}

/// Check-digit validation: letters expand to two digits (A=10 .. Z=35),
/// then the Luhn sum over the expanded digit string must be a multiple of 10.
pub fn validate_isin(isin: &str) -> bool {
    if !is_isin_shaped(isin) {
        return false;
    }

    let digits: Vec<u32> = isin
        .chars()
        .filter_map(|c| c.to_digit(36))
        .flat_map(|v| {
            if v >= 10 {
                vec![v / 10, v % 10]
            } else {
                vec![v]
            }
        })
        .collect();

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}
