//! Header-to-field binding for holdings tables.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityField {
    Name,
    Isin,
    Quantity,
    Price,
    Value,
    Currency,
    PercentOfAssets,
}

impl SecurityField {
    /// Column order assumed when headers carry no recognizable names.
    pub const POSITIONAL_ORDER: [SecurityField; 7] = [
        SecurityField::Name,
        SecurityField::Isin,
        SecurityField::Quantity,
        SecurityField::Price,
        SecurityField::Value,
        SecurityField::Currency,
        SecurityField::PercentOfAssets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityField::Name => "name",
            SecurityField::Isin => "isin",
            SecurityField::Quantity => "quantity",
            SecurityField::Price => "price",
            SecurityField::Value => "value",
            SecurityField::Currency => "currency",
            SecurityField::PercentOfAssets => "percentOfAssets",
        }
    }
}

/// Lowercase, punctuation folded to spaces, `%` kept.
fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '%' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn classify_header(header: &str) -> Option<SecurityField> {
    let h = normalize_header(header);
    if h.is_empty() {
        return None;
    }
    let has = |needles: &[&str]| needles.iter().any(|n| h.contains(n));
    let word = |words: &[&str]| h.split(' ').any(|w| words.contains(&w));

    if has(&["isin"]) {
        Some(SecurityField::Isin)
    } else if has(&["%", "percent", "weight", "of assets", "allocation"]) || word(&["pct"]) {
        Some(SecurityField::PercentOfAssets)
    } else if has(&["currency"]) || word(&["ccy", "curr", "cur"]) {
        Some(SecurityField::Currency)
    } else if has(&["price"]) {
        Some(SecurityField::Price)
    } else if has(&["value", "amount"]) {
        Some(SecurityField::Value)
    } else if has(&["quantity", "shares", "units", "nominal"]) || word(&["qty"]) {
        Some(SecurityField::Quantity)
    } else if has(&[
        "name",
        "security",
        "description",
        "holding",
        "instrument",
        "asset",
        "position",
        "company",
    ]) {
        Some(SecurityField::Name)
    } else {
        None
    }
}

/// Column index for each security field. The first matching header wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnBinding {
    pub name: Option<usize>,
    pub isin: Option<usize>,
    pub quantity: Option<usize>,
    pub price: Option<usize>,
    pub value: Option<usize>,
    pub currency: Option<usize>,
    pub percent_of_assets: Option<usize>,
}

impl ColumnBinding {
    pub fn from_headers(headers: &[String]) -> Self {
        let mut binding = Self::default();
        for (index, header) in headers.iter().enumerate() {
            if let Some(field) = classify_header(header) {
                let slot = binding.slot_mut(field);
                if slot.is_none() {
                    *slot = Some(index);
                }
            }
        }
        binding
    }

    pub fn positional(width: usize) -> Self {
        let mut binding = Self::default();
        for (index, field) in SecurityField::POSITIONAL_ORDER
            .iter()
            .enumerate()
            .take(width)
        {
            *binding.slot_mut(*field) = Some(index);
        }
        binding
    }

    fn slot_mut(&mut self, field: SecurityField) -> &mut Option<usize> {
        match field {
            SecurityField::Name => &mut self.name,
            SecurityField::Isin => &mut self.isin,
            SecurityField::Quantity => &mut self.quantity,
            SecurityField::Price => &mut self.price,
            SecurityField::Value => &mut self.value,
            SecurityField::Currency => &mut self.currency,
            SecurityField::PercentOfAssets => &mut self.percent_of_assets,
        }
    }

    pub fn get(&self, field: SecurityField) -> Option<usize> {
        match field {
            SecurityField::Name => self.name,
            SecurityField::Isin => self.isin,
            SecurityField::Quantity => self.quantity,
            SecurityField::Price => self.price,
            SecurityField::Value => self.value,
            SecurityField::Currency => self.currency,
            SecurityField::PercentOfAssets => self.percent_of_assets,
        }
    }

    pub fn bound_count(&self) -> usize {
        SecurityField::POSITIONAL_ORDER
            .iter()
            .filter(|f| self.get(**f).is_some())
            .count()
    }

    /// Enough financial columns to treat rows as holdings: an ISIN column,
    /// or a name column next to at least one numeric column.
    pub fn is_recognized(&self) -> bool {
        self.isin.is_some()
            || (self.name.is_some()
                && (self.value.is_some() || self.quantity.is_some() || self.price.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(v: &[&str]) -> Vec<String> {
        v.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn test_classify_common_headers() {
        assert_eq!(classify_header("ISIN"), Some(SecurityField::Isin));
        assert_eq!(classify_header("isin code"), Some(SecurityField::Isin));
        assert_eq!(classify_header("% of Assets"), Some(SecurityField::PercentOfAssets));
        assert_eq!(classify_header("Weight"), Some(SecurityField::PercentOfAssets));
        assert_eq!(classify_header("Market Value (USD)"), Some(SecurityField::Value));
        assert_eq!(classify_header("Price Currency"), Some(SecurityField::Currency));
        assert_eq!(classify_header("Unit Price"), Some(SecurityField::Price));
        assert_eq!(classify_header("Qty."), Some(SecurityField::Quantity));
        assert_eq!(classify_header("Shares"), Some(SecurityField::Quantity));
        assert_eq!(classify_header("Security Name"), Some(SecurityField::Name));
        assert_eq!(classify_header("CCY"), Some(SecurityField::Currency));
        assert_eq!(classify_header("Notes"), None);
        assert_eq!(classify_header(""), None);
    }

    #[test]
    fn test_binding_ignores_column_order() {
        let binding = ColumnBinding::from_headers(&headers(&[
            "Value", "ISIN", "Security", "Quantity", "Currency",
        ]));
        assert_eq!(binding.value, Some(0));
        assert_eq!(binding.isin, Some(1));
        assert_eq!(binding.name, Some(2));
        assert_eq!(binding.quantity, Some(3));
        assert_eq!(binding.currency, Some(4));
        assert_eq!(binding.price, None);
        assert!(binding.is_recognized());
    }

    #[test]
    fn test_first_matching_header_wins() {
        let binding = ColumnBinding::from_headers(&headers(&["Security", "Description"]));
        assert_eq!(binding.name, Some(0));
        assert_eq!(binding.bound_count(), 1);
        assert!(!binding.is_recognized());
    }

    #[test]
    fn test_positional_binding() {
        let binding = ColumnBinding::positional(3);
        assert_eq!(binding.name, Some(0));
        assert_eq!(binding.isin, Some(1));
        assert_eq!(binding.quantity, Some(2));
        assert_eq!(binding.price, None);

        let full = ColumnBinding::positional(9);
        assert_eq!(full.percent_of_assets, Some(6));
        assert_eq!(full.bound_count(), 7);
    }
}
