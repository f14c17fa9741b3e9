use serde::{Deserialize, Serialize};

/// Business meaning of a table; selects downstream processing rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Portfolio,
    Allocation,
    Performance,
    Metadata,
    General,
}

impl SemanticType {
    /// Exact, case-sensitive match against the known sheet vocabulary.
    pub fn from_sheet_name(name: &str) -> Self {
        match name {
            "Portfolio Holdings" => SemanticType::Portfolio,
            "Asset Allocation" => SemanticType::Allocation,
            "Performance" => SemanticType::Performance,
            "Account Information" => SemanticType::Metadata,
            _ => SemanticType::General,
        }
    }

    /// Guess a semantic type from header text, for sources without sheet names.
    pub fn infer_from_headers(headers: &[String]) -> Self {
        let joined = headers
            .iter()
            .map(|h| h.to_lowercase())
            .collect::<Vec<_>>()
            .join(" | ");

        if joined.contains("isin") || joined.contains("security") || joined.contains("holding") {
            SemanticType::Portfolio
        } else if joined.contains("asset class") || joined.contains("allocation") {
            SemanticType::Allocation
        } else if joined.contains("return") || joined.contains("performance") {
            SemanticType::Performance
        } else {
            SemanticType::General
        }
    }

    /// Whether rows of this table may describe individual securities.
    pub fn may_hold_securities(&self) -> bool {
        matches!(
            self,
            SemanticType::Portfolio | SemanticType::Allocation | SemanticType::General
        )
    }
}

/// Where in the source a table was found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TableSource {
    Page(u32),
    Sheet(String),
    File,
}

impl std::fmt::Display for TableSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableSource::Page(n) => write!(f, "page {}", n),
            TableSource::Sheet(name) => write!(f, "sheet '{}'", name),
            TableSource::File => write!(f, "file"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: String,
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub page_or_sheet: TableSource,
    pub semantic_type: SemanticType,
}

impl Table {
    /// Builds a table whose rows all share the header width.
    ///
    /// Short rows are padded with empty strings; when a row is wider than the
    /// header, the header is padded instead so no cell is dropped.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        mut headers: Vec<String>,
        mut rows: Vec<Vec<String>>,
        page_or_sheet: TableSource,
        semantic_type: SemanticType,
    ) -> Self {
        let width = rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(headers.len()))
            .max()
            .unwrap_or(0);

        headers.resize(width, String::new());
        for row in &mut rows {
            row.resize(width, String::new());
        }

        Self {
            id: id.into(),
            title: title.into(),
            headers,
            rows,
            page_or_sheet,
            semantic_type,
        }
    }

    /// Renders headers then rows, cells joined by ", ", lines by "\n".
    pub fn to_plain_text(&self) -> String {
        std::iter::once(&self.headers)
            .chain(self.rows.iter())
            .map(|cells| cells.join(", "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.headers.iter().all(|h| h.is_empty()) && self.rows.is_empty()
    }
}
