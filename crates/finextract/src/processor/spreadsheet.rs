use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};

use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;

use crate::error::ProcessError;
use crate::model::{Document, FileType, SemanticType, Table, TableSource};
use crate::processor::{DocumentProcessor, ExtractedContent};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const BIFF_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// Sheet whose rows are reduced to a two-column key/value table.
const ACCOUNT_INFORMATION_SHEET: &str = "Account Information";

/// Reads Office Open XML workbooks, one table per non-empty sheet.
pub struct SpreadsheetProcessor;

impl SpreadsheetProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SpreadsheetProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor for SpreadsheetProcessor {
    fn name(&self) -> &'static str {
        "spreadsheet"
    }

    fn extract(&self, document: &Document, bytes: &[u8]) -> Result<ExtractedContent, ProcessError> {
        let _span = tracing::info_span!("processor.spreadsheet").entered();

        let mut archive = open_workbook(bytes)?;
        let shared_strings = read_shared_strings(&mut archive)?;
        let sheets = read_sheet_list(&mut archive)?;

        let mut tables = Vec::new();
        for (index, sheet) in sheets.iter().enumerate() {
            let xml = read_part(&mut archive, &sheet.path)?;
            let grid = parse_sheet_xml(&xml, &shared_strings)?;
            if let Some(table) = sheet_to_table(index, &sheet.name, grid) {
                tables.push(table);
            }
        }

        tracing::debug!(
            "Workbook {} has {} sheets, {} non-empty",
            document.file_name,
            sheets.len(),
            tables.len()
        );

        let text = tables
            .iter()
            .map(|t| format!("{}\n{}", t.title, t.to_plain_text()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut content = ExtractedContent {
            text,
            tables,
            ..Default::default()
        };
        content
            .metadata
            .insert("sheetCount".to_string(), sheets.len().into());

        Ok(content)
    }

    fn fallback_text(&self, bytes: &[u8]) -> Option<String> {
        let mut archive = open_workbook(bytes).ok()?;
        let strings = read_shared_strings(&mut archive).ok()?;
        if strings.is_empty() {
            return None;
        }
        Some(strings.join("\n"))
    }

    fn supports(&self, format: FileType) -> bool {
        format.is_spreadsheet()
    }
}

struct SheetEntry {
    name: String,
    path: String,
}

fn open_workbook(bytes: &[u8]) -> Result<zip::ZipArchive<Cursor<&[u8]>>, ProcessError> {
    if bytes.starts_with(BIFF_MAGIC) {
        return Err(ProcessError::SpreadsheetProcessing(
            "legacy binary (BIFF) .xls workbooks are not supported, save as .xlsx".to_string(),
        ));
    }
    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(ProcessError::SpreadsheetProcessing(
            "not an Office Open XML workbook".to_string(),
        ));
    }

    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
        ProcessError::SpreadsheetProcessing(format!("Failed to open workbook: {}", e))
    })
}

fn read_part<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<String, ProcessError> {
    let mut part = archive.by_name(name).map_err(|e| {
        ProcessError::SpreadsheetProcessing(format!("Failed to find {}: {}", name, e))
    })?;

    let mut xml = String::new();
    part.read_to_string(&mut xml).map_err(|e| {
        ProcessError::SpreadsheetProcessing(format!("Failed to read {}: {}", name, e))
    })?;

    Ok(xml)
}

fn read_optional_part<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ProcessError> {
    if archive.index_for_name(name).is_none() {
        return Ok(None);
    }
    read_part(archive, name).map(Some)
}

fn xml_error(part: &str, e: quick_xml::Error) -> ProcessError {
    ProcessError::SpreadsheetProcessing(format!("XML parsing error in {}: {}", part, e))
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn resolve_reference(reference: &BytesRef<'_>) -> Option<char> {
    if let Ok(Some(c)) = reference.resolve_char_ref() {
        return Some(c);
    }
    let name: &[u8] = reference;
    match name {
        b"amp" => Some('&'),
        b"lt" => Some('<'),
        b"gt" => Some('>'),
        b"quot" => Some('"'),
        b"apos" => Some('\''),
        _ => None,
    }
}

fn read_shared_strings<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<String>, ProcessError> {
    match read_optional_part(archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml),
        None => Ok(Vec::new()),
    }
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, ProcessError> {
    let mut reader = Reader::from_str(xml);

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // Phonetic runs repeat the text in another script.
    let mut in_phonetic = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = !in_phonetic,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(String::new());
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    current.push_str(&e.decode().unwrap_or_default());
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text {
                    if let Some(c) = resolve_reference(&e) {
                        current.push(c);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("sharedStrings.xml", e)),
            _ => {}
        }
    }

    Ok(strings)
}

fn read_sheet_list<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<SheetEntry>, ProcessError> {
    let workbook = read_part(archive, "xl/workbook.xml")?;
    let relationships = match read_optional_part(archive, "xl/_rels/workbook.xml.rels")? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };

    let declared = parse_workbook(&workbook)?;
    let sheets = declared
        .into_iter()
        .enumerate()
        .map(|(index, (name, rel_id))| {
            let path = rel_id
                .and_then(|id| relationships.get(&id))
                .map(|target| resolve_target(target))
                .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", index + 1));
            SheetEntry { name, path }
        })
        .collect();

    Ok(sheets)
}

/// Sheet names in workbook order, with their relationship id.
fn parse_workbook(xml: &str) -> Result<Vec<(String, Option<String>)>, ProcessError> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    let name = attribute(e, b"name").unwrap_or_default();
                    sheets.push((name, attribute(e, b"id")));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("workbook.xml", e)),
            _ => {}
        }
    }

    Ok(sheets)
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, ProcessError> {
    let mut reader = Reader::from_str(xml);
    let mut relationships = HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    if let (Some(id), Some(target)) = (attribute(e, b"Id"), attribute(e, b"Target"))
                    {
                        relationships.insert(id, target);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("workbook.xml.rels", e)),
            _ => {}
        }
    }

    Ok(relationships)
}

/// Relationship targets are relative to `xl/` unless absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

/// Zero-based column index from a cell reference such as `AB12`.
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }

    let index = letters
        .iter()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize);
    Some(index - 1)
}

/// Parses worksheet XML into rows of cell strings. Blank rows are dropped.
fn parse_sheet_xml(xml: &str, shared_strings: &[String]) -> Result<Vec<Vec<String>>, ProcessError> {
    let mut reader = Reader::from_str(xml);

    let mut grid = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut next_column = 0usize;

    let mut cell_column = 0usize;
    let mut cell_type: Option<String> = None;
    let mut cell_value = String::new();
    let mut capture = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    row.clear();
                    next_column = 0;
                }
                b"c" => {
                    cell_column = attribute(e, b"r")
                        .and_then(|r| column_index(&r))
                        .unwrap_or(next_column);
                    cell_type = attribute(e, b"t");
                    cell_value.clear();
                }
                b"v" => capture = true,
                b"t" => capture = !in_phonetic,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"c" => {
                    next_column = attribute(e, b"r")
                        .and_then(|r| column_index(&r))
                        .unwrap_or(next_column)
                        + 1;
                }
                b"row" => next_column = 0,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"rPh" => in_phonetic = false,
                b"c" => {
                    let value = resolve_cell(cell_type.as_deref(), &cell_value, shared_strings);
                    if row.len() <= cell_column {
                        row.resize(cell_column + 1, String::new());
                    }
                    row[cell_column] = value;
                    next_column = cell_column + 1;
                }
                b"row" => {
                    if row.iter().any(|c| !c.is_empty()) {
                        grid.push(std::mem::take(&mut row));
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if capture {
                    cell_value.push_str(&e.decode().unwrap_or_default());
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if capture {
                    if let Some(c) = resolve_reference(&e) {
                        cell_value.push(c);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("worksheet", e)),
            _ => {}
        }
    }

    Ok(grid)
}

fn resolve_cell(cell_type: Option<&str>, raw: &str, shared_strings: &[String]) -> String {
    let value = match cell_type {
        Some("s") => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i))
            .cloned()
            .unwrap_or_default(),
        Some("b") => match raw.trim() {
            "1" => "TRUE".to_string(),
            _ => "FALSE".to_string(),
        },
        _ => raw.to_string(),
    };
    value.trim().to_string()
}

fn sheet_to_table(index: usize, sheet_name: &str, grid: Vec<Vec<String>>) -> Option<Table> {
    let semantic_type = SemanticType::from_sheet_name(sheet_name);
    let id = format!("sheet-{}", index + 1);
    let source = TableSource::Sheet(sheet_name.to_string());

    if sheet_name == ACCOUNT_INFORMATION_SHEET {
        let mut pairs: Vec<Vec<String>> = grid
            .into_iter()
            .map(|mut row| {
                row.resize(2, String::new());
                row
            })
            .collect();
        if pairs.first().is_some_and(|r| is_key_value_header(r)) {
            pairs.remove(0);
        }
        return Some(Table::new(
            id,
            sheet_name,
            vec!["Key".to_string(), "Value".to_string()],
            pairs,
            source,
            semantic_type,
        ));
    }

    let mut rows = grid.into_iter();
    let headers = rows.next()?;
    Some(Table::new(
        id,
        sheet_name,
        headers,
        rows.collect(),
        source,
        semantic_type,
    ))
}

fn is_key_value_header(row: &[String]) -> bool {
    let first = row[0].to_lowercase();
    let second = row[1].to_lowercase();
    matches!(first.as_str(), "key" | "field" | "property" | "item")
        && matches!(second.as_str(), "value" | "details")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn workbook_bytes(sheets: &[(&str, &str)], shared: Option<&str>) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();

            let mut workbook = String::from(
                r#"<?xml version="1.0"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
            );
            let mut rels = String::from(r#"<?xml version="1.0"?><Relationships>"#);
            for (i, (name, _)) in sheets.iter().enumerate() {
                workbook.push_str(&format!(
                    r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                    name,
                    i + 1,
                    i + 1
                ));
                rels.push_str(&format!(
                    r#"<Relationship Id="rId{}" Target="worksheets/sheet{}.xml"/>"#,
                    i + 1,
                    i + 1
                ));
            }
            workbook.push_str("</sheets></workbook>");
            rels.push_str("</Relationships>");

            zip.start_file("xl/workbook.xml", options).unwrap();
            zip.write_all(workbook.as_bytes()).unwrap();
            zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
            zip.write_all(rels.as_bytes()).unwrap();
            if let Some(shared) = shared {
                zip.start_file("xl/sharedStrings.xml", options).unwrap();
                zip.write_all(shared.as_bytes()).unwrap();
            }
            for (i, (_, data)) in sheets.iter().enumerate() {
                zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)
                    .unwrap();
                zip.write_all(data.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buffer.into_inner()
    }

    fn document(name: &str) -> Document {
        Document {
            id: "doc-1".to_string(),
            source_path: PathBuf::from(name),
            file_name: name.to_string(),
            file_type: FileType::Xlsx,
            size_bytes: 0,
            mime_type: None,
            uploaded_at: chrono::Utc::now(),
        }
    }

    fn sheet(rows: &str) -> String {
        format!("<worksheet><sheetData>{}</sheetData></worksheet>", rows)
    }

    #[test]
    fn test_supports_spreadsheet_formats() {
        let processor = SpreadsheetProcessor::new();
        assert!(processor.supports(FileType::Xlsx));
        assert!(processor.supports(FileType::Xls));
        assert!(!processor.supports(FileType::Csv));
        assert!(!processor.supports(FileType::Pdf));
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("C7"), Some(2));
        assert_eq!(column_index("Z1"), Some(25));
        assert_eq!(column_index("AA3"), Some(26));
        assert_eq!(column_index("12"), None);
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_target("/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
    }

    #[test]
    fn test_shared_strings_with_rich_text_and_entities() {
        let xml = r#"<sst><si><t>Apple Inc</t></si><si><r><t>Johnson </t></r><r><t>&amp; Johnson</t></r></si><si/></sst>"#;
        let strings = parse_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["Apple Inc", "Johnson & Johnson", ""]);
    }

    #[test]
    fn test_sheet_cells_by_type_and_gaps() {
        let xml = sheet(
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="inlineStr"><is><t>Value</t></is></c></row>
               <row r="2"><c r="A2" t="b"><v>1</v></c><c r="B2"><v>95000</v></c></row>
               <row r="3"><c r="A3"/></row>"#,
        );
        let grid = parse_sheet_xml(&xml, &["Security".to_string()]).unwrap();
        assert_eq!(
            grid,
            vec![
                vec!["Security".to_string(), String::new(), "Value".to_string()],
                vec!["TRUE".to_string(), "95000".to_string()],
            ]
        );
    }

    #[test]
    fn test_extract_one_table_per_sheet_with_semantic_types() {
        let shared = r#"<sst><si><t>Asset Class</t></si><si><t>Value</t></si><si><t>Equities</t></si><si><t>Name</t></si></sst>"#;
        let allocation = sheet(
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
               <row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>120000</v></c></row>"#,
        );
        let other = sheet(r#"<row r="1"><c r="A1" t="s"><v>3</v></c></row>"#);
        let empty = sheet("");
        let bytes = workbook_bytes(
            &[
                ("Asset Allocation", &allocation),
                ("Notes", &other),
                ("Blank", &empty),
            ],
            Some(shared),
        );

        let content = SpreadsheetProcessor::new()
            .extract(&document("book.xlsx"), &bytes)
            .unwrap();

        assert_eq!(content.tables.len(), 2);
        assert_eq!(content.tables[0].semantic_type, SemanticType::Allocation);
        assert_eq!(content.tables[0].headers, vec!["Asset Class", "Value"]);
        assert_eq!(content.tables[0].rows, vec![vec!["Equities", "120000"]]);
        assert_eq!(
            content.tables[0].page_or_sheet,
            TableSource::Sheet("Asset Allocation".to_string())
        );
        assert_eq!(content.tables[1].semantic_type, SemanticType::General);
        assert!(content.text.contains("Equities, 120000"));
        assert_eq!(content.metadata["sheetCount"], 3);
    }

    #[test]
    fn test_account_information_is_key_value() {
        let info = sheet(
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>Key</t></is></c><c r="B1" t="inlineStr"><is><t>Value</t></is></c></row>
               <row r="2"><c r="A2" t="inlineStr"><is><t>Account</t></is></c><c r="B2" t="inlineStr"><is><t>12345</t></is></c><c r="C2" t="inlineStr"><is><t>extra</t></is></c></row>
               <row r="3"><c r="A3" t="inlineStr"><is><t>Owner</t></is></c></row>"#,
        );
        let bytes = workbook_bytes(&[("Account Information", &info)], None);

        let content = SpreadsheetProcessor::new()
            .extract(&document("book.xlsx"), &bytes)
            .unwrap();

        let table = &content.tables[0];
        assert_eq!(table.semantic_type, SemanticType::Metadata);
        assert_eq!(table.headers, vec!["Key", "Value"]);
        assert_eq!(
            table.rows,
            vec![vec!["Account", "12345"], vec!["Owner", ""]]
        );
    }

    #[test]
    fn test_legacy_xls_is_parse_error() {
        let bytes = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        let result = SpreadsheetProcessor::new().extract(&document("old.xls"), &bytes);
        match result {
            Err(ProcessError::SpreadsheetProcessing(msg)) => assert!(msg.contains("BIFF")),
            other => panic!("Expected SpreadsheetProcessing error, got {:?}", other),
        }
    }

    #[test]
    fn test_fallback_uses_shared_strings() {
        let shared = r#"<sst><si><t>Apple</t></si><si><t>US0378331005</t></si></sst>"#;
        let mut bytes = workbook_bytes(
            &[("Sheet1", "<worksheet><sheetData></row></worksheet>")],
            Some(shared),
        );

        let processor = SpreadsheetProcessor::new();
        assert!(processor.extract(&document("book.xlsx"), &bytes).is_err());
        assert_eq!(
            processor.fallback_text(&bytes).as_deref(),
            Some("Apple\nUS0378331005")
        );

        bytes.truncate(2);
        assert!(processor.fallback_text(&bytes).is_none());
    }
}
