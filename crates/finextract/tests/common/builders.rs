//! Builders for statement fixtures.
//!
//! PDFs are generated with lopdf and workbooks are zipped by hand, so tests
//! never depend on binary files checked into the repository.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, Stream, StringFormat};

/// A two-holding portfolio worth 200,000 USD, Tesla being the larger.
pub const HOLDINGS_CSV: &str = "Security,ISIN,Quantity,Value,Currency\n\
Apple Inc,US0378331005,500,\"95,000.00\",USD\n\
Tesla Inc,US88160R1014,400,\"105,000.00\",USD\n";

/// Builder for single-page PDFs with positioned text.
pub struct PdfBuilder {
    operations: Vec<Operation>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self { operations: vec![] }
    }

    /// Show `text` with its baseline at (`x`, `y`) in PDF user space.
    pub fn text_at(mut self, x: i64, y: i64, text: &str) -> Self {
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(
                    text.as_bytes().to_vec(),
                    StringFormat::Literal,
                )],
            ),
            Operation::new("ET", vec![]),
        ]);
        self
    }

    /// One table row; cells start at the given x positions.
    pub fn row(self, y: i64, cells: &[(i64, &str)]) -> Self {
        cells
            .iter()
            .fold(self, |builder, (x, text)| builder.text_at(*x, y, text))
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = Content {
            operations: self.operations,
        };
        let encoded = content.encode().expect("Failed to encode page content");
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("Failed to serialize PDF");
        buffer
    }
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for XLSX workbooks with inline-string cells.
pub struct WorkbookBuilder {
    sheets: Vec<(String, Vec<Vec<String>>)>,
}

impl WorkbookBuilder {
    pub fn new() -> Self {
        Self { sheets: vec![] }
    }

    /// Add a sheet; the first row is the header row.
    pub fn sheet(mut self, name: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();
        self.sheets.push((name.to_string(), rows));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();

            let mut workbook = String::from(
                r#"<?xml version="1.0"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
            );
            let mut rels = String::from(r#"<?xml version="1.0"?><Relationships>"#);
            for (i, (name, _)) in self.sheets.iter().enumerate() {
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

            let entries = [
                ("xl/workbook.xml".to_string(), workbook),
                ("xl/_rels/workbook.xml.rels".to_string(), rels),
            ];
            let sheets = self
                .sheets
                .iter()
                .enumerate()
                .map(|(i, (_, rows))| (format!("xl/worksheets/sheet{}.xml", i + 1), sheet_xml(rows)));

            for (path, body) in entries.into_iter().chain(sheets) {
                zip.start_file(path, options)
                    .expect("Failed to start zip entry");
                zip.write_all(body.as_bytes())
                    .expect("Failed to write zip entry");
            }
            zip.finish().expect("Failed to finish workbook");
        }
        buffer.into_inner()
    }
}

impl Default for WorkbookBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn column_letter(index: usize) -> String {
    let mut name = String::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        name.insert(0, (b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    name
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn sheet_xml(rows: &[Vec<String>]) -> String {
    let mut xml = String::from("<worksheet><sheetData>");
    for (r, row) in rows.iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, cell) in row.iter().enumerate() {
            xml.push_str(&format!(
                r#"<c r="{}{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                column_letter(c),
                r + 1,
                escape(cell)
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
    }
}
