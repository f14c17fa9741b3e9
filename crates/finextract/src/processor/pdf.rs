use lopdf::content::{Content, Operation};
use lopdf::Object;

use crate::error::ProcessError;
use crate::model::{Document, FileType, SemanticType, Table, TableSource};
use crate::processor::{DocumentProcessor, ExtractedContent};

/// Average glyph advance as a fraction of the font size. Fonts are not
/// measured, so fragment widths are estimates.
const GLYPH_WIDTH_EM: f32 = 0.5;

/// TJ adjustments (thousandths of an em) beyond which a word space is assumed.
const TJ_SPACE_ADJUSTMENT: f32 = 250.0;

/// TJ adjustments beyond which the run is split into separate fragments.
const TJ_SPLIT_ADJUSTMENT: f32 = 1000.0;

pub struct PdfProcessor {
    line_merge_threshold: f32,
    column_gap_threshold: f32,
}

impl PdfProcessor {
    pub fn new(line_merge_threshold: f32, column_gap_threshold: f32) -> Self {
        Self {
            line_merge_threshold,
            column_gap_threshold,
        }
    }
}

impl Default for PdfProcessor {
    fn default() -> Self {
        Self::new(5.0, 15.0)
    }
}

impl DocumentProcessor for PdfProcessor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extract(&self, document: &Document, bytes: &[u8]) -> Result<ExtractedContent, ProcessError> {
        let _span = tracing::info_span!("processor.pdf").entered();

        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| ProcessError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

        let pages = doc.get_pages();
        let mut page_texts = Vec::with_capacity(pages.len());
        let mut tables = Vec::new();

        for (&page_number, &page_id) in pages.iter() {
            if doc.get_page_contents(page_id).is_empty() {
                page_texts.push(String::new());
                continue;
            }

            let raw = doc.get_page_content(page_id).map_err(|e| {
                ProcessError::PdfProcessing(format!(
                    "Failed to read content of page {}: {}",
                    page_number, e
                ))
            })?;
            let content = Content::decode(&raw).map_err(|e| {
                ProcessError::PdfProcessing(format!(
                    "Failed to decode content of page {}: {}",
                    page_number, e
                ))
            })?;

            let fragments = collect_fragments(&content.operations);
            if fragments.is_empty() {
                // Text drawn through XObjects or CID fonts; take lopdf's reading.
                page_texts.push(doc.extract_text(&[page_number]).unwrap_or_default());
                continue;
            }

            let lines = group_lines(fragments, self.line_merge_threshold);
            page_texts.push(render_lines(&lines));
            tables.extend(detect_tables(&lines, page_number, self.column_gap_threshold));
        }

        tracing::debug!(
            "PDF {} has {} pages, {} tables",
            document.file_name,
            pages.len(),
            tables.len()
        );

        let mut content = ExtractedContent {
            text: page_texts.join("\n\n"),
            tables,
            ..Default::default()
        };
        content
            .metadata
            .insert("pageCount".to_string(), pages.len().into());

        Ok(content)
    }

    fn fallback_text(&self, bytes: &[u8]) -> Option<String> {
        let doc = lopdf::Document::load_mem(bytes).ok()?;

        let mut text = String::new();
        for (page_num, _) in doc.get_pages() {
            if let Ok(page_text) = doc.extract_text(&[page_num]) {
                text.push_str(&page_text);
                text.push('\n');
            }
        }

        Some(text)
    }

    fn supports(&self, format: FileType) -> bool {
        matches!(format, FileType::Pdf)
    }
}

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other`
    fn then(&self, other: &Matrix) -> Matrix {
        let [a0, a1, a2, a3, a4, a5] = self.0;
        let [b0, b1, b2, b3, b4, b5] = other.0;
        Matrix([
            a0 * b0 + a1 * b2,
            a0 * b1 + a1 * b3,
            a2 * b0 + a3 * b2,
            a2 * b1 + a3 * b3,
            a4 * b0 + a5 * b2 + b4,
            a4 * b1 + a5 * b3 + b5,
        ])
    }

    fn origin(&self) -> (f32, f32) {
        (self.0[4], self.0[5])
    }
}

/// A run of text at one device-space position.
#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    x: f32,
    y: f32,
    end_x: f32,
    text: String,
}

#[derive(Debug, Clone)]
struct TextState {
    ctm: Matrix,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font_size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font_size: 12.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
        }
    }
}

impl TextState {
    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn device_origin(&self) -> (f32, f32) {
        self.text_matrix.then(&self.ctm).origin()
    }

    fn advance(&mut self, text_space_dx: f32) {
        self.text_matrix = Matrix::translate(text_space_dx, 0.0).then(&self.text_matrix);
    }

    /// Estimated text-space width of `text` including spacing operators.
    fn width_of(&self, text: &str) -> f32 {
        text.chars()
            .map(|c| {
                let mut w = GLYPH_WIDTH_EM * self.font_size + self.char_spacing;
                if c == ' ' {
                    w += self.word_spacing;
                }
                w * self.horizontal_scale
            })
            .sum()
    }

    /// Emits a fragment for `text` at the current position and moves past it.
    fn show(&mut self, text: String, fragments: &mut Vec<Fragment>) {
        let (x, y) = self.device_origin();
        let width = self.width_of(&text);
        self.advance(width);
        let (end_x, _) = self.device_origin();

        if !text.trim().is_empty() {
            fragments.push(Fragment {
                x,
                y,
                end_x,
                text,
            });
        }
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, operand) in out.iter_mut().zip(operands) {
        *slot = number(operand)?;
    }
    Some(out)
}

/// PDF text strings: UTF-16BE with a byte-order mark, else single-byte.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn string_operand(operands: &[Object], index: usize) -> Option<String> {
    match operands.get(index) {
        Some(Object::String(bytes, _)) => Some(decode_pdf_string(bytes)),
        _ => None,
    }
}

fn collect_fragments(operations: &[Operation]) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut state = TextState::default();
    let mut saved: Vec<Matrix> = Vec::new();

    for op in operations {
        let operands = op.operands.as_slice();
        match op.operator.as_str() {
            "q" => saved.push(state.ctm),
            "Q" => {
                if let Some(ctm) = saved.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = numbers::<6>(operands) {
                    state.ctm = Matrix(m).then(&state.ctm);
                }
            }
            "BT" => {
                state.text_matrix = Matrix::IDENTITY;
                state.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(size) = operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some([leading]) = numbers::<1>(operands) {
                    state.leading = leading;
                }
            }
            "Tc" => {
                if let Some([spacing]) = numbers::<1>(operands) {
                    state.char_spacing = spacing;
                }
            }
            "Tw" => {
                if let Some([spacing]) = numbers::<1>(operands) {
                    state.word_spacing = spacing;
                }
            }
            "Tz" => {
                if let Some([scale]) = numbers::<1>(operands) {
                    state.horizontal_scale = scale / 100.0;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    state.next_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    state.leading = -ty;
                    state.next_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = numbers::<6>(operands) {
                    state.line_matrix = Matrix(m);
                    state.text_matrix = Matrix(m);
                }
            }
            "T*" => {
                let leading = state.leading;
                state.next_line(0.0, -leading);
            }
            "Tj" => {
                if let Some(text) = string_operand(operands, 0) {
                    state.show(text, &mut fragments);
                }
            }
            "'" => {
                let leading = state.leading;
                state.next_line(0.0, -leading);
                if let Some(text) = string_operand(operands, 0) {
                    state.show(text, &mut fragments);
                }
            }
            "\"" => {
                if let Some([word, chars]) = numbers::<2>(operands) {
                    state.word_spacing = word;
                    state.char_spacing = chars;
                }
                let leading = state.leading;
                state.next_line(0.0, -leading);
                if let Some(text) = string_operand(operands, 2) {
                    state.show(text, &mut fragments);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    show_positioned(&mut state, items, &mut fragments);
                }
            }
            _ => {}
        }
    }

    fragments
}

/// `TJ`: strings interleaved with kerning adjustments.
fn show_positioned(state: &mut TextState, items: &[Object], fragments: &mut Vec<Fragment>) {
    let mut pending = String::new();

    for item in items {
        if let Object::String(bytes, _) = item {
            pending.push_str(&decode_pdf_string(bytes));
            continue;
        }

        let Some(adjustment) = number(item) else {
            continue;
        };
        let shift = -adjustment / 1000.0 * state.font_size * state.horizontal_scale;

        // Smaller kerning is absorbed by the width estimate.
        if -adjustment >= TJ_SPLIT_ADJUSTMENT {
            state.show(std::mem::take(&mut pending), fragments);
            state.advance(shift);
        } else if -adjustment >= TJ_SPACE_ADJUSTMENT && !pending.ends_with(' ') {
            pending.push(' ');
        }
    }

    state.show(pending, fragments);
}

#[derive(Debug, Clone)]
struct Line {
    y: f32,
    fragments: Vec<Fragment>,
}

/// Fragments whose baselines differ by less than `threshold` share a line.
fn group_lines(mut fragments: Vec<Fragment>, threshold: f32) -> Vec<Line> {
    // Top of page first, then left to right.
    fragments.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<Line> = Vec::new();
    for fragment in fragments {
        match lines.last_mut() {
            Some(line) if (line.y - fragment.y).abs() < threshold => {
                line.fragments.push(fragment);
            }
            _ => lines.push(Line {
                y: fragment.y,
                fragments: vec![fragment],
            }),
        }
    }

    for line in &mut lines {
        line.fragments.sort_by(|a, b| a.x.total_cmp(&b.x));
    }

    lines
}

fn join_fragments<'a>(fragments: impl Iterator<Item = &'a Fragment>) -> String {
    fragments
        .map(|f| f.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_lines(lines: &[Line]) -> String {
    lines
        .iter()
        .map(|line| join_fragments(line.fragments.iter()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq)]
struct Cell {
    x: f32,
    end_x: f32,
    text: String,
}

impl Cell {
    fn center(&self) -> f32 {
        (self.x + self.end_x) / 2.0
    }
}

/// Splits a line into cells wherever the horizontal gap reaches `gap`.
fn split_cells(line: &Line, gap: f32) -> Vec<Cell> {
    let mut cells: Vec<(f32, f32, Vec<&Fragment>)> = Vec::new();

    for fragment in &line.fragments {
        match cells.last_mut() {
            Some((_, end_x, members)) if fragment.x - *end_x < gap => {
                *end_x = end_x.max(fragment.end_x);
                members.push(fragment);
            }
            _ => cells.push((fragment.x, fragment.end_x, vec![fragment])),
        }
    }

    cells
        .into_iter()
        .map(|(x, end_x, members)| Cell {
            x,
            end_x,
            text: join_fragments(members.into_iter()),
        })
        .collect()
}

/// Places each cell under the header column with the nearest center.
fn assign_to_columns(cells: &[Cell], columns: &[Cell]) -> Vec<String> {
    let mut row = vec![String::new(); columns.len()];

    for cell in cells {
        let nearest = columns
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (a.center() - cell.center())
                    .abs()
                    .total_cmp(&(b.center() - cell.center()).abs())
            })
            .map(|(i, _)| i)
            .unwrap_or(0);

        let slot = &mut row[nearest];
        if !slot.is_empty() {
            slot.push(' ');
        }
        slot.push_str(&cell.text);
    }

    row
}

/// A table is a run of consecutive multi-cell lines. The first line is the
/// header and fixes the column positions for the rows below it.
fn detect_tables(lines: &[Line], page_number: u32, gap: f32) -> Vec<Table> {
    let cell_lines: Vec<Vec<Cell>> = lines.iter().map(|l| split_cells(l, gap)).collect();
    let mut tables = Vec::new();

    let mut i = 0;
    while i < cell_lines.len() {
        let columns = &cell_lines[i];
        if columns.len() < 2 {
            i += 1;
            continue;
        }

        let mut rows = Vec::new();
        let mut j = i + 1;
        while j < cell_lines.len() && (2..=columns.len()).contains(&cell_lines[j].len()) {
            rows.push(assign_to_columns(&cell_lines[j], columns));
            j += 1;
        }

        if rows.is_empty() {
            i += 1;
            continue;
        }

        let headers: Vec<String> = columns.iter().map(|c| c.text.clone()).collect();
        let number = tables.len() + 1;
        let semantic_type = SemanticType::infer_from_headers(&headers);
        tables.push(Table::new(
            format!("page{}-table{}", page_number, number),
            format!("Page {} Table {}", page_number, number),
            headers,
            rows,
            TableSource::Page(page_number),
            semantic_type,
        ));

        i = j;
    }

    tables
}
