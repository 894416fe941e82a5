#[cfg(test)]
mod tests;

use lopdf::{Dictionary, Document, Encoding, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use super::{DocumentMetadata, PageLayout, TextBlock, TextLine, TextSpan};
use crate::{QaError, Result};

/// Text layout and metadata pulled out of a PDF
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    pub pages: Vec<PageLayout>,
    pub metadata: DocumentMetadata,
}

impl ExtractedDocument {
    /// Whole-document text, pages separated by newlines
    #[inline]
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(PageLayout::text)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

/// Load a PDF from disk and extract its pages and metadata
#[inline]
pub fn extract_document(path: &Path) -> Result<ExtractedDocument> {
    debug!("Loading PDF from {}", path.display());

    let document = Document::load(path)
        .map_err(|e| QaError::Pdf(format!("Failed to load {}: {}", path.display(), e)))?;

    extract_loaded(&document)
}

/// Extract pages and metadata from an in-memory PDF
#[inline]
pub fn extract_document_from_bytes(bytes: &[u8]) -> Result<ExtractedDocument> {
    let document =
        Document::load_mem(bytes).map_err(|e| QaError::Pdf(format!("Failed to parse PDF: {}", e)))?;

    extract_loaded(&document)
}

fn extract_loaded(document: &Document) -> Result<ExtractedDocument> {
    if document.is_encrypted() {
        return Err(QaError::Pdf("Encrypted PDFs are not supported".to_string()));
    }

    let page_ids = document.get_pages();
    if page_ids.is_empty() {
        return Err(QaError::Pdf("PDF has no pages".to_string()));
    }

    let pages: Vec<PageLayout> = page_ids
        .into_iter()
        .map(|(page_num, page_id)| page_layout(document, page_num, page_id))
        .collect();

    let first_page_text = pages.first().map(PageLayout::text).unwrap_or_default();
    let info = info_dictionary(document);
    let field = |key: &[u8]| info.and_then(|dict| text_field(document, dict, key));

    let metadata = DocumentMetadata::resolve(
        field(b"Title"),
        field(b"Author"),
        field(b"Subject"),
        field(b"Keywords"),
        &first_page_text,
    );

    debug!(
        "Extracted {} pages from PDF titled '{}'",
        pages.len(),
        metadata.title
    );

    Ok(ExtractedDocument { pages, metadata })
}

/// Layout from the page's text operators, or plain lines when the content cannot be walked
fn page_layout(document: &Document, page_num: u32, page_id: ObjectId) -> PageLayout {
    match shown_text(document, page_id) {
        Ok(shown) if !shown.is_empty() => {
            let mut builder = LayoutBuilder::new(page_height(document, page_id));
            for piece in shown {
                builder.push(piece);
            }
            builder.finish(page_num)
        }
        Ok(_) => PageLayout {
            page_num,
            blocks: Vec::new(),
        },
        Err(e) => {
            warn!("Failed to walk content of page {}: {}", page_num, e);
            // Pages with unsupported content still leave the rest of the document usable
            let text = document.extract_text(&[page_num]).unwrap_or_else(|e| {
                warn!("Failed to extract text from page {}: {}", page_num, e);
                String::new()
            });
            PageLayout::from_plain_text(page_num, &text)
        }
    }
}

/// Average glyph advance as a fraction of the font size; glyph widths are not read
const AVERAGE_GLYPH_WIDTH: f32 = 0.5;
/// `TJ` adjustments beyond this many thousandths of an em read as a word break
const TJ_WORD_GAP: f32 = 100.0;
/// Horizontal gap, in ems, that separates two words shown by separate operators
const WORD_GAP_EM: f32 = 0.2;
/// Baseline drop, in line heights, that starts a new block
const BLOCK_GAP_LINES: f32 = 1.8;
const DEFAULT_PAGE_HEIGHT: f32 = 792.0;

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0].mul_add(n[0], m[1] * n[2]),
        m[0].mul_add(n[1], m[1] * n[3]),
        m[2].mul_add(n[0], m[3] * n[2]),
        m[2].mul_add(n[1], m[3] * n[3]),
        m[4].mul_add(n[0], m[5].mul_add(n[2], n[4])),
        m[4].mul_add(n[1], m[5].mul_add(n[3], n[5])),
    ]
}

struct PageFont<'a> {
    name: String,
    encoding: Option<Encoding<'a>>,
}

impl<'a> PageFont<'a> {
    fn new(document: &'a Document, dict: &'a Dictionary) -> Self {
        let base = dict
            .get(b"BaseFont")
            .and_then(Object::as_name)
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        // Subset fonts carry a six letter tag, as in ABCDEF+Helvetica
        let name = match base.split_once('+') {
            Some((tag, rest)) if tag.len() == 6 => rest.to_string(),
            _ => base,
        };

        Self {
            name,
            encoding: dict.get_font_encoding(document).ok(),
        }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        self.encoding
            .as_ref()
            .and_then(|encoding| Document::decode_text(encoding, bytes).ok())
            .unwrap_or_else(|| decode_pdf_string(bytes))
    }
}

/// Text shown by one `Tj`/`TJ`/`'`/`"` operator, in page space
#[derive(Debug, Clone, PartialEq)]
struct ShownText {
    text: String,
    font: String,
    size: f32,
    x: f32,
    y: f32,
    width: f32,
}

#[derive(Debug)]
struct TextState {
    font: Option<Vec<u8>>,
    font_size: f32,
    leading: f32,
    text_matrix: Matrix,
    line_matrix: Matrix,
    ctm: Matrix,
    saved: Vec<Matrix>,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            font_size: 0.0,
            leading: 0.0,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            ctm: IDENTITY,
            saved: Vec::new(),
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn show(&mut self, operands: &[Object], font: Option<&PageFont<'_>>) -> Option<ShownText> {
        let origin = multiply(&self.text_matrix, &self.ctm);
        let mut text = String::new();
        let mut advance = 0.0;
        collect_shown(operands, font, self.font_size, &mut text, &mut advance);
        self.text_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, advance, 0.0], &self.text_matrix);

        if text.is_empty() {
            return None;
        }

        let vertical_scale = origin[2].hypot(origin[3]);
        let size = if vertical_scale > 0.0 {
            self.font_size * vertical_scale
        } else {
            self.font_size
        };

        Some(ShownText {
            text,
            font: font.map_or_else(|| "unknown".to_string(), |f| f.name.clone()),
            size,
            x: origin[4],
            y: origin[5],
            width: advance * origin[0].hypot(origin[1]),
        })
    }
}

fn collect_shown(
    operands: &[Object],
    font: Option<&PageFont<'_>>,
    font_size: f32,
    text: &mut String,
    advance: &mut f32,
) {
    for operand in operands {
        match operand {
            Object::String(bytes, _) => {
                let decoded = font.map_or_else(|| decode_pdf_string(bytes), |f| f.decode(bytes));
                let glyphs = decoded.chars().count() as f32;
                *advance = glyphs.mul_add(font_size * AVERAGE_GLYPH_WIDTH, *advance);
                text.push_str(&decoded);
            }
            Object::Array(items) => collect_shown(items, font, font_size, text, advance),
            Object::Integer(_) | Object::Real(_) => {
                let adjustment = operand.as_float().unwrap_or(0.0);
                *advance = (-adjustment / 1000.0).mul_add(font_size, *advance);
                if adjustment < -TJ_WORD_GAP && !text.is_empty() && !text.ends_with(' ') {
                    text.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn number(operands: &[Object], index: usize) -> Option<f32> {
    operands.get(index).and_then(|o| o.as_float().ok())
}

fn matrix(operands: &[Object]) -> Option<Matrix> {
    let mut m = IDENTITY;
    for (i, value) in m.iter_mut().enumerate() {
        *value = number(operands, i)?;
    }
    Some(m)
}

/// Walk a page's content stream and collect every piece of shown text in drawing order
fn shown_text(document: &Document, page_id: ObjectId) -> lopdf::Result<Vec<ShownText>> {
    let fonts: BTreeMap<Vec<u8>, PageFont<'_>> = document
        .get_page_fonts(page_id)?
        .into_iter()
        .map(|(key, dict)| (key, PageFont::new(document, dict)))
        .collect();
    let content = document.get_and_decode_page_content(page_id)?;

    let mut state = TextState::default();
    let mut shown = Vec::new();

    for operation in &content.operations {
        let operands = operation.operands.as_slice();
        let font = state.font.as_ref().and_then(|key| fonts.get(key));

        match operation.operator.as_str() {
            "q" => state.saved.push(state.ctm),
            "Q" => {
                if let Some(ctm) = state.saved.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = matrix(operands) {
                    state.ctm = multiply(&m, &state.ctm);
                }
            }
            "BT" => {
                state.text_matrix = IDENTITY;
                state.line_matrix = IDENTITY;
            }
            "Tf" => {
                state.font = operands
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .map(<[u8]>::to_vec);
                if let Some(size) = number(operands, 1) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some(leading) = number(operands, 0) {
                    state.leading = leading;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (number(operands, 0), number(operands, 1)) {
                    state.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (number(operands, 0), number(operands, 1)) {
                    state.leading = -ty;
                    state.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = matrix(operands) {
                    state.text_matrix = m;
                    state.line_matrix = m;
                }
            }
            "T*" => state.next_line(),
            "Tj" | "TJ" => shown.extend(state.show(operands, font)),
            "'" => {
                state.next_line();
                shown.extend(state.show(operands, font));
            }
            "\"" => {
                state.next_line();
                shown.extend(state.show(operands.get(2..).unwrap_or_default(), font));
            }
            _ => {}
        }
    }

    Ok(shown)
}

/// Height of the page's MediaBox, inherited from parent page tree nodes when absent
fn page_height(document: &Document, page_id: ObjectId) -> f32 {
    let mut node = document.get_dictionary(page_id).ok();
    // The page tree is shallow; the bound stops reference cycles
    for _ in 0..32 {
        let Some(dict) = node else { break };
        if let Ok(Object::Array(media_box)) = dict.get_deref(b"MediaBox", document) {
            let bottom = media_box.get(1).and_then(|o| o.as_float().ok());
            let top = media_box.get(3).and_then(|o| o.as_float().ok());
            if let (Some(bottom), Some(top)) = (bottom, top) {
                return (top - bottom).abs();
            }
        }
        node = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| document.get_dictionary(id))
            .ok();
    }
    DEFAULT_PAGE_HEIGHT
}

/// Groups shown text into lines by baseline and lines into blocks by vertical gap.
/// Consecutive text in the same font and size on one line forms one span.
struct LayoutBuilder {
    page_height: f32,
    blocks: Vec<TextBlock>,
    block: TextBlock,
    line: TextLine,
    baseline: Option<f32>,
    line_size: f32,
    end_x: f32,
}

impl LayoutBuilder {
    fn new(page_height: f32) -> Self {
        Self {
            page_height,
            blocks: Vec::new(),
            block: TextBlock::default(),
            line: TextLine::default(),
            baseline: None,
            line_size: 0.0,
            end_x: 0.0,
        }
    }

    fn push(&mut self, piece: ShownText) {
        let same_line = self
            .baseline
            .is_some_and(|y| (piece.y - y).abs() <= piece.size.max(self.line_size) * 0.5);

        if !same_line {
            if let Some(previous) = self.baseline {
                self.end_line();
                let drop = previous - piece.y;
                if drop > self.line_size * BLOCK_GAP_LINES || drop < -self.line_size {
                    self.end_block();
                }
            }
            self.baseline = Some(piece.y);
            self.line_size = piece.size;
        }

        // Top-left origin, y growing down the page
        let bbox = [
            piece.x,
            self.page_height - piece.y - piece.size,
            piece.x + piece.width,
            self.page_height - piece.y,
        ];
        let end_x = piece.x + piece.width;

        match self.line.spans.last_mut() {
            Some(span)
                if span.font.as_deref() == Some(piece.font.as_str())
                    && span
                        .font_size
                        .is_some_and(|size| (size - piece.size).abs() < 0.01) =>
            {
                let gap = piece.x - self.end_x;
                if gap > piece.size * WORD_GAP_EM
                    && !span.text.ends_with(' ')
                    && !piece.text.starts_with(' ')
                {
                    span.text.push(' ');
                }
                span.text.push_str(&piece.text);
                if let Some(current) = span.bbox.as_mut() {
                    current[0] = current[0].min(bbox[0]);
                    current[1] = current[1].min(bbox[1]);
                    current[2] = current[2].max(bbox[2]);
                    current[3] = current[3].max(bbox[3]);
                }
            }
            _ => self.line.spans.push(TextSpan {
                text: piece.text,
                font_size: Some(piece.size),
                bbox: Some(bbox),
                font: Some(piece.font),
            }),
        }

        self.end_x = end_x;
        self.line_size = self.line_size.max(piece.size);
    }

    fn end_line(&mut self) {
        if !self.line.spans.is_empty() {
            self.block.lines.push(std::mem::take(&mut self.line));
        }
    }

    fn end_block(&mut self) {
        if !self.block.lines.is_empty() {
            self.blocks.push(std::mem::take(&mut self.block));
        }
    }

    fn finish(mut self, page_num: u32) -> PageLayout {
        self.end_line();
        self.end_block();
        PageLayout {
            page_num,
            blocks: self.blocks,
        }
    }
}

fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    let info = document.trailer.get(b"Info").ok()?;
    let (_, object) = document.dereference(info).ok()?;
    object.as_dict().ok()
}

fn text_field(document: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    let object = dict.get(key).ok()?;
    let (_, object) = document.dereference(object).ok()?;
    match object {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE when it carries a byte order mark, otherwise
/// PDFDocEncoding, whose printable range matches Latin-1
#[inline]
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }

    bytes.iter().map(|&b| char::from(b)).collect()
}
