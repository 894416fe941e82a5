// Document module
// PDF extraction, the page layout tree, and chunking into retrieval units

pub mod chunking;
pub mod pdf;


use serde::{Deserialize, Serialize};

pub use chunking::{ChunkingConfig, ChunkingPolicy, chunk_document, chunk_layout, chunk_words};
pub use pdf::{ExtractedDocument, extract_document};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// A unit of extracted document text, the atomic retrieval item
///
/// Fields are private so a chunk cannot change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page_num: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    layout: Option<ChunkLayout>,
}

/// Typography and position of the text a chunk came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkLayout {
    pub font_size: f32,
    pub bbox: [f32; 4],
    pub font: String,
}

impl Chunk {
    /// Build a chunk, or `None` when the trimmed text is shorter than `min_len` characters
    #[inline]
    pub fn new(
        text: impl Into<String>,
        page_num: Option<u32>,
        layout: Option<ChunkLayout>,
        min_len: usize,
    ) -> Option<Self> {
        let text = text.into().trim().to_string();
        if text.is_empty() || text.chars().count() < min_len {
            return None;
        }

        Some(Self {
            text,
            page_num: page_num.filter(|&p| p >= 1),
            layout,
        })
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// 1-indexed page number, absent for word-window chunks
    #[inline]
    pub fn page_num(&self) -> Option<u32> {
        self.page_num
    }

    #[inline]
    pub fn layout(&self) -> Option<&ChunkLayout> {
        self.layout.as_ref()
    }
}

/// Metadata embedded in (or inferred from) a PDF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub keywords: String,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            author: UNKNOWN_AUTHOR.to_string(),
            subject: String::new(),
            keywords: String::new(),
        }
    }
}

impl DocumentMetadata {
    /// Fill missing title/author from embedded values first, then from the first
    /// meaningful lines of page one, then the sentinels.
    #[inline]
    pub fn resolve(
        title: Option<String>,
        author: Option<String>,
        subject: Option<String>,
        keywords: Option<String>,
        first_page_text: &str,
    ) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty() && v != "Unknown")
        };

        let mut title = clean(title);
        let mut author = clean(author);

        if title.is_none() || author.is_none() {
            let candidates: Vec<&str> = first_page_text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect();

            // Prefer a line long enough to be a heading rather than a page number
            let title_index = candidates
                .iter()
                .position(|line| line.chars().count() > 10)
                .unwrap_or(0);

            let author_index = if title.is_none() {
                title = candidates.get(title_index).map(|line| (*line).to_string());
                title_index + 1
            } else {
                1
            };

            if author.is_none() {
                author = candidates
                    .get(author_index)
                    .map(|line| (*line).to_string());
            }
        }

        Self {
            title: title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            author: author.unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            subject: clean(subject).unwrap_or_default(),
            keywords: clean(keywords).unwrap_or_default(),
        }
    }
}

/// One page of extracted text, organised as block → line → span
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageLayout {
    /// 1-indexed
    pub page_num: u32,
    pub blocks: Vec<TextBlock>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextBlock {
    pub lines: Vec<TextLine>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextLine {
    pub spans: Vec<TextSpan>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextSpan {
    pub text: String,
    pub font_size: Option<f32>,
    pub bbox: Option<[f32; 4]>,
    pub font: Option<String>,
}

impl TextSpan {
    #[inline]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Layout metadata, present only when the extractor supplied all of it
    #[inline]
    pub fn layout(&self) -> Option<ChunkLayout> {
        match (self.font_size, self.bbox, &self.font) {
            (Some(font_size), Some(bbox), Some(font)) => Some(ChunkLayout {
                font_size,
                bbox,
                font: font.clone(),
            }),
            _ => None,
        }
    }
}

impl PageLayout {
    /// Build a layout from plain page text: blank lines separate blocks, one span per line
    #[inline]
    pub fn from_plain_text(page_num: u32, text: &str) -> Self {
        let mut blocks = Vec::new();
        let mut current = TextBlock::default();

        for line in text.lines() {
            if line.trim().is_empty() {
                if !current.lines.is_empty() {
                    blocks.push(std::mem::take(&mut current));
                }
                continue;
            }
            current.lines.push(TextLine {
                spans: vec![TextSpan::plain(line)],
            });
        }

        if !current.lines.is_empty() {
            blocks.push(current);
        }

        Self { page_num, blocks }
    }

    /// All text of the page, lines joined by newlines
    #[inline]
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .flat_map(|block| &block.lines)
            .map(TextLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl TextLine {
    /// Span texts, each trimmed, joined by a single space
    #[inline]
    pub fn text(&self) -> String {
        self.spans
            .iter()
            .map(|span| span.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
