
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::{Chunk, PageLayout};
use crate::document::pdf::ExtractedDocument;

/// How extracted text is cut into retrieval units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingPolicy {
    /// One chunk per layout line, spans concatenated
    #[default]
    LayoutLines,
    /// One chunk per layout span, keeping font and position metadata
    LayoutSpans,
    /// Fixed windows of whitespace-separated words over the whole document
    WordWindow,
}

impl fmt::Display for ChunkingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LayoutLines => "layout_lines",
            Self::LayoutSpans => "layout_spans",
            Self::WordWindow => "word_window",
        };
        f.write_str(name)
    }
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub policy: ChunkingPolicy,
    /// Layout chunks with fewer characters than this are treated as noise
    pub min_text_length: usize,
    /// Words per chunk for the word-window policy
    pub window_words: usize,
    /// Character budget for the whole-document summary prompt
    pub summary_max_chars: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            policy: ChunkingPolicy::LayoutLines,
            min_text_length: 30,
            window_words: 500,
            summary_max_chars: 24_000,
        }
    }
}

/// Chunk an extracted document with the configured policy
#[inline]
pub fn chunk_document(document: &ExtractedDocument, config: &ChunkingConfig) -> Vec<Chunk> {
    let chunks = match config.policy {
        ChunkingPolicy::LayoutLines | ChunkingPolicy::LayoutSpans => {
            chunk_layout(&document.pages, config.policy, config.min_text_length)
        }
        ChunkingPolicy::WordWindow => chunk_words(&document.full_text(), config.window_words),
    };

    debug!(
        "Chunked {} pages into {} chunks using {}",
        document.pages.len(),
        chunks.len(),
        config.policy
    );

    chunks
}

/// Walk page → block → line → span and emit one chunk per line or per span
///
/// `WordWindow` is not a layout policy and is treated as `LayoutLines` here.
#[inline]
pub fn chunk_layout(pages: &[PageLayout], policy: ChunkingPolicy, min_len: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for page in pages {
        for block in &page.blocks {
            for line in &block.lines {
                if policy == ChunkingPolicy::LayoutSpans {
                    chunks.extend(line.spans.iter().filter_map(|span| {
                        Chunk::new(
                            span.text.as_str(),
                            Some(page.page_num),
                            span.layout(),
                            min_len,
                        )
                    }));
                } else {
                    // A line inherits the layout of its first span
                    let layout = line.spans.first().and_then(|span| span.layout());
                    chunks.extend(Chunk::new(line.text(), Some(page.page_num), layout, min_len));
                }
            }
        }
    }

    chunks
}

/// Split text on whitespace and emit windows of `window_words` words
///
/// Every window is kept, including a short trailing one.
#[inline]
pub fn chunk_words(text: &str, window_words: usize) -> Vec<Chunk> {
    let window_words = window_words.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();

    words
        .chunks(window_words)
        .filter_map(|window| Chunk::new(window.join(" "), None, None, 1))
        .collect()
}
