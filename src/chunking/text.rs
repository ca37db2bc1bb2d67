//! Default text chunking strategy: a fixed-size sliding window that
//! respects sentence boundaries when feasible.

use crate::config::ChunkingConfig;
use crate::errors::ChunkingError;
use crate::models::{Chunk, Document};

use super::{finalize, ChunkingStrategy};

pub struct TextStrategy;

impl ChunkingStrategy for TextStrategy {
    fn name(&self) -> &'static str {
        "default_text"
    }

    fn chunk(&self, document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>, ChunkingError> {
        let windows = window_text(&document.content, config.chunk_size, config.chunk_overlap);
        let capped: Vec<String> = windows
            .into_iter()
            .take(config.max_chunks_per_document)
            .collect();

        let chunks = capped
            .into_iter()
            .map(|text| Chunk {
                id: Chunk::new_id(),
                document_id: document.id.clone(),
                content: text,
                chunk_index: 0,
                total_chunks: 0,
                chunk_size: 0,
                chunking_strategy: String::new(),
                metadata: Default::default(),
            })
            .collect();

        Ok(finalize(chunks, &document.id, self.name()))
    }
}

/// Sentence boundary characters to prefer splitting on when a window would
/// otherwise cut mid-sentence.
const SENTENCE_ENDS: &[char] = &['.', '!', '?'];

/// Split `text` into overlapping windows of at most `chunk_size` chars.
/// `chunk_overlap` must be `< chunk_size` (enforced at config-load time).
pub fn window_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let bytes = text.as_bytes();
    let mut windows = Vec::new();
    let mut start = 0usize;

    while start < bytes.len() {
        let mut end = (start + chunk_size).min(bytes.len());
        if end < bytes.len() {
            end = nearest_char_boundary(text, end);
            if let Some(boundary) = find_sentence_boundary(&text[start..end]) {
                end = start + boundary;
            }
        }
        let piece = text[start..end].trim();
        if !piece.is_empty() {
            windows.push(piece.to_string());
        }
        if end >= bytes.len() {
            break;
        }
        let next_start = end.saturating_sub(chunk_overlap);
        start = if next_start > start {
            nearest_char_boundary(text, next_start)
        } else {
            nearest_char_boundary(text, end)
        };
    }

    if windows.is_empty() {
        windows.push(text.to_string());
    }
    windows
}

fn nearest_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Find the latest sentence-ending punctuation within the window, preferring
/// to cut there instead of mid-sentence. Only accepts boundaries in the back
/// half of the window so chunks don't collapse to near-nothing.
fn find_sentence_boundary(window: &str) -> Option<usize> {
    let half = window.len() / 2;
    window
        .char_indices()
        .rev()
        .find(|(i, c)| *i >= half && SENTENCE_ENDS.contains(c))
        .map(|(i, c)| i + c.len_utf8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;

    #[test]
    fn short_text_yields_single_chunk() {
        let doc = Document::new("localfile", "localfile:x", "p1", "Hello, world!", "text");
        let config = ChunkingConfig::default();
        let chunks = TextStrategy.chunk(&doc, &config).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].total_chunks, 1);
    }

    #[test]
    fn long_text_splits_and_indices_are_contiguous() {
        let long_text = "Sentence one. ".repeat(500);
        let doc = Document::new("localfile", "localfile:x", "p1", long_text, "text");
        let mut config = ChunkingConfig::default();
        config.chunk_size = 200;
        config.chunk_overlap = 20;
        let chunks = TextStrategy.chunk(&doc, &config).unwrap();
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.total_chunks, chunks.len());
        }
    }

    #[test]
    fn respects_max_chunks_per_document_cap() {
        let long_text = "word ".repeat(10_000);
        let doc = Document::new("localfile", "localfile:x", "p1", long_text, "text");
        let mut config = ChunkingConfig::default();
        config.chunk_size = 50;
        config.chunk_overlap = 5;
        config.max_chunks_per_document = 10;
        let chunks = TextStrategy.chunk(&doc, &config).unwrap();
        assert_eq!(chunks.len(), 10);
    }
}
