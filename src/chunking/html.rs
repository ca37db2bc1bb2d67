//! HTML chunking strategy: splits by semantic sections, preserving a
//! breadcrumb of headings and flags for downstream NLP cost control.

use regex::Regex;
use serde_json::json;

use crate::config::ChunkingConfig;
use crate::errors::ChunkingError;
use crate::models::{Chunk, Document};

use super::text::window_text;
use super::{finalize, ChunkingStrategy};

pub struct HtmlStrategy;

struct Section {
    breadcrumb: Vec<String>,
    text: String,
    has_code_blocks: bool,
    has_tables: bool,
    has_images: bool,
    has_links: bool,
}

impl ChunkingStrategy for HtmlStrategy {
    fn name(&self) -> &'static str {
        "html"
    }

    fn chunk(&self, document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>, ChunkingError> {
        if document.content.len() > config.html_simple_parsing_threshold {
            return fallback_strip_tags(document, config);
        }

        let sections = split_sections(&document.content, config.html_max_sections_to_process);

        let mut chunks = Vec::new();
        for section in sections {
            let pieces = window_text(&section.text, config.chunk_size, config.chunk_overlap);
            for piece in pieces {
                let skip_nlp = piece.len() > config.html_max_chunk_size_for_nlp;
                let mut metadata = crate::models::Metadata::new();
                metadata.insert("breadcrumb".to_string(), json!(section.breadcrumb));
                metadata.insert("has_code_blocks".to_string(), json!(section.has_code_blocks));
                metadata.insert("has_tables".to_string(), json!(section.has_tables));
                metadata.insert("has_images".to_string(), json!(section.has_images));
                metadata.insert("has_links".to_string(), json!(section.has_links));
                metadata.insert("skip_expensive_nlp".to_string(), json!(skip_nlp));
                chunks.push(Chunk {
                    id: Chunk::new_id(),
                    document_id: document.id.clone(),
                    content: piece,
                    chunk_index: 0,
                    total_chunks: 0,
                    chunk_size: 0,
                    chunking_strategy: String::new(),
                    metadata,
                });
            }
        }

        if chunks.is_empty() {
            return fallback_strip_tags(document, config);
        }

        Ok(finalize(chunks, &document.id, self.name()))
    }
}

fn fallback_strip_tags(document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>, ChunkingError> {
    let tag_re = Regex::new(r"<[^>]+>").unwrap();
    let stripped = tag_re.replace_all(&document.content, " ").to_string();
    let pieces = window_text(&stripped, config.chunk_size, config.chunk_overlap);
    let chunks = pieces
        .into_iter()
        .take(config.max_chunks_per_document)
        .map(|text| {
            let mut metadata = crate::models::Metadata::new();
            metadata.insert("fallback_tag_stripped".to_string(), json!(true));
            Chunk {
                id: Chunk::new_id(),
                document_id: document.id.clone(),
                content: text,
                chunk_index: 0,
                total_chunks: 0,
                chunk_size: 0,
                chunking_strategy: String::new(),
                metadata,
            }
        })
        .collect();
    Ok(finalize(chunks, &document.id, "html"))
}

/// A cheap regex-based "DOM" split: headings start a new section and extend
/// the breadcrumb; `<article>`/`<section>` tags also start new sections.
/// This isn't a real parser, but it's sufficient to produce breadcrumb and
/// content-flag metadata without pulling in a full HTML/CSS engine.
fn split_sections(html: &str, max_sections: usize) -> Vec<Section> {
    let heading_re = Regex::new(r"(?is)<h([1-6])[^>]*>(.*?)</h\1>").unwrap();
    let boundary_re = Regex::new(r"(?is)<(h[1-6]|article|section)[^>]*>").unwrap();
    let tag_re = Regex::new(r"<[^>]+>").unwrap();

    let mut boundaries: Vec<usize> = boundary_re.find_iter(html).map(|m| m.start()).collect();
    boundaries.push(html.len());
    boundaries.dedup();

    let mut sections = Vec::new();
    let mut breadcrumb: Vec<String> = Vec::new();
    let mut start = 0usize;

    for &end in boundaries.iter() {
        if start >= end {
            start = end;
            continue;
        }
        let slice = &html[start..end];
        if let Some(caps) = heading_re.captures(slice) {
            let level: usize = caps[1].parse().unwrap_or(1);
            let text = tag_re.replace_all(&caps[2], "").trim().to_string();
            breadcrumb.truncate(level.saturating_sub(1));
            if !text.is_empty() {
                breadcrumb.push(text);
            }
        }

        let plain = tag_re.replace_all(slice, " ").trim().to_string();
        if !plain.is_empty() {
            sections.push(Section {
                breadcrumb: breadcrumb.clone(),
                has_code_blocks: slice.contains("<pre") || slice.contains("<code"),
                has_tables: slice.contains("<table"),
                has_images: slice.contains("<img"),
                has_links: slice.contains("<a "),
                text: plain,
            });
        }
        start = end;
        if sections.len() >= max_sections {
            break;
        }
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;

    #[test]
    fn splits_by_heading_and_tracks_breadcrumb() {
        let html = "<h1>Guide</h1><p>intro text</p><h2>Setup</h2><p>setup text with <code>x</code></p>";
        let doc = Document::new("publicdocs", "publicdocs:docs", "p1", html, "html");
        let config = ChunkingConfig::default();
        let chunks = HtmlStrategy.chunk(&doc, &config).unwrap();
        assert!(chunks.len() >= 2);
        let setup_chunk = chunks
            .iter()
            .find(|c| c.content.contains("setup text"))
            .unwrap();
        let breadcrumb = setup_chunk.metadata.get("breadcrumb").unwrap().as_array().unwrap();
        assert!(breadcrumb.iter().any(|v| v.as_str() == Some("Setup")));
        assert_eq!(
            setup_chunk.metadata.get("has_code_blocks").unwrap(),
            &serde_json::json!(true)
        );
    }

    #[test]
    fn oversized_document_falls_back_to_tag_stripping() {
        let html = format!("<p>{}</p>", "x".repeat(200_000));
        let doc = Document::new("publicdocs", "publicdocs:docs", "p1", html, "html");
        let config = ChunkingConfig::default();
        let chunks = HtmlStrategy.chunk(&doc, &config).unwrap();
        assert!(!chunks.is_empty());
        assert_eq!(
            chunks[0].metadata.get("fallback_tag_stripped"),
            Some(&serde_json::json!(true))
        );
    }
}
