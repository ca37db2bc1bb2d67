//! Code chunking strategy: walks source structure up to a recursion-depth
//! cap, extracting functions/classes/blocks as chunks.
//!
//! Rather than pull in a full per-language grammar dependency, element
//! boundaries are found with a brace/indentation heuristic: a line matching
//! a function/class/impl signature opens an element; its end is the point
//! where brace depth returns to the opening depth (for brace languages) or
//! indentation returns to the opening level (for Python). This produces the
//! element type/name/start-line/end-line metadata each code chunk carries,
//! without a grammar-per-language dependency set.

use regex::Regex;
use serde_json::json;

use crate::config::ChunkingConfig;
use crate::errors::ChunkingError;
use crate::models::{Chunk, Document};

use super::text::window_text;
use super::{finalize, ChunkingStrategy};

pub struct CodeStrategy;

struct Element {
    kind: &'static str,
    name: String,
    start_line: usize,
    end_line: usize,
    text: String,
}

impl ChunkingStrategy for CodeStrategy {
    fn name(&self) -> &'static str {
        "code"
    }

    fn chunk(&self, document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>, ChunkingError> {
        if document.content.len() > config.code_max_file_size_for_ast {
            return fallback_text(document, config);
        }

        let elements = extract_elements(
            &document.content,
            config.code_max_recursion_depth,
            config.code_max_elements_to_process,
        );

        if elements.is_empty() {
            return fallback_text(document, config);
        }

        let mut chunks = Vec::new();
        for element in elements {
            let pieces = if element.text.len() > config.code_max_element_size {
                window_text(&element.text, config.code_max_element_size, 0)
            } else {
                vec![element.text.clone()]
            };
            for piece in pieces {
                let mut metadata = crate::models::Metadata::new();
                metadata.insert("element_type".to_string(), json!(element.kind));
                metadata.insert("element_name".to_string(), json!(element.name));
                metadata.insert("start_line".to_string(), json!(element.start_line));
                metadata.insert("end_line".to_string(), json!(element.end_line));
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

        Ok(finalize(chunks, &document.id, self.name()))
    }
}

fn fallback_text(document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>, ChunkingError> {
    let pieces = window_text(&document.content, config.chunk_size, config.chunk_overlap);
    let chunks = pieces
        .into_iter()
        .take(config.max_chunks_per_document)
        .map(|text| Chunk {
            id: Chunk::new_id(),
            document_id: document.id.clone(),
            content: text,
            chunk_index: 0,
            total_chunks: 0,
            chunk_size: 0,
            chunking_strategy: String::new(),
            metadata: crate::models::Metadata::new(),
        })
        .collect();
    Ok(finalize(chunks, &document.id, "code"))
}

fn signature_kind(line: &str) -> Option<(&'static str, Regex)> {
    let trimmed = line.trim_start();
    if Regex::new(r"^\s*(pub(\s*\(\w+\))?\s+)?(async\s+)?fn\s+\w+").unwrap().is_match(trimmed)
        || Regex::new(r"^\s*def\s+\w+").unwrap().is_match(trimmed)
        || Regex::new(r"^\s*(export\s+)?(async\s+)?function\s+\w+").unwrap().is_match(trimmed)
    {
        return Some(("function", Regex::new(r"\b(fn|def|function)\s+(\w+)").unwrap()));
    }
    if Regex::new(r"^\s*(pub\s+)?(struct|impl|trait)\s+\w+").unwrap().is_match(trimmed)
        || Regex::new(r"^\s*class\s+\w+").unwrap().is_match(trimmed)
    {
        return Some((
            "class",
            Regex::new(r"\b(struct|impl|trait|class)\s+(\w+)").unwrap(),
        ));
    }
    None
}

/// Extract up to `max_elements` top-level code elements, recursing into
/// brace-delimited bodies up to `max_depth`.
fn extract_elements(source: &str, max_depth: usize, max_elements: usize) -> Vec<Element> {
    let lines: Vec<&str> = source.lines().collect();
    let mut elements = Vec::new();
    let mut i = 0usize;

    while i < lines.len() && elements.len() < max_elements {
        let line = lines[i];
        if let Some((kind, name_re)) = signature_kind(line) {
            let name = name_re
                .captures(line)
                .and_then(|c| c.get(2))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "anonymous".to_string());

            let indent = line.len() - line.trim_start().len();
            let is_python = line.trim_start().starts_with("def ")
                || line.trim_start().starts_with("class ");

            let end = if is_python {
                find_python_block_end(&lines, i, indent)
            } else {
                find_brace_block_end(&lines, i, max_depth)
            };

            let text = lines[i..=end.min(lines.len() - 1)].join("\n");
            elements.push(Element {
                kind,
                name,
                start_line: i + 1,
                end_line: end + 1,
                text,
            });
            i = end + 1;
        } else {
            i += 1;
        }
    }

    elements
}

fn find_python_block_end(lines: &[&str], start: usize, indent: usize) -> usize {
    let mut end = start;
    for (offset, line) in lines.iter().enumerate().skip(start + 1) {
        if line.trim().is_empty() {
            end = offset;
            continue;
        }
        let this_indent = line.len() - line.trim_start().len();
        if this_indent <= indent {
            return end;
        }
        end = offset;
    }
    end
}

fn find_brace_block_end(lines: &[&str], start: usize, max_depth: usize) -> usize {
    let mut depth = 0i32;
    let mut opened = false;
    for (offset, line) in lines.iter().enumerate().skip(start) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return offset;
        }
        if depth as usize > max_depth + 4 {
            // Recursion guard: stop descending once nesting is absurd,
            // treating the remainder as a single flat block.
            return offset;
        }
    }
    lines.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;

    #[test]
    fn extracts_rust_function_with_line_range() {
        let source = "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n";
        let mut doc = Document::new("git", "git:repo", "p1", source, "text");
        doc.metadata.insert("file_extension".into(), json!("rs"));
        let config = ChunkingConfig::default();
        let chunks = CodeStrategy.chunk(&doc, &config).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.get("element_name").unwrap(), "add");
        assert_eq!(chunks[0].metadata.get("element_type").unwrap(), "function");
    }

    #[test]
    fn extracts_python_function_by_indentation() {
        let source = "def greet(name):\n    return f\"hi {name}\"\n\ndef bye():\n    return \"bye\"\n";
        let doc = Document::new("git", "git:repo", "p1", source, "text");
        let config = ChunkingConfig::default();
        let chunks = CodeStrategy.chunk(&doc, &config).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.get("element_name").unwrap(), "greet");
        assert_eq!(chunks[1].metadata.get("element_name").unwrap(), "bye");
    }

    #[test]
    fn oversized_file_falls_back_to_text() {
        let source = "x".repeat(200_000);
        let doc = Document::new("git", "git:repo", "p1", source, "text");
        let config = ChunkingConfig::default();
        let chunks = CodeStrategy.chunk(&doc, &config).unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks[0].metadata.get("element_name").is_none());
    }
}
