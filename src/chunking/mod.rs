//! Chunking service: selects a strategy by content type and splits a
//! document into [`Chunk`]s.

pub mod code;
pub mod html;
pub mod json_strategy;
pub mod text;

use crate::config::ChunkingConfig;
use crate::errors::ChunkingError;
use crate::models::{Chunk, ContentType, Document};

/// Strategy names recognized by programming-language file extensions —
/// anything matching routes to the code strategy.
const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "go", "java", "c", "cpp", "h", "hpp", "rb", "php", "cs", "kt", "swift",
];

/// Classify a document's content_type tag (plus an optional file-extension
/// hint) into the strategy selector.
pub fn classify(content_type: &str, file_extension: Option<&str>) -> ContentType {
    let language_hint = file_extension.filter(|ext| CODE_EXTENSIONS.contains(ext));
    ContentType::classify(content_type, language_hint)
}

pub trait ChunkingStrategy {
    fn name(&self) -> &'static str;
    fn chunk(&self, document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>, ChunkingError>;
}

/// Dispatch a document to the strategy matching its content type, falling
/// back to the default text strategy on any strategy-specific parse
/// failure, per each strategy's documented fallback behavior.
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    let file_extension = document
        .metadata
        .get("file_extension")
        .and_then(|v| v.as_str());
    let content_type = classify(&document.content_type, file_extension);

    let chunks = match content_type {
        ContentType::Html => html::HtmlStrategy.chunk(document, config),
        ContentType::Code => code::CodeStrategy.chunk(document, config),
        ContentType::Json => json_strategy::JsonStrategy.chunk(document, config),
        ContentType::Md | ContentType::Text => text::TextStrategy.chunk(document, config),
    };

    match chunks {
        Ok(chunks) => chunks,
        Err(err) => {
            tracing::warn!(document_id = %document.id, error = %err, "chunking strategy failed, falling back to text");
            text::TextStrategy
                .chunk(document, config)
                .unwrap_or_else(|_| vec![])
        }
    }
}

/// Finalize a batch of chunks: set `chunk_index`/`total_chunks` and the
/// common metadata every strategy must attach.
pub(crate) fn finalize(
    mut chunks: Vec<Chunk>,
    document_id: &str,
    strategy_name: &'static str,
) -> Vec<Chunk> {
    let total = chunks.len();
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = i;
        chunk.total_chunks = total;
        chunk.chunk_size = chunk.content.len();
        chunk.chunking_strategy = strategy_name.to_string();
        chunk
            .metadata
            .insert("parent_document".to_string(), serde_json::json!(document_id));
        chunk
            .metadata
            .insert("chunking_strategy".to_string(), serde_json::json!(strategy_name));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_markdown_and_html() {
        assert_eq!(classify("markdown", None), ContentType::Md);
        assert_eq!(classify("htm", None), ContentType::Html);
    }

    #[test]
    fn classifies_code_by_extension() {
        assert_eq!(classify("text", Some("rs")), ContentType::Code);
        assert_eq!(classify("text", Some("xyz")), ContentType::Text);
    }
}
