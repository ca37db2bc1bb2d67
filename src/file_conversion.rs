//! File conversion collaborator: turns a recognized binary format
//! into markdown, budgeted by `max_file_size` and `conversion_timeout`.
//!
//! Extraction itself is delegated to [`crate::extract`], which already
//! speaks PDF/DOCX/PPTX/XLSX. This module adds the budget enforcement and
//! the fallback-document behavior the connectors rely on: on failure, a
//! short explanatory document is produced instead of propagating the error,
//! so one unreadable attachment doesn't sink the rest of a source scan.

use std::time::Duration;

use crate::extract::{self, ExtractError};
use crate::models::Document;

/// Binary MIME types this collaborator recognizes as convertible.
pub fn is_convertible(content_type: &str) -> bool {
    matches!(
        content_type,
        extract::MIME_PDF | extract::MIME_DOCX | extract::MIME_PPTX | extract::MIME_XLSX
    )
}

fn original_file_type(content_type: &str) -> &'static str {
    match content_type {
        extract::MIME_PDF => "pdf",
        extract::MIME_DOCX => "docx",
        extract::MIME_PPTX => "pptx",
        extract::MIME_XLSX => "xlsx",
        _ => "unknown",
    }
}

/// Convert `bytes` (of `content_type`) into a ready-to-chunk [`Document`].
///
/// On success, `content_type` becomes `"md"` and metadata gains
/// `conversion_method`/`original_file_type`. On failure, or if `bytes`
/// exceeds `max_file_size`, a fallback document carrying a short
/// explanation and `conversion_failed=true` is returned instead — this
/// function does not return `Err` for conversion failures, only for
/// programmer-facing misuse (an unsupported content type).
pub async fn convert(
    mut document: Document,
    bytes: &[u8],
    max_file_size: usize,
    conversion_timeout: Duration,
) -> Result<Document, ExtractError> {
    let content_type = document.content_type.clone();
    if !is_convertible(&content_type) {
        return Err(ExtractError::UnsupportedContentType(content_type));
    }

    if bytes.len() > max_file_size {
        return Ok(fallback(
            document,
            &content_type,
            &format!(
                "file size {} exceeds conversion limit {}",
                bytes.len(),
                max_file_size
            ),
        ));
    }

    let bytes = bytes.to_vec();
    let ct = content_type.clone();
    let extraction = tokio::time::timeout(
        conversion_timeout,
        tokio::task::spawn_blocking(move || extract::extract_text(&bytes, &ct)),
    )
    .await;

    match extraction {
        Ok(Ok(Ok(text))) => {
            document.content = text;
            document.content_type = "md".to_string();
            document
                .metadata
                .insert("conversion_method".to_string(), serde_json::json!("file_conversion"));
            document.metadata.insert(
                "original_file_type".to_string(),
                serde_json::json!(original_file_type(&content_type)),
            );
            Ok(document)
        }
        Ok(Ok(Err(e))) => Ok(fallback(document, &content_type, &e.to_string())),
        Ok(Err(join_err)) => Ok(fallback(document, &content_type, &join_err.to_string())),
        Err(_) => Ok(fallback(document, &content_type, "conversion timed out")),
    }
}

fn fallback(mut document: Document, content_type: &str, reason: &str) -> Document {
    document.content = format!(
        "[content unavailable: {} conversion failed — {}]",
        original_file_type(content_type),
        reason
    );
    document.content_type = "md".to_string();
    document
        .metadata
        .insert("conversion_failed".to_string(), serde_json::json!(true));
    document
        .metadata
        .insert("original_file_type".to_string(), serde_json::json!(original_file_type(content_type)));
    document
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_file_produces_fallback_document() {
        let doc = Document::new("localfile", "localfile:x", "p1", "", extract::MIME_PDF);
        let bytes = vec![0u8; 100];
        let out = convert(doc, &bytes, 10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.metadata.get("conversion_failed").unwrap(), true);
        assert_eq!(out.content_type, "md");
    }

    #[tokio::test]
    async fn invalid_pdf_bytes_produce_fallback_document() {
        let doc = Document::new("localfile", "localfile:x", "p1", "", extract::MIME_PDF);
        let out = convert(doc, b"not a pdf", 1_000_000, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.metadata.get("conversion_failed").unwrap(), true);
    }

    #[tokio::test]
    async fn unsupported_content_type_errors() {
        let doc = Document::new("localfile", "localfile:x", "p1", "", "application/octet-stream");
        let result = convert(doc, b"data", 1_000_000, Duration::from_secs(5)).await;
        assert!(result.is_err());
    }
}
