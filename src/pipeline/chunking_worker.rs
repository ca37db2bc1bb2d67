//! Chunking stage: offloads the CPU-bound chunking strategies to
//! a blocking-thread pool and enforces the adaptive per-document timeout.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::chunking::chunk_document;
use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document};

use super::resource_manager::adaptive_chunk_timeout;

pub struct ChunkOutcome {
    pub document: Document,
    pub chunks: Vec<Chunk>,
}

pub enum ChunkFailure {
    Timeout { document_id: String, budget_secs: f64 },
    JoinError { document_id: String, message: String },
}

/// Chunk one document, bounded by `semaphore` (models `max_chunk_workers`
/// concurrency) and the adaptive timeout for its size.
pub async fn chunk_one(
    document: Document,
    chunking_config: ChunkingConfig,
    semaphore: Arc<Semaphore>,
) -> Result<ChunkOutcome, ChunkFailure> {
    let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
    let timeout = adaptive_chunk_timeout(document.content.len());
    let document_id = document.id.clone();

    let doc_for_blocking = document.clone();
    let join = tokio::task::spawn_blocking(move || {
        let chunks = chunk_document(&doc_for_blocking, &chunking_config);
        (doc_for_blocking, chunks)
    });

    match tokio::time::timeout(timeout, join).await {
        Ok(Ok((document, chunks))) => Ok(ChunkOutcome { document, chunks }),
        Ok(Err(join_err)) => Err(ChunkFailure::JoinError {
            document_id,
            message: join_err.to_string(),
        }),
        Err(_) => Err(ChunkFailure::Timeout {
            document_id,
            budget_secs: timeout.as_secs_f64(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chunks_a_small_document() {
        let doc = Document::new("localfile", "localfile:x", "p1", "hello world", "text");
        let semaphore = Arc::new(Semaphore::new(2));
        let outcome = chunk_one(doc, ChunkingConfig::default(), semaphore).await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.ok().unwrap().chunks.len(), 1);
    }
}
