//! Embedding stage: batches a document's chunks and calls the
//! embedding provider, preserving chunk order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::embedding::EmbeddingProvider;
use crate::models::{Chunk, Document, EmbeddedChunk};

use super::resource_manager::memory_pressure_ratio;

const EMBED_BATCH_TIMEOUT: Duration = Duration::from_secs(300);
const MEMORY_CLEANUP_THRESHOLD: f64 = 0.85;

pub struct EmbedOutcome {
    pub document: Document,
    pub embedded: Vec<EmbeddedChunk>,
    pub total_chunks: usize,
    pub failed_chunks: usize,
}

/// Embed all chunks belonging to one document, in `batch_size`-sized groups,
/// bounded by `semaphore` (`max_embed_workers`). A failing group marks its
/// chunks failed but does not abort the remaining groups — matching the
/// "batch failure does not halt the stage" requirement.
pub async fn embed_document(
    document: Document,
    chunks: Vec<Chunk>,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    semaphore: Arc<Semaphore>,
) -> EmbedOutcome {
    let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
    let total_chunks = chunks.len();
    let mut embedded = Vec::with_capacity(total_chunks);
    let mut failed_chunks = 0usize;

    for batch in chunks.chunks(batch_size.max(1)) {
        if memory_pressure_ratio() > MEMORY_CLEANUP_THRESHOLD {
            // Rust has no explicit GC; the equivalent cleanup is dropping
            // the accumulated embedded-chunk buffer's excess capacity
            // before continuing, rather than letting it grow unbounded.
            embedded.shrink_to_fit();
            tracing::debug!(document_id = %document.id, "memory pressure above threshold, shrank embedding buffer");
        }

        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        match provider.embed_batch(&texts, EMBED_BATCH_TIMEOUT).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                for (chunk, vector) in batch.iter().zip(vectors) {
                    embedded.push(EmbeddedChunk {
                        chunk: chunk.clone(),
                        vector,
                    });
                }
            }
            Ok(_) => {
                tracing::warn!(
                    document_id = %document.id,
                    "embedding provider returned a mismatched vector count for batch"
                );
                failed_chunks += batch.len();
            }
            Err(e) => {
                tracing::warn!(document_id = %document.id, error = %e, "embedding batch failed");
                failed_chunks += batch.len();
            }
        }
    }

    EmbedOutcome {
        document,
        embedded,
        total_chunks,
        failed_chunks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledProvider;

    #[tokio::test]
    async fn embeds_all_chunks_when_provider_succeeds() {
        let document = Document::new("localfile", "localfile:x", "p1", "hello", "text");
        let chunks = vec![Chunk {
            id: Chunk::new_id(),
            document_id: document.id.clone(),
            content: "hello".to_string(),
            chunk_index: 0,
            total_chunks: 1,
            chunk_size: 5,
            chunking_strategy: "default_text".to_string(),
            metadata: Default::default(),
        }];
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(DisabledProvider);
        let semaphore = Arc::new(Semaphore::new(1));
        let outcome = embed_document(document, chunks, provider, 64, semaphore).await;
        assert_eq!(outcome.total_chunks, 1);
        assert_eq!(outcome.failed_chunks, 0);
        assert_eq!(outcome.embedded.len(), 1);
    }
}
