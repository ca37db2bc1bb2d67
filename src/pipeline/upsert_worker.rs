//! Upsert stage: groups embedded chunks into `upsert_batch_size`
//! batches, writes them to the vector store, and tracks whether every chunk
//! of a document was successfully upserted.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::models::{Document, EmbeddedChunk, VectorPoint};
use crate::vector_store::VectorStoreClient;

pub struct UpsertOutcome {
    pub document: Document,
    /// True only if every chunk belonging to the document succeeded.
    pub fully_succeeded: bool,
    pub succeeded_chunks: usize,
    pub failed_chunks: usize,
}

pub async fn upsert_document(
    document: Document,
    embedded: Vec<EmbeddedChunk>,
    pre_failed_chunks: usize,
    collection_name: &str,
    store: Arc<dyn VectorStoreClient>,
    batch_size: usize,
    semaphore: Arc<Semaphore>,
) -> UpsertOutcome {
    let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");

    let mut succeeded = 0usize;
    let mut failed = pre_failed_chunks;

    for batch in embedded.chunks(batch_size.max(1)) {
        let points: Vec<VectorPoint> = batch
            .iter()
            .map(|e| VectorPoint::from_embedded_chunk(e, &document))
            .collect();
        let count = points.len();
        match store.upsert_points(collection_name, points).await {
            Ok(()) => succeeded += count,
            Err(e) => {
                tracing::warn!(document_id = %document.id, error = %e, "upsert batch failed");
                failed += count;
            }
        }
    }

    UpsertOutcome {
        fully_succeeded: failed == 0 && succeeded > 0,
        document,
        succeeded_chunks: succeeded,
        failed_chunks: failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::{Distance, SqliteVectorStore};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> Arc<dyn VectorStoreClient> {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        let store = SqliteVectorStore::new(pool);
        store.ensure_collection("p1", 3, Distance::Cosine).await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn fully_succeeds_when_all_chunks_upsert() {
        let document = Document::new("localfile", "localfile:x", "p1", "hello", "text");
        let chunk = crate::models::Chunk {
            id: crate::models::Chunk::new_id(),
            document_id: document.id.clone(),
            content: "hello".into(),
            chunk_index: 0,
            total_chunks: 1,
            chunk_size: 5,
            chunking_strategy: "default_text".into(),
            metadata: Default::default(),
        };
        let embedded = vec![EmbeddedChunk {
            chunk,
            vector: vec![1.0, 0.0, 0.0],
        }];
        let store = store().await;
        let semaphore = Arc::new(Semaphore::new(1));
        let outcome = upsert_document(document, embedded, 0, "p1", store, 64, semaphore).await;
        assert!(outcome.fully_succeeded);
        assert_eq!(outcome.succeeded_chunks, 1);
    }

    #[tokio::test]
    async fn pre_failed_chunks_prevent_full_success() {
        let document = Document::new("localfile", "localfile:x", "p1", "hello", "text");
        let store = store().await;
        let semaphore = Arc::new(Semaphore::new(1));
        let outcome = upsert_document(document, vec![], 1, "p1", store, 64, semaphore).await;
        assert!(!outcome.fully_succeeded);
    }
}
