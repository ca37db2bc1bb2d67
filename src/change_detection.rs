//! Change detection: classify incoming documents against prior ingestion
//! state as `new`, `updated`, `unchanged`, or `deleted`.

use std::collections::HashSet;

use crate::models::{ChangeStatus, Document, IngestionState};
use crate::state_store::StateStore;

pub struct ClassifiedDocument {
    pub document: Document,
    pub status: ChangeStatus,
}

/// Classify a batch of incoming documents against the state store, and
/// return the document ids considered `deleted` (present in prior state,
/// absent from the incoming set, matching the same project/source filter).
///
/// State is not mutated here — callers advance/remove rows only after the
/// vector store confirms the corresponding upsert or delete.
pub async fn classify(
    store: &StateStore,
    documents: Vec<Document>,
    project_id: &str,
    source_type_filter: Option<&str>,
    source_filter: Option<&str>,
) -> anyhow::Result<(Vec<ClassifiedDocument>, Vec<IngestionState>)> {
    let mut classified = Vec::with_capacity(documents.len());
    let mut incoming_ids: HashSet<String> = HashSet::with_capacity(documents.len());

    for document in documents {
        incoming_ids.insert(document.id.clone());
        let fingerprint = document.content_fingerprint();
        let status = match store.get(&document.id).await? {
            None => ChangeStatus::New,
            Some(prior) if prior.content_hash != fingerprint => ChangeStatus::Updated,
            Some(_) => ChangeStatus::Unchanged,
        };
        classified.push(ClassifiedDocument { document, status });
    }

    let prior_rows = store
        .list_by_filter(project_id, source_type_filter, source_filter)
        .await?;
    let deleted: Vec<IngestionState> = prior_rows
        .into_iter()
        .filter(|row| !incoming_ids.contains(&row.document_id))
        .collect();

    Ok((classified, deleted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;
    use chrono::Utc;

    async fn setup() -> (sqlx::SqlitePool, StateStore) {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (pool.clone(), StateStore::new(pool))
    }

    #[tokio::test]
    async fn unseen_document_classifies_as_new() {
        let (_pool, store) = setup().await;
        let doc = Document::new("localfile", "localfile:docs", "p1", "hello", "md");
        let (classified, deleted) =
            classify(&store, vec![doc], "p1", None, None).await.unwrap();
        assert_eq!(classified.len(), 1);
        assert!(matches!(classified[0].status, ChangeStatus::New));
        assert!(deleted.is_empty());
    }

    #[tokio::test]
    async fn unchanged_content_after_advance() {
        let (_pool, store) = setup().await;
        let doc = Document::new("localfile", "localfile:docs", "p1", "hello", "md");
        let fingerprint = doc.content_fingerprint();
        store
            .advance(&IngestionState {
                document_id: doc.id.clone(),
                project_id: "p1".to_string(),
                source_type: "localfile".to_string(),
                source: "localfile:docs".to_string(),
                content_hash: fingerprint,
                last_ingested_at: Utc::now(),
                title: None,
                url: None,
            })
            .await
            .unwrap();

        let (classified, _) = classify(&store, vec![doc], "p1", None, None)
            .await
            .unwrap();
        assert!(matches!(classified[0].status, ChangeStatus::Unchanged));
    }

    #[tokio::test]
    async fn missing_prior_row_is_deleted() {
        let (_pool, store) = setup().await;
        store
            .advance(&IngestionState {
                document_id: "doc-gone".to_string(),
                project_id: "p1".to_string(),
                source_type: "localfile".to_string(),
                source: "localfile:docs".to_string(),
                content_hash: "abc".to_string(),
                last_ingested_at: Utc::now(),
                title: None,
                url: None,
            })
            .await
            .unwrap();

        let (_classified, deleted) = classify(&store, vec![], "p1", None, None)
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].document_id, "doc-gone");
    }
}
