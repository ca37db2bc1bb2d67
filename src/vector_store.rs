//! Vector store client contract.
//!
//! The vector database engine itself is an external collaborator; this
//! module only fixes the operations the system issues against it —
//! `ensure_collection`, `upsert_points`, `delete_points_by_document_id`,
//! `search`, and `search_with_project_filter` — behind the
//! [`VectorStoreClient`] trait, so a real networked client (e.g. a
//! `qdrant-client`-backed implementation) can be swapped in without
//! touching the pipeline or search engine.
//!
//! [`SqliteVectorStore`] is the default implementation: it generalizes this
//! codebase's existing SQLite substrate (cosine similarity over a BLOB
//! column, FTS5 for sparse lookups) into a store that satisfies the full
//! contract, including payload indexing and per-document deletes. This
//! keeps the crate runnable without standing up an external vector
//! database, while leaving room for a networked client grounded on the
//! same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::errors::VectorStoreError;
use crate::models::{Metadata, ScoredPoint, VectorPoint, PAYLOAD_INDEXED_FIELDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Cosine,
}

/// A conjunction of field conditions, e.g. `project_id IN [...]`.
#[derive(Debug, Clone, Default)]
pub struct FieldFilter {
    pub project_id_in: Option<Vec<String>>,
    pub source_type_in: Option<Vec<String>>,
}

impl FieldFilter {
    pub fn matches(&self, payload: &Metadata) -> bool {
        if let Some(ids) = &self.project_id_in {
            let project_id = payload.get("project_id").and_then(|v| v.as_str());
            if !project_id.map(|p| ids.iter().any(|i| i == p)).unwrap_or(false) {
                return false;
            }
        }
        if let Some(types) = &self.source_type_in {
            let source_type = payload.get("source_type").and_then(|v| v.as_str());
            if !types
                .iter()
                .any(|t| Some(t.as_str()) == source_type)
            {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    /// Create the collection if missing, and create payload indexes on the
    /// fields listed in [`PAYLOAD_INDEXED_FIELDS`].
    async fn ensure_collection(
        &self,
        collection_name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<(), VectorStoreError>;

    /// Upsert a batch of points atomically: either all succeed or the batch
    /// is reported as failed to the caller.
    async fn upsert_points(
        &self,
        collection_name: &str,
        points: Vec<VectorPoint>,
    ) -> Result<(), VectorStoreError>;

    async fn delete_points_by_document_id(
        &self,
        collection_name: &str,
        document_ids: &[String],
    ) -> Result<(), VectorStoreError>;

    async fn search(
        &self,
        collection_name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError>;

    /// Sparse/keyword search over payload text, used by the hybrid engine's
    /// keyword leg. The vector store is treated as supplying this via its
    /// scroll/filter API, or an FTS-backed equivalent.
    async fn search_sparse(
        &self,
        collection_name: &str,
        query: &str,
        limit: usize,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError>;

    async fn search_with_project_filter(
        &self,
        collection_name: &str,
        vector: &[f32],
        project_ids: &[String],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        let filter = FieldFilter {
            project_id_in: Some(project_ids.to_vec()),
            source_type_in: None,
        };
        self.search(collection_name, vector, limit, Some(&filter))
            .await
    }
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn encode_vector(vector: &[f32]) -> Vec<u8> {
        vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn decode_vector(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            (dot / (norm_a * norm_b)) as f64
        }
    }
}

#[async_trait]
impl VectorStoreClient for SqliteVectorStore {
    async fn ensure_collection(
        &self,
        _collection_name: &str,
        _vector_size: usize,
        _distance: Distance,
    ) -> Result<(), VectorStoreError> {
        // The underlying table is shared across all collections and already
        // created by `migrate::run_migrations`; payload indexes are modeled
        // as ordinary SQL indexes over the payload_json extraction, which
        // migrations also create. Nothing else to do per-collection.
        tracing::debug!(
            fields = ?PAYLOAD_INDEXED_FIELDS,
            "collection ensured; payload indexes assumed present from migrations"
        );
        Ok(())
    }

    async fn upsert_points(
        &self,
        collection_name: &str,
        points: Vec<VectorPoint>,
    ) -> Result<(), VectorStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VectorStoreError::UpsertRejected {
                collection: collection_name.to_string(),
                message: e.to_string(),
            })?;

        for point in &points {
            let document_id = point
                .payload
                .get("document_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let project_id = point
                .payload
                .get("project_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let payload_json = serde_json::to_string(&point.payload).unwrap_or_default();
            let vector_bytes = Self::encode_vector(&point.vector);

            sqlx::query(
                "INSERT INTO qdrant_loader_vector_points \
                 (id, collection_name, document_id, project_id, vector, payload_json) \
                 VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(id) DO UPDATE SET \
                   document_id = excluded.document_id, \
                   project_id = excluded.project_id, \
                   vector = excluded.vector, \
                   payload_json = excluded.payload_json",
            )
            .bind(&point.id)
            .bind(collection_name)
            .bind(&document_id)
            .bind(&project_id)
            .bind(&vector_bytes)
            .bind(&payload_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| VectorStoreError::UpsertRejected {
                collection: collection_name.to_string(),
                message: e.to_string(),
            })?;

            let content = point
                .payload
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            sqlx::query(
                "DELETE FROM qdrant_loader_vector_points_fts WHERE point_id = ? AND collection_name = ?",
            )
            .bind(&point.id)
            .bind(collection_name)
            .execute(&mut *tx)
            .await
            .ok();
            sqlx::query(
                "INSERT INTO qdrant_loader_vector_points_fts (point_id, collection_name, content) \
                 VALUES (?, ?, ?)",
            )
            .bind(&point.id)
            .bind(collection_name)
            .bind(content)
            .execute(&mut *tx)
            .await
            .map_err(|e| VectorStoreError::UpsertRejected {
                collection: collection_name.to_string(),
                message: e.to_string(),
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| VectorStoreError::UpsertRejected {
                collection: collection_name.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn delete_points_by_document_id(
        &self,
        collection_name: &str,
        document_ids: &[String],
    ) -> Result<(), VectorStoreError> {
        if document_ids.is_empty() {
            return Ok(());
        }
        let placeholders = document_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "DELETE FROM qdrant_loader_vector_points \
             WHERE collection_name = ? AND document_id IN ({placeholders})"
        );
        let mut q = sqlx::query(&query).bind(collection_name);
        for id in document_ids {
            q = q.bind(id);
        }
        q.execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::UpsertRejected {
                collection: collection_name.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn search(
        &self,
        collection_name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        let rows = sqlx::query(
            "SELECT id, vector, payload_json FROM qdrant_loader_vector_points \
             WHERE collection_name = ?",
        )
        .bind(collection_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VectorStoreError::Unreachable {
            url: collection_name.to_string(),
            message: e.to_string(),
        })?;

        let mut scored: Vec<ScoredPoint> = rows
            .into_iter()
            .filter_map(|row| {
                let payload_json: String = row.get("payload_json");
                let payload: Metadata = serde_json::from_str(&payload_json).ok()?;
                if let Some(f) = filter {
                    if !f.matches(&payload) {
                        return None;
                    }
                }
                let vector_bytes: Vec<u8> = row.get("vector");
                let candidate = Self::decode_vector(&vector_bytes);
                let score = Self::cosine_similarity(vector, &candidate);
                Some(ScoredPoint {
                    id: row.get("id"),
                    score,
                    payload,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn search_sparse(
        &self,
        collection_name: &str,
        query: &str,
        limit: usize,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }
        let match_query = fts_escape(query);
        let rows = sqlx::query(
            "SELECT fts.point_id AS id, bm25(qdrant_loader_vector_points_fts) AS rank, \
                    vp.payload_json AS payload_json \
             FROM qdrant_loader_vector_points_fts fts \
             JOIN qdrant_loader_vector_points vp \
               ON vp.id = fts.point_id AND vp.collection_name = fts.collection_name \
             WHERE fts.collection_name = ? AND qdrant_loader_vector_points_fts MATCH ? \
             ORDER BY rank LIMIT ?",
        )
        .bind(collection_name)
        .bind(&match_query)
        .bind(limit as i64 * 4)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VectorStoreError::Unreachable {
            url: collection_name.to_string(),
            message: e.to_string(),
        })?;

        let mut scored: Vec<ScoredPoint> = rows
            .into_iter()
            .filter_map(|row| {
                let payload_json: String = row.get("payload_json");
                let payload: Metadata = serde_json::from_str(&payload_json).ok()?;
                if let Some(f) = filter {
                    if !f.matches(&payload) {
                        return None;
                    }
                }
                // bm25() returns lower-is-better; invert into a positive
                // higher-is-better score for the combiner.
                let rank: f64 = row.get("rank");
                let score = 1.0 / (1.0 + rank.max(0.0));
                Some(ScoredPoint {
                    id: row.get("id"),
                    score,
                    payload,
                })
            })
            .collect();
        scored.truncate(limit);
        Ok(scored)
    }
}

/// Escape FTS5 query syntax characters so arbitrary user queries can't break
/// the MATCH expression.
fn fts_escape(query: &str) -> String {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect();
    tokens.join(" OR ")
}

/// A unified payload map reconstructible into the fields vector search and
/// sparse search both populate, kept here to document the shared shape.
pub fn empty_payload() -> HashMap<String, Value> {
    HashMap::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;

    async fn store() -> SqliteVectorStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        SqliteVectorStore::new(pool)
    }

    #[tokio::test]
    async fn upsert_then_search_returns_nearest() {
        let store = store().await;
        let mut payload = Metadata::new();
        payload.insert("document_id".into(), Value::String("doc-1".into()));
        payload.insert("project_id".into(), Value::String("p1".into()));
        let point = VectorPoint {
            id: "chunk-1".to_string(),
            vector: vec![1.0, 0.0],
            payload,
        };
        store
            .upsert_points("coll", vec![point])
            .await
            .unwrap();

        let results = store.search("coll", &[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn delete_by_document_id_removes_point() {
        let store = store().await;
        let mut payload = Metadata::new();
        payload.insert("document_id".into(), Value::String("doc-1".into()));
        payload.insert("project_id".into(), Value::String("p1".into()));
        let point = VectorPoint {
            id: "chunk-1".to_string(),
            vector: vec![1.0, 0.0],
            payload,
        };
        store.upsert_points("coll", vec![point]).await.unwrap();
        store
            .delete_points_by_document_id("coll", &["doc-1".to_string()])
            .await
            .unwrap();
        let results = store.search("coll", &[1.0, 0.0], 5, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn project_filter_excludes_other_projects() {
        let store = store().await;
        for (id, project) in [("chunk-1", "alpha"), ("chunk-2", "beta")] {
            let mut payload = Metadata::new();
            payload.insert("document_id".into(), Value::String(format!("doc-{id}")));
            payload.insert("project_id".into(), Value::String(project.into()));
            store
                .upsert_points(
                    "coll",
                    vec![VectorPoint {
                        id: id.to_string(),
                        vector: vec![1.0, 0.0],
                        payload,
                    }],
                )
                .await
                .unwrap();
        }
        let results = store
            .search_with_project_filter("coll", &[1.0, 0.0], &["alpha".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].payload.get("project_id").and_then(|v| v.as_str()),
            Some("alpha")
        );
    }
}
