//! Relational persistence for [`IngestionState`].
//!
//! Accessed through an async session per call; writes for different
//! documents may proceed concurrently — there is no cross-document
//! transaction, matching the shared-resource policy for the state store.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::models::IngestionState;

pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, document_id: &str) -> anyhow::Result<Option<IngestionState>> {
        let row = sqlx::query(
            "SELECT document_id, project_id, source_type, source, content_hash, \
             last_ingested_at, url, title \
             FROM qdrant_loader_ingestion_history WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| IngestionState {
            document_id: r.get("document_id"),
            project_id: r.get("project_id"),
            source_type: r.get("source_type"),
            source: r.get("source"),
            content_hash: r.get("content_hash"),
            last_ingested_at: DateTime::<Utc>::from_timestamp(r.get::<i64, _>("last_ingested_at"), 0)
                .unwrap_or_else(Utc::now),
            title: r.get("title"),
            url: r.get("url"),
        }))
    }

    /// All state rows matching a (project_id, source_type, source) filter —
    /// used by change detection to find documents that disappeared from the
    /// incoming set (candidates for `deleted`).
    pub async fn list_by_filter(
        &self,
        project_id: &str,
        source_type: Option<&str>,
        source: Option<&str>,
    ) -> anyhow::Result<Vec<IngestionState>> {
        let rows = sqlx::query(
            "SELECT document_id, project_id, source_type, source, content_hash, \
             last_ingested_at, url, title \
             FROM qdrant_loader_ingestion_history \
             WHERE project_id = ? \
               AND (?1 IS NULL OR source_type = ?2) \
               AND (?3 IS NULL OR source = ?4)",
        )
        .bind(project_id)
        .bind(source_type)
        .bind(source_type)
        .bind(source)
        .bind(source)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| IngestionState {
                document_id: r.get("document_id"),
                project_id: r.get("project_id"),
                source_type: r.get("source_type"),
                source: r.get("source"),
                content_hash: r.get("content_hash"),
                last_ingested_at: DateTime::<Utc>::from_timestamp(
                    r.get::<i64, _>("last_ingested_at"),
                    0,
                )
                .unwrap_or_else(Utc::now),
                title: r.get("title"),
                url: r.get("url"),
            })
            .collect())
    }

    /// Advance state for a document — only called after every chunk of the
    /// document has had its upsert acknowledged by the vector store.
    pub async fn advance(&self, state: &IngestionState) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO qdrant_loader_ingestion_history \
             (document_id, project_id, source_type, source, content_hash, last_ingested_at, url, title) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(document_id) DO UPDATE SET \
               content_hash = excluded.content_hash, \
               last_ingested_at = excluded.last_ingested_at, \
               url = excluded.url, \
               title = excluded.title",
        )
        .bind(&state.document_id)
        .bind(&state.project_id)
        .bind(&state.source_type)
        .bind(&state.source)
        .bind(&state.content_hash)
        .bind(state.last_ingested_at.timestamp())
        .bind(&state.url)
        .bind(&state.title)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, document_id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM qdrant_loader_ingestion_history WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
