//! Relational state-store schema migrations.
//!
//! Tables are prefixed `qdrant_loader_` to match the persisted-state layout
//! of the ingestion history and vector point tables. Execution is
//! idempotent so it can be safely re-run on every process start.

use sqlx::sqlite::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS qdrant_loader_ingestion_history (
            document_id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            source_type TEXT NOT NULL,
            source TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            last_ingested_at INTEGER NOT NULL,
            url TEXT,
            title TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ingestion_history_project \
         ON qdrant_loader_ingestion_history(project_id, source_type, source)",
    )
    .execute(pool)
    .await?;

    // Local vector store substrate: a single process owns the vector
    // collection contract (ensure_collection/upsert/delete/search) against
    // this table, keeping the dense index and payload colocated with state.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS qdrant_loader_vector_points (
            id TEXT PRIMARY KEY,
            collection_name TEXT NOT NULL,
            document_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            vector BLOB NOT NULL,
            payload_json TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vector_points_document \
         ON qdrant_loader_vector_points(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vector_points_project \
         ON qdrant_loader_vector_points(collection_name, project_id)",
    )
    .execute(pool)
    .await?;

    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='qdrant_loader_vector_points_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE qdrant_loader_vector_points_fts USING fts5(
                point_id UNINDEXED,
                collection_name UNINDEXED,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    Ok(())
}
