//! Database statistics and health overview.
//!
//! Adds a `stats` subcommand alongside the RPC/CLI surface, giving a quick
//! confidence check that ingestion and embedding are working without a full
//! server bring-up.

use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::config::Config;

struct SourceStats {
    project_id: String,
    source_type: String,
    doc_count: i64,
    last_ingested_ts: Option<i64>,
}

/// Run the stats command against an already-migrated state database.
pub async fn run_stats(config: &Config, pool: &SqlitePool) -> Result<()> {
    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qdrant_loader_ingestion_history")
        .fetch_one(pool)
        .await?;

    let total_points: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qdrant_loader_vector_points")
        .fetch_one(pool)
        .await?;

    let db_size = std::fs::metadata(&config.global.state_db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("corpusloader — state database stats");
    println!("====================================");
    println!();
    println!("  Database:        {}", config.global.state_db.path.display());
    println!("  Size:            {}", format_bytes(db_size));
    println!();
    println!("  Documents:       {total_docs}");
    println!("  Vector points:   {total_points}");

    let source_rows = sqlx::query(
        "SELECT project_id, source_type, COUNT(*) AS doc_count, MAX(last_ingested_at) AS last_ts \
         FROM qdrant_loader_ingestion_history \
         GROUP BY project_id, source_type \
         ORDER BY doc_count DESC",
    )
    .fetch_all(pool)
    .await?;

    let source_stats: Vec<SourceStats> = source_rows
        .iter()
        .map(|r| SourceStats {
            project_id: r.get("project_id"),
            source_type: r.get("source_type"),
            doc_count: r.get("doc_count"),
            last_ingested_ts: r.get("last_ts"),
        })
        .collect();

    if !source_stats.is_empty() {
        println!();
        println!("  By project / source type:");
        println!("  {:<16} {:<14} {:>6}   {}", "PROJECT", "SOURCE TYPE", "DOCS", "LAST INGESTED");
        println!("  {}", "-".repeat(64));
        for s in &source_stats {
            let last = s
                .last_ingested_ts
                .map(format_ts_relative)
                .unwrap_or_else(|| "never".to_string());
            println!("  {:<16} {:<14} {:>6}   {}", s.project_id, s.source_type, s.doc_count, last);
        }
    }

    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{mins} min{} ago", if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{hours} hour{} ago", if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{days} day{} ago", if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
