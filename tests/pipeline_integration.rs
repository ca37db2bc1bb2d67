//! End-to-end coverage for the ingestion pipeline and search engine, driven
//! directly against the library API rather than a spawned process.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;

use corpusloader::config::{
    ChunkingConfig, Config, EmbeddingConfig, GlobalConfig, LocalFileSourceConfig, PipelineConfig,
    ProjectConfig, ProjectOverrides, RetrievalConfig, ServerConfig, SourcesConfig, StateDbConfig,
    VectorStoreConfig,
};
use corpusloader::embedding::EmbeddingProvider;
use corpusloader::migrate;
use corpusloader::nlp::{HeuristicNlpAnalyzer, NlpAnalyzer};
use corpusloader::pipeline::orchestrator::Orchestrator;
use corpusloader::pipeline::resource_manager::CancellationSignal;
use corpusloader::rpc;
use corpusloader::search::hybrid::{HybridSearchEngine, SearchRequest};
use corpusloader::state_store::StateStore;
use corpusloader::vector_store::{Distance, SqliteVectorStore, VectorStoreClient};

/// Deterministic stand-in for a real embedding provider: maps each text to a
/// small vector derived from word overlap with a fixed vocabulary, so
/// semantically similar texts land closer together under cosine similarity
/// without requiring network access in tests.
struct FakeEmbeddingProvider {
    vocab: Vec<&'static str>,
}

impl FakeEmbeddingProvider {
    fn new() -> Self {
        Self {
            vocab: vec![
                "kubernetes", "deployment", "database", "migration", "retry", "backoff",
                "authentication", "token", "cache", "invalidation",
            ],
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        self.vocab
            .iter()
            .map(|term| if lower.contains(term) { 1.0 } else { 0.0 })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    fn model_name(&self) -> &str {
        "fake-test-provider"
    }

    fn dims(&self) -> usize {
        self.vocab.len()
    }

    async fn embed_batch(&self, texts: &[String], _timeout: Duration) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

struct TestHarness {
    _tmp: TempDir,
    config: Config,
    pool: sqlx::sqlite::SqlitePool,
    vector_store: Arc<dyn VectorStoreClient>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    nlp: Arc<dyn NlpAnalyzer>,
}

async fn build_harness(projects: HashMap<String, ProjectConfig>) -> Result<TestHarness> {
    let tmp = TempDir::new()?;
    let db_path = tmp.path().join("state.db");

    let config = Config {
        global: GlobalConfig {
            state_db: StateDbConfig {
                path: db_path.clone(),
                pool_size: 4,
                pool_timeout_secs: 5,
            },
            vector_store: VectorStoreConfig {
                url: "sqlite".to_string(),
                api_key: None,
                collection_name: "test_collection".to_string(),
                vector_size: Some(10),
            },
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            pipeline: PipelineConfig::default(),
            server: ServerConfig::default(),
        },
        projects,
    };

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;
    migrate::run_migrations(&pool).await?;

    let vector_store: Arc<dyn VectorStoreClient> = Arc::new(SqliteVectorStore::new(pool.clone()));
    vector_store
        .ensure_collection(&config.global.vector_store.collection_name, 10, Distance::Cosine)
        .await?;

    let embedding_provider: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbeddingProvider::new());
    let nlp: Arc<dyn NlpAnalyzer> = Arc::new(HeuristicNlpAnalyzer::new());

    Ok(TestHarness {
        _tmp: tmp,
        config,
        pool,
        vector_store,
        embedding_provider,
        nlp,
    })
}

fn local_file_project(root: PathBuf) -> ProjectConfig {
    let mut sources = SourcesConfig::default();
    sources.localfile.insert(
        "docs".to_string(),
        LocalFileSourceConfig {
            root,
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: vec![],
        },
    );
    ProjectConfig {
        display_name: "Test project".to_string(),
        description: None,
        sources,
        overrides: ProjectOverrides::default(),
    }
}

fn write_doc(dir: &std::path::Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn engine_for(harness: &TestHarness) -> HybridSearchEngine {
    HybridSearchEngine::new(
        harness.vector_store.clone(),
        harness.embedding_provider.clone(),
        harness.nlp.clone(),
        harness.config.global.retrieval.clone(),
        harness.config.global.vector_store.collection_name.clone(),
    )
}

#[tokio::test]
async fn ingest_then_search_finds_the_ingested_document() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(
        tmp.path(),
        "deploy.md",
        "# Deployment\nRolling out a new Kubernetes deployment requires a readiness probe.",
    );

    let mut projects = HashMap::new();
    projects.insert("proj-a".to_string(), local_file_project(tmp.path().to_path_buf()));
    let harness = build_harness(projects).await?;

    let orchestrator = Orchestrator::new(
        harness.config.clone(),
        StateStore::new(harness.pool.clone()),
        harness.vector_store.clone(),
        harness.embedding_provider.clone(),
        CancellationSignal::new(),
    );
    let result = orchestrator.process("proj-a").await?;
    assert_eq!(result.error_count, 0);
    assert!(result.success_count > 0);

    let engine = engine_for(&harness);
    let results = engine
        .search(SearchRequest {
            query: "kubernetes deployment".to_string(),
            limit: 5,
            ..Default::default()
        })
        .await?;
    assert!(!results.is_empty(), "expected at least one hit for an ingested document");
    let expected_id = result_document_id(&harness).await?;
    assert!(results.iter().any(|r| r.document_id == expected_id));
    Ok(())
}

/// Looks up the one document id ingestion_history currently holds, so the
/// search-result assertion above doesn't hardcode a derived UUID.
async fn result_document_id(harness: &TestHarness) -> Result<String> {
    let id: String = sqlx::query_scalar("SELECT document_id FROM qdrant_loader_ingestion_history LIMIT 1")
        .fetch_one(&harness.pool)
        .await?;
    Ok(id)
}

#[tokio::test]
async fn change_detection_skips_unchanged_documents_on_second_run() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(tmp.path(), "runbook.md", "Restart the service and check the logs.");

    let mut projects = HashMap::new();
    projects.insert("proj-a".to_string(), local_file_project(tmp.path().to_path_buf()));
    let harness = build_harness(projects).await?;

    let orchestrator = Orchestrator::new(
        harness.config.clone(),
        StateStore::new(harness.pool.clone()),
        harness.vector_store.clone(),
        harness.embedding_provider.clone(),
        CancellationSignal::new(),
    );

    let first = orchestrator.process("proj-a").await?;
    assert_eq!(first.success_count, 1);

    let second = orchestrator.process("proj-a").await?;
    assert_eq!(second.success_count, 0, "unchanged document should not be reprocessed");
    assert_eq!(second.error_count, 0);
    Ok(())
}

#[tokio::test]
async fn updated_document_is_reingested_and_replaces_its_chunks() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(tmp.path(), "notes.md", "Initial content about caching.");

    let mut projects = HashMap::new();
    projects.insert("proj-a".to_string(), local_file_project(tmp.path().to_path_buf()));
    let harness = build_harness(projects).await?;

    let orchestrator = Orchestrator::new(
        harness.config.clone(),
        StateStore::new(harness.pool.clone()),
        harness.vector_store.clone(),
        harness.embedding_provider.clone(),
        CancellationSignal::new(),
    );
    orchestrator.process("proj-a").await?;

    write_doc(tmp.path(), "notes.md", "Updated content about cache invalidation strategies.");
    let second = orchestrator.process("proj-a").await?;
    assert_eq!(second.success_count, 1, "modified document should be reprocessed");

    let engine = engine_for(&harness);
    let results = engine
        .search(SearchRequest {
            query: "cache invalidation".to_string(),
            limit: 5,
            ..Default::default()
        })
        .await?;
    assert!(results.iter().any(|r| r
        .metadata
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_lowercase()
        .contains("invalidation")));
    Ok(())
}

#[tokio::test]
async fn search_is_isolated_between_projects() -> Result<()> {
    let tmp_a = TempDir::new()?;
    let tmp_b = TempDir::new()?;
    write_doc(tmp_a.path(), "a.md", "Project A discusses database migration retries.");
    write_doc(tmp_b.path(), "b.md", "Project B discusses authentication token handling.");

    let mut projects = HashMap::new();
    projects.insert("proj-a".to_string(), local_file_project(tmp_a.path().to_path_buf()));
    projects.insert("proj-b".to_string(), local_file_project(tmp_b.path().to_path_buf()));
    let harness = build_harness(projects).await?;

    let orchestrator = Orchestrator::new(
        harness.config.clone(),
        StateStore::new(harness.pool.clone()),
        harness.vector_store.clone(),
        harness.embedding_provider.clone(),
        CancellationSignal::new(),
    );
    orchestrator.process_all_projects().await?;

    let engine = engine_for(&harness);
    let results = engine
        .search(SearchRequest {
            query: "database migration".to_string(),
            limit: 10,
            project_ids: Some(vec!["proj-b".to_string()]),
            ..Default::default()
        })
        .await?;
    assert!(
        results.iter().all(|r| r.project_id == "proj-b"),
        "a project_ids filter on proj-b must never surface proj-a's documents"
    );
    Ok(())
}

#[test]
fn malformed_rpc_request_over_stdio_yields_a_parse_or_invalid_request_error() {
    let bad_json = rpc::parse_request("not json at all").unwrap_err();
    assert_eq!(bad_json.error.as_ref().unwrap().code, rpc::PARSE_ERROR);

    let missing_method = rpc::parse_request(r#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
    assert_eq!(missing_method.error.as_ref().unwrap().code, rpc::INVALID_REQUEST);

    let not_an_object = rpc::parse_request("[1, 2, 3]").unwrap_err();
    assert_eq!(not_an_object.error.as_ref().unwrap().code, rpc::INVALID_REQUEST);
}
