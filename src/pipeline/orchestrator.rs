//! Pipeline orchestrator: drives one project (or every
//! configured project) through connector scan, change detection, chunking,
//! embedding, and upsert, respecting the overall pipeline timeout and the
//! shared cancellation signal.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::change_detection::{self, ClassifiedDocument};
use crate::config::{Config, ProjectConfig};
use crate::connectors::confluence::ConfluenceConnector;
use crate::connectors::git::GitConnector;
use crate::connectors::jira::JiraConnector;
use crate::connectors::local_file::LocalFileConnector;
use crate::connectors::publicdocs::PublicDocsConnector;
use crate::connectors::Connector;
use crate::embedding::EmbeddingProvider;
use crate::models::{ChangeStatus, Document, IngestionState};
use crate::state_store::StateStore;
use crate::vector_store::VectorStoreClient;

use super::chunking_worker::{chunk_one, ChunkFailure};
use super::embedding_worker::embed_document;
use super::upsert_worker::upsert_document;
use super::resource_manager::CancellationSignal;
use super::PipelineResult;

pub struct Orchestrator {
    config: Config,
    state_store: StateStore,
    vector_store: Arc<dyn VectorStoreClient>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    cancellation: CancellationSignal,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        state_store: StateStore,
        vector_store: Arc<dyn VectorStoreClient>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        cancellation: CancellationSignal,
    ) -> Self {
        Self {
            config,
            state_store,
            vector_store,
            embedding_provider,
            cancellation,
        }
    }

    pub async fn process_all_projects(&self) -> anyhow::Result<HashMap<String, PipelineResult>> {
        let mut results = HashMap::new();
        for project_id in self.config.projects.keys().cloned().collect::<Vec<_>>() {
            let result = self.process(&project_id).await?;
            results.insert(project_id, result);
        }
        Ok(results)
    }

    pub async fn process(&self, project_id: &str) -> anyhow::Result<PipelineResult> {
        let project = self
            .config
            .projects
            .get(project_id)
            .ok_or_else(|| anyhow::anyhow!("unknown project: {project_id}"))?;

        let overall_timeout = std::time::Duration::from_secs(self.config.global.pipeline.pipeline_timeout_secs);
        let documents = self.scan_connectors(project_id, project).await;
        let input_count = documents.len();

        match tokio::time::timeout(overall_timeout, self.run_pipeline(project_id, documents)).await {
            Ok(result) => Ok(result),
            Err(_) => Ok(PipelineResult::timed_out(input_count)),
        }
    }

    async fn scan_connectors(&self, project_id: &str, project: &ProjectConfig) -> Vec<Document> {
        let connectors = build_connectors(project_id, project);
        let mut documents = Vec::new();
        for connector in connectors {
            match connector.get_documents().await {
                Ok(mut docs) => documents.append(&mut docs),
                Err(e) => {
                    tracing::warn!(
                        connector = %connector.source_label(),
                        error = %e,
                        "connector scan failed, continuing with other sources"
                    );
                }
            }
        }
        documents
    }

    async fn run_pipeline(&self, project_id: &str, documents: Vec<Document>) -> PipelineResult {
        let (classified, deleted) =
            match change_detection::classify(&self.state_store, documents, project_id, None, None).await {
                Ok(pair) => pair,
                Err(e) => {
                    let mut result = PipelineResult::default();
                    result.errors.push(format!("change detection failed: {e}"));
                    return result;
                }
            };

        let mut result = PipelineResult::default();
        self.apply_deletions(project_id, deleted, &mut result).await;

        let to_ingest: Vec<Document> = classified
            .into_iter()
            .filter(|c| !matches!(c.status, ChangeStatus::Unchanged))
            .map(|c: ClassifiedDocument| c.document)
            .collect();

        if to_ingest.is_empty() || self.cancellation.is_cancelled() {
            return result;
        }

        let collection_name = self.config.global.vector_store.collection_name.clone();
        let chunking_config = self.config.global.chunking.clone();
        let embed_batch_size = self.config.global.embedding.batch_size;
        let upsert_batch_size = self
            .config
            .global
            .pipeline
            .upsert_batch_size
            .unwrap_or(embed_batch_size);

        let chunk_sem = Arc::new(Semaphore::new(self.config.global.pipeline.max_chunk_workers));
        let embed_sem = Arc::new(Semaphore::new(self.config.global.pipeline.max_embed_workers));
        let upsert_sem = Arc::new(Semaphore::new(self.config.global.pipeline.max_upsert_workers));

        let mut join_set = JoinSet::new();
        for document in to_ingest {
            let chunking_config = chunking_config.clone();
            let chunk_sem = chunk_sem.clone();
            let embed_sem = embed_sem.clone();
            let upsert_sem = upsert_sem.clone();
            let provider = self.embedding_provider.clone();
            let store = self.vector_store.clone();
            let collection_name = collection_name.clone();
            let cancellation = self.cancellation.clone();

            join_set.spawn(async move {
                if cancellation.is_cancelled() {
                    return None;
                }
                let chunk_outcome = match chunk_one(document, chunking_config, chunk_sem).await {
                    Ok(outcome) => outcome,
                    Err(ChunkFailure::Timeout { document_id, budget_secs }) => {
                        return Some(Err(format!(
                            "document {document_id} timed out chunking after {budget_secs}s"
                        )));
                    }
                    Err(ChunkFailure::JoinError { document_id, message }) => {
                        return Some(Err(format!("document {document_id} chunking panicked: {message}")));
                    }
                };

                let embed_outcome = embed_document(
                    chunk_outcome.document,
                    chunk_outcome.chunks,
                    provider,
                    embed_batch_size,
                    embed_sem,
                )
                .await;

                let upsert_outcome = upsert_document(
                    embed_outcome.document,
                    embed_outcome.embedded,
                    embed_outcome.failed_chunks,
                    &collection_name,
                    store,
                    upsert_batch_size,
                    upsert_sem,
                )
                .await;

                Some(Ok(upsert_outcome))
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Some(Ok(outcome))) => {
                    result.success_count += outcome.succeeded_chunks;
                    result.error_count += outcome.failed_chunks;
                    if outcome.fully_succeeded {
                        let document_id = outcome.document.id.clone();
                        let state = IngestionState {
                            document_id: document_id.clone(),
                            project_id: project_id.to_string(),
                            source_type: outcome.document.source_type.clone(),
                            source: outcome.document.source.clone(),
                            content_hash: outcome.document.content_fingerprint(),
                            last_ingested_at: Utc::now(),
                            title: outcome.document.title.clone(),
                            url: outcome.document.url.clone(),
                        };
                        if let Err(e) = self.state_store.advance(&state).await {
                            result.errors.push(format!("state advance failed for {document_id}: {e}"));
                        } else {
                            result.successfully_processed_documents.insert(document_id);
                        }
                    }
                }
                Ok(Some(Err(message))) => {
                    result.error_count += 1;
                    result.errors.push(message);
                }
                Ok(None) => {}
                Err(join_err) => {
                    result.error_count += 1;
                    result.errors.push(format!("pipeline task panicked: {join_err}"));
                }
            }
        }

        result
    }

    async fn apply_deletions(&self, project_id: &str, deleted: Vec<IngestionState>, result: &mut PipelineResult) {
        if deleted.is_empty() {
            return;
        }
        let ids: Vec<String> = deleted.iter().map(|d| d.document_id.clone()).collect();
        let collection_name = &self.config.global.vector_store.collection_name;
        if let Err(e) = self
            .vector_store
            .delete_points_by_document_id(collection_name, &ids)
            .await
        {
            result.errors.push(format!("delete-by-document-id failed: {e}"));
            return;
        }
        for id in &ids {
            if let Err(e) = self.state_store.remove(id).await {
                result.errors.push(format!("state removal failed for {id} in project {project_id}: {e}"));
            }
        }
    }
}

fn build_connectors(project_id: &str, project: &ProjectConfig) -> Vec<Box<dyn Connector>> {
    let mut connectors: Vec<Box<dyn Connector>> = Vec::new();
    let cache_root = std::env::temp_dir().join("corpusloader-git-cache");

    for (name, cfg) in &project.sources.git {
        connectors.push(Box::new(GitConnector::new(
            name.clone(),
            cfg.clone(),
            cache_root.clone(),
            project_id.to_string(),
        )));
    }
    for (name, cfg) in &project.sources.confluence {
        connectors.push(Box::new(ConfluenceConnector::new(name.clone(), cfg.clone(), project_id.to_string())));
    }
    for (name, cfg) in &project.sources.jira {
        connectors.push(Box::new(JiraConnector::new(name.clone(), cfg.clone(), project_id.to_string())));
    }
    for (name, cfg) in &project.sources.publicdocs {
        connectors.push(Box::new(PublicDocsConnector::new(name.clone(), cfg.clone(), project_id.to_string())));
    }
    for (name, cfg) in &project.sources.localfile {
        connectors.push(Box::new(LocalFileConnector::new(name.clone(), cfg.clone(), project_id.to_string())));
    }
    connectors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourcesConfig;

    #[test]
    fn build_connectors_covers_every_configured_source() {
        let mut sources = SourcesConfig::default();
        sources.localfile.insert(
            "docs".to_string(),
            crate::config::LocalFileSourceConfig {
                root: std::path::PathBuf::from("."),
                include_globs: vec!["**/*.md".to_string()],
                exclude_globs: vec![],
            },
        );
        let project = ProjectConfig {
            display_name: "Demo".to_string(),
            description: None,
            sources,
            overrides: Default::default(),
        };
        let connectors = build_connectors("p1", &project);
        assert_eq!(connectors.len(), 1);
    }
}
