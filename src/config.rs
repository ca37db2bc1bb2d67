//! Configuration parsing and validation.
//!
//! The system is configured via a YAML file with two top-level sections:
//! `global` (embedding, vector store, state store, and chunking defaults)
//! and `projects` (a mapping from project_id to its sources and overrides).
//! `${VAR}` and `$HOME` are substituted against the process environment
//! before parsing, matching the workspace/env-file loading behavior of the
//! system this one is modeled on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub global: GlobalConfig,
    #[serde(default)]
    pub projects: HashMap<String, ProjectConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub state_db: StateDbConfig,
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDbConfig {
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_pool_timeout_secs")]
    pub pool_timeout_secs: u64,
}

fn default_pool_size() -> u32 {
    5
}
fn default_pool_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub collection_name: String,
    /// Dense vector dimensionality. Falling back to a default without
    /// surfacing it would be a silent footgun; `effective_vector_size`
    /// warns when that happens.
    #[serde(default)]
    pub vector_size: Option<usize>,
}

/// Documented fallback when `vector_store.vector_size` is unset.
pub const DEFAULT_VECTOR_SIZE: usize = 1536;

impl VectorStoreConfig {
    /// Resolve the effective vector size, warning via `tracing` when falling
    /// back to the documented default.
    pub fn effective_vector_size(&self) -> usize {
        match self.vector_size {
            Some(size) => size,
            None => {
                tracing::warn!(
                    default = DEFAULT_VECTOR_SIZE,
                    "vector_store.vector_size is not configured; falling back to default"
                );
                DEFAULT_VECTOR_SIZE
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            api_key: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    300
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_max_chunks_per_document")]
    pub max_chunks_per_document: usize,
    #[serde(default = "default_html_simple_parsing_threshold")]
    pub html_simple_parsing_threshold: usize,
    #[serde(default = "default_html_max_sections")]
    pub html_max_sections_to_process: usize,
    #[serde(default = "default_html_max_chunk_size_for_nlp")]
    pub html_max_chunk_size_for_nlp: usize,
    #[serde(default = "default_code_max_file_size_for_ast")]
    pub code_max_file_size_for_ast: usize,
    #[serde(default = "default_code_max_recursion_depth")]
    pub code_max_recursion_depth: usize,
    #[serde(default = "default_code_max_elements")]
    pub code_max_elements_to_process: usize,
    #[serde(default = "default_code_max_element_size")]
    pub code_max_element_size: usize,
    #[serde(default = "default_json_max_size_for_parsing")]
    pub json_max_size_for_parsing: usize,
    #[serde(default = "default_json_max_recursion_depth")]
    pub json_max_recursion_depth: usize,
    #[serde(default = "default_json_max_objects")]
    pub json_max_objects_to_process: usize,
    #[serde(default = "default_json_max_object_keys")]
    pub json_max_object_keys_to_process: usize,
    #[serde(default = "default_json_max_array_items_per_chunk")]
    pub json_max_array_items_per_chunk: usize,
    #[serde(default = "default_true")]
    pub schema_inference_enabled: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_chunks_per_document: default_max_chunks_per_document(),
            html_simple_parsing_threshold: default_html_simple_parsing_threshold(),
            html_max_sections_to_process: default_html_max_sections(),
            html_max_chunk_size_for_nlp: default_html_max_chunk_size_for_nlp(),
            code_max_file_size_for_ast: default_code_max_file_size_for_ast(),
            code_max_recursion_depth: default_code_max_recursion_depth(),
            code_max_elements_to_process: default_code_max_elements(),
            code_max_element_size: default_code_max_element_size(),
            json_max_size_for_parsing: default_json_max_size_for_parsing(),
            json_max_recursion_depth: default_json_max_recursion_depth(),
            json_max_objects_to_process: default_json_max_objects(),
            json_max_object_keys_to_process: default_json_max_object_keys(),
            json_max_array_items_per_chunk: default_json_max_array_items_per_chunk(),
            schema_inference_enabled: true,
        }
    }
}

fn default_chunk_size() -> usize {
    1500
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_max_chunks_per_document() -> usize {
    500
}
fn default_html_simple_parsing_threshold() -> usize {
    100_000
}
fn default_html_max_sections() -> usize {
    200
}
fn default_html_max_chunk_size_for_nlp() -> usize {
    20_000
}
fn default_code_max_file_size_for_ast() -> usize {
    75_000
}
fn default_code_max_recursion_depth() -> usize {
    8
}
fn default_code_max_elements() -> usize {
    800
}
fn default_code_max_element_size() -> usize {
    20_000
}
fn default_json_max_size_for_parsing() -> usize {
    1_000_000
}
fn default_json_max_recursion_depth() -> usize {
    5
}
fn default_json_max_objects() -> usize {
    200
}
fn default_json_max_object_keys() -> usize {
    100
}
fn default_json_max_array_items_per_chunk() -> usize {
    50
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_metadata_weight")]
    pub metadata_weight: f64,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: i64,
    #[serde(default = "default_true")]
    pub intent_classification_enabled: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            metadata_weight: default_metadata_weight(),
            min_score: default_min_score(),
            candidate_multiplier: default_candidate_multiplier(),
            intent_classification_enabled: true,
        }
    }
}

fn default_vector_weight() -> f64 {
    0.6
}
fn default_keyword_weight() -> f64 {
    0.3
}
fn default_metadata_weight() -> f64 {
    0.1
}
fn default_min_score() -> f64 {
    0.3
}
fn default_candidate_multiplier() -> i64 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_chunk_workers")]
    pub max_chunk_workers: usize,
    #[serde(default = "default_max_embed_workers")]
    pub max_embed_workers: usize,
    #[serde(default = "default_max_upsert_workers")]
    pub max_upsert_workers: usize,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: Option<usize>,
    #[serde(default = "default_pipeline_timeout_secs")]
    pub pipeline_timeout_secs: u64,
    #[serde(default = "default_cancel_drain_secs")]
    pub cancel_drain_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_chunk_workers: default_max_chunk_workers(),
            max_embed_workers: default_max_embed_workers(),
            max_upsert_workers: default_max_upsert_workers(),
            upsert_batch_size: None,
            pipeline_timeout_secs: default_pipeline_timeout_secs(),
            cancel_drain_secs: default_cancel_drain_secs(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}
fn default_max_chunk_workers() -> usize {
    10
}
fn default_max_embed_workers() -> usize {
    4
}
fn default_max_upsert_workers() -> usize {
    4
}
fn default_upsert_batch_size() -> Option<usize> {
    None
}
fn default_pipeline_timeout_secs() -> u64 {
    3600
}
fn default_cancel_drain_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    #[serde(default = "default_max_shutdown_timeout_secs")]
    pub max_shutdown_timeout_secs: u64,
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            drain_timeout_secs: default_drain_timeout_secs(),
            max_shutdown_timeout_secs: default_max_shutdown_timeout_secs(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_drain_timeout_secs() -> u64 {
    10
}
fn default_max_shutdown_timeout_secs() -> u64 {
    30
}
fn default_session_idle_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub overrides: ProjectOverrides,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectOverrides {
    #[serde(default)]
    pub retrieval: Option<RetrievalConfig>,
    #[serde(default)]
    pub chunking: Option<ChunkingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub git: HashMap<String, GitSourceConfig>,
    #[serde(default)]
    pub confluence: HashMap<String, ConfluenceSourceConfig>,
    #[serde(default)]
    pub jira: HashMap<String, JiraSourceConfig>,
    #[serde(default)]
    pub publicdocs: HashMap<String, PublicDocsSourceConfig>,
    #[serde(default)]
    pub localfile: HashMap<String, LocalFileSourceConfig>,
}

impl SourcesConfig {
    /// Every configured source name across connector types, used to detect
    /// cross-type duplicate source names within one project.
    pub fn all_names(&self) -> Vec<String> {
        self.git
            .keys()
            .chain(self.confluence.keys())
            .chain(self.jira.keys())
            .chain(self.publicdocs.keys())
            .chain(self.localfile.keys())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.git.is_empty()
            && self.confluence.is_empty()
            && self.jira.is_empty()
            && self.publicdocs.is_empty()
            && self.localfile.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSourceConfig {
    pub url: String,
    #[serde(default = "default_git_branch")]
    pub branch: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_git_branch() -> String {
    "main".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceSourceConfig {
    pub base_url: String,
    pub space_key: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraSourceConfig {
    pub base_url: String,
    pub project_key: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicDocsSourceConfig {
    pub base_url: String,
    #[serde(default)]
    pub content_selector: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalFileSourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

static PROJECT_ID_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9_-]*$";

/// Substitute `${VAR}` and a leading `$HOME` against the process environment.
fn substitute_env(raw: &str) -> String {
    let var_re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let with_vars = var_re.replace_all(raw, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    });
    if let Ok(home) = std::env::var("HOME") {
        with_vars.replace("$HOME", &home)
    } else {
        with_vars.into_owned()
    }
}

/// Load a dotenv-style file (`--env PATH`) into the process environment
/// before config parsing, so `${VAR}` substitution can see its values.
pub fn load_env_file(path: &Path) -> anyhow::Result<()> {
    dotenvy::from_path(path)
        .map_err(|e| anyhow::anyhow!("failed to load env file {}: {e}", path.display()))
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let substituted = substitute_env(&raw);
    let config: Config = serde_yaml::from_str(&substituted)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let chunking = &config.global.chunking;
    if chunking.chunk_overlap >= chunking.chunk_size {
        return Err(ConfigError::InvalidChunkOverlap {
            overlap: chunking.chunk_overlap,
            size: chunking.chunk_size,
        });
    }

    let retrieval = &config.global.retrieval;
    for (field, value) in [
        ("vector_weight", retrieval.vector_weight),
        ("keyword_weight", retrieval.keyword_weight),
        ("metadata_weight", retrieval.metadata_weight),
        ("min_score", retrieval.min_score),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::WeightOutOfRange { field, value });
        }
    }

    let project_id_re = Regex::new(PROJECT_ID_PATTERN).unwrap();
    let mut seen_ids = std::collections::HashSet::new();
    for project_id in config.projects.keys() {
        if !project_id_re.is_match(project_id) {
            return Err(ConfigError::InvalidProjectId(project_id.clone()));
        }
        if !seen_ids.insert(project_id.clone()) {
            return Err(ConfigError::DuplicateProjectId(project_id.clone()));
        }
    }

    for (project_id, project) in &config.projects {
        let names = project.sources.all_names();
        let mut seen_names = std::collections::HashSet::new();
        for name in names {
            if !seen_names.insert(name.clone()) {
                return Err(ConfigError::DuplicateSourceName {
                    project: project_id.clone(),
                    source: name,
                });
            }
        }
        if project.sources.is_empty() {
            tracing::warn!(project_id, "project has no configured sources");
        }
    }

    Ok(())
}

/// Render the effective configuration back to YAML with secret-shaped
/// fields redacted, for `--print-config`.
pub fn print_config_redacted(config: &Config) -> anyhow::Result<String> {
    let mut value = serde_yaml::to_value(config)?;
    redact_secrets(&mut value);
    Ok(serde_yaml::to_string(&value)?)
}

fn redact_secrets(value: &mut serde_yaml::Value) {
    const SECRET_KEYS: &[&str] = &["api_key", "token", "password", "secret"];
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map.iter_mut() {
                if let Some(key_str) = k.as_str() {
                    if SECRET_KEYS.iter().any(|s| key_str.to_lowercase().contains(s))
                        && !v.is_null()
                    {
                        *v = serde_yaml::Value::String("REDACTED".to_string());
                        continue;
                    }
                }
                redact_secrets(v);
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for item in seq.iter_mut() {
                redact_secrets(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_env_vars_and_home() {
        std::env::set_var("CORPUSLOADER_TEST_VAR", "resolved");
        let out = substitute_env("value: ${CORPUSLOADER_TEST_VAR}");
        assert_eq!(out, "value: resolved");
    }

    #[test]
    fn rejects_overlap_ge_chunk_size() {
        let mut chunking = ChunkingConfig::default();
        chunking.chunk_overlap = chunking.chunk_size;
        let config = Config {
            global: GlobalConfig {
                state_db: StateDbConfig {
                    path: PathBuf::from(":memory:"),
                    pool_size: 1,
                    pool_timeout_secs: 1,
                },
                vector_store: VectorStoreConfig {
                    url: "http://localhost".to_string(),
                    api_key: None,
                    collection_name: "c".to_string(),
                    vector_size: Some(8),
                },
                embedding: EmbeddingConfig::default(),
                chunking,
                retrieval: RetrievalConfig::default(),
                pipeline: PipelineConfig::default(),
                server: ServerConfig::default(),
            },
            projects: HashMap::new(),
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_invalid_project_id() {
        let project_id_re = Regex::new(PROJECT_ID_PATTERN).unwrap();
        assert!(!project_id_re.is_match("1abc"));
        assert!(project_id_re.is_match("abc_1-2"));
    }
}
