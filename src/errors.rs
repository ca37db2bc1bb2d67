//! Error taxonomy for the ingestion pipeline and search engine.
//!
//! Library-internal failure modes are modeled as `thiserror` enums so callers
//! can match on kind (configuration vs. connection vs. timeout vs. validation)
//! rather than parsing strings. Orchestration-level glue (CLI, pipeline run
//! loop) collapses these into `anyhow::Error` with added context, the same
//! way the rest of this crate does.

use thiserror::Error;

/// Failures that must stop the process before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config as YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("duplicate project_id: {0}")]
    DuplicateProjectId(String),
    #[error("duplicate source name '{source}' in project '{project}'")]
    DuplicateSourceName { project: String, source: String },
    #[error("invalid project_id '{0}': must match ^[A-Za-z][A-Za-z0-9_-]*$")]
    InvalidProjectId(String),
    #[error("chunking.chunk_overlap ({overlap}) must be < chunking.chunk_size ({size})")]
    InvalidChunkOverlap { overlap: usize, size: usize },
    #[error("retrieval.{field} must be in [0.0, 1.0], got {value}")]
    WeightOutOfRange { field: &'static str, value: f64 },
    #[error("{0}")]
    Invalid(String),
}

/// A connector or document failed; the surrounding run continues.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connector '{connector}' unreachable: {message}")]
    Unreachable { connector: String, message: String },
    #[error("item '{item_id}' could not be read: {message}")]
    ItemFailed { item_id: String, message: String },
    #[error("file conversion failed for '{path}': {message}")]
    ConversionFailed { path: String, message: String },
}

/// Chunking-stage failures.
#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("chunking timed out after {0}s")]
    Timeout(u64),
    #[error("strategy '{strategy}' failed to parse document '{document_id}': {message}")]
    ParseFailed {
        strategy: &'static str,
        document_id: String,
        message: String,
    },
}

/// Vector store client failures.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },
    #[error("upsert rejected for collection '{collection}': {message}")]
    UpsertRejected { collection: String, message: String },
    #[error("collection '{0}' vector size is not configured; falling back to default 1536")]
    MissingVectorSize(String),
}

/// State-store (relational persistence) failures.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state store write failed for document '{document_id}': {source}")]
    WriteFailed {
        document_id: String,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// JSON-RPC 2.0 error, directly convertible into the wire `error` object.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub fn parse_error() -> Self {
        Self {
            code: Self::PARSE_ERROR,
            message: "Parse error".to_string(),
            data: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: Self::INVALID_REQUEST,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: Self::METHOD_NOT_FOUND,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    pub fn invalid_params(field: &str, message: impl Into<String>) -> Self {
        Self {
            code: Self::INVALID_PARAMS,
            message: message.into(),
            data: Some(serde_json::json!({ "field": field })),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: Self::INTERNAL_ERROR,
            message: message.into(),
            data: None,
        }
    }
}

impl From<anyhow::Error> for RpcError {
    fn from(err: anyhow::Error) -> Self {
        // Never leak a backtrace or full error chain to a client — only the
        // top-level message, matching the no-stack-traces requirement.
        RpcError::internal(err.to_string())
    }
}
