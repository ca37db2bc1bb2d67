//! Core data model shared by the ingestion pipeline and the search engine.
//!
//! [`Document`], [`Chunk`], [`EmbeddedChunk`], [`VectorPoint`], [`Project`],
//! [`IngestionState`], [`SearchResult`], and the enhanced-search records
//! ([`Facet`], [`TopicSearchChain`], [`DocumentCluster`],
//! [`DocumentSimilarity`], [`ConflictReport`]).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Arbitrary metadata attached to documents, chunks, and vector points.
///
/// Known fields used by downstream consumers (chunking strategies, facets,
/// intent scoring) are read by key; anything else round-trips through
/// `extras` for forward compatibility, per the "dynamic/untyped payloads"
/// design note.
pub type Metadata = HashMap<String, Value>;

/// A namespace for UUIDv5 document identifiers, so the same (source, url,
/// title) always derives the same id across ingestion runs.
const DOCUMENT_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x9e, 0x2b, 0x5f, 0x10, 0x4a, 0x7c, 0x4b, 0x1d, 0x8b, 0x3a, 0x61, 0x0c, 0x2e, 0x7a, 0x91, 0x44,
]);

/// Derive a stable document identifier from source + url + title.
///
/// Same inputs always produce the same id, which is what lets change
/// detection treat a re-ingested, unmodified document as `unchanged` rather
/// than minting a new identity for it each run.
pub fn derive_document_id(source: &str, url: Option<&str>, title: Option<&str>) -> String {
    let key = format!("{}|{}|{}", source, url.unwrap_or(""), title.unwrap_or(""));
    Uuid::new_v5(&DOCUMENT_ID_NAMESPACE, key.as_bytes()).to_string()
}

/// Supported content type tags, used to select a chunking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Md,
    Html,
    Code,
    Json,
    Text,
}

impl ContentType {
    /// Classify a content-type tag (extension or explicit label).
    pub fn classify(tag: &str, language_hint: Option<&str>) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "md" | "markdown" => ContentType::Md,
            "html" | "htm" => ContentType::Html,
            "json" => ContentType::Json,
            _ if language_hint.is_some() => ContentType::Code,
            _ => ContentType::Text,
        }
    }
}

/// A unit ingested from a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_type: String,
    pub source: String,
    pub project_id: String,
    pub title: Option<String>,
    pub content: String,
    pub content_type: String,
    pub url: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(
        source_type: impl Into<String>,
        source: impl Into<String>,
        project_id: impl Into<String>,
        content: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let source = source.into();
        let content_type = content_type.into();
        let source_type = source_type.into();
        let id = derive_document_id(&source, None, None);
        Self {
            id,
            source_type,
            source,
            project_id: project_id.into(),
            title: None,
            content: content.into(),
            content_type,
            url: None,
            updated_at: Utc::now(),
            is_deleted: false,
            metadata: Metadata::new(),
        }
    }

    /// Recompute `id` from the current (source, url, title) — call after
    /// setting `url`/`title` on a freshly constructed document.
    pub fn with_derived_id(mut self) -> Self {
        self.id = derive_document_id(&self.source, self.url.as_deref(), self.title.as_deref());
        self
    }

    /// Content fingerprint used by change detection: a stable hash over
    /// content plus the metadata keys that affect chunking/search output.
    pub fn content_fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        hasher.update(self.content_type.as_bytes());
        hasher.update(self.title.as_deref().unwrap_or("").as_bytes());
        let mut keys: Vec<&String> = self.metadata.keys().collect();
        keys.sort();
        for k in keys {
            hasher.update(k.as_bytes());
            if let Some(v) = self.metadata.get(k) {
                hasher.update(v.to_string().as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// A sub-region of a document's content fed to the embedder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Weak back-reference: relation + lookup only, never ownership.
    pub document_id: String,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub chunk_size: usize,
    pub chunking_strategy: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// A chunk plus its dense vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// The record written to the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Metadata,
}

/// Fields the vector store MUST maintain payload indexes on.
pub const PAYLOAD_INDEXED_FIELDS: &[&str] = &[
    "document_id",
    "project_id",
    "source_type",
    "source",
    "title",
    "created_at",
    "updated_at",
    "is_attachment",
    "parent_document_id",
    "original_file_type",
    "is_converted",
];

impl VectorPoint {
    /// Build a VectorPoint from an embedded chunk and its parent document,
    /// merging in the minimum payload fields downstream search relies on.
    pub fn from_embedded_chunk(embedded: &EmbeddedChunk, document: &Document) -> Self {
        let mut payload = embedded.chunk.metadata.clone();
        payload.insert(
            "text".to_string(),
            Value::String(embedded.chunk.content.clone()),
        );
        payload.insert(
            "document_id".to_string(),
            Value::String(document.id.clone()),
        );
        payload.insert(
            "project_id".to_string(),
            Value::String(document.project_id.clone()),
        );
        payload.insert(
            "source_type".to_string(),
            Value::String(document.source_type.clone()),
        );
        payload.insert(
            "source".to_string(),
            Value::String(document.source.clone()),
        );
        if let Some(title) = &document.title {
            payload.insert("title".to_string(), Value::String(title.clone()));
        }
        payload.insert(
            "created_at".to_string(),
            Value::String(document.updated_at.to_rfc3339()),
        );
        payload.insert(
            "updated_at".to_string(),
            Value::String(document.updated_at.to_rfc3339()),
        );
        payload.insert(
            "chunk_index".to_string(),
            Value::from(embedded.chunk.chunk_index),
        );
        payload.insert(
            "total_chunks".to_string(),
            Value::from(embedded.chunk.total_chunks),
        );
        Self {
            id: embedded.chunk.id.clone(),
            vector: embedded.vector.clone(),
            payload,
        }
    }
}

/// A scored hit returned by the vector store's `search` operation.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f64,
    pub payload: Metadata,
}

/// A namespace scoping a set of sources and documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub display_name: String,
    pub description: Option<String>,
    pub collection_name: String,
}

/// Per-document record kept in the relational state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionState {
    pub document_id: String,
    pub project_id: String,
    pub source_type: String,
    pub source: String,
    pub content_hash: String,
    pub last_ingested_at: DateTime<Utc>,
    pub title: Option<String>,
    pub url: Option<String>,
}

/// Outcome of comparing an incoming document against its prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    New,
    Updated,
    Unchanged,
    Deleted,
}

/// Produced by the hybrid engine for query responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: String,
    pub chunk_id: String,
    pub score: f64,
    pub dense_score: f64,
    pub source_type: String,
    pub source_title: Option<String>,
    pub url: Option<String>,
    pub project_id: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl SearchResult {
    /// Compute a short display title from title, breadcrumb, and section.
    pub fn display_title(&self) -> String {
        if let Some(breadcrumb) = self
            .metadata
            .get("breadcrumb")
            .and_then(|v| v.as_array())
            .filter(|a| !a.is_empty())
        {
            let trail: Vec<String> = breadcrumb
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if !trail.is_empty() {
                let base = self.source_title.clone().unwrap_or_default();
                return format!("{} › {}", trail.join(" › "), base)
                    .trim_start_matches(" › ")
                    .to_string();
            }
        }
        if let Some(section) = self.metadata.get("section_title").and_then(|v| v.as_str()) {
            if let Some(title) = &self.source_title {
                return format!("{title} — {section}");
            }
            return section.to_string();
        }
        self.source_title
            .clone()
            .unwrap_or_else(|| self.document_id.clone())
    }
}

/// A dimension over a result set that can be used to narrow it further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetType {
    ContentType,
    SourceType,
    FileType,
    HasFeatures,
    HierarchyDepth,
    ReadTime,
    Project,
    Repository,
    Entities,
    EntityTypes,
    Topics,
    KeyPhrases,
    SectionType,
    AttachmentType,
    ConversionMethod,
    ChunkingStrategy,
}

/// A single value within a facet, with its occurrence count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetValue {
    pub value: String,
    pub count: usize,
    pub display_name: String,
    pub description: Option<String>,
}

/// A named dimension over a result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facet {
    pub facet_type: FacetType,
    pub display_name: String,
    pub values: Vec<FacetValue>,
}

/// Selected values for one facet dimension, applied in a search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetFilter {
    pub facet_type: FacetType,
    pub values: Vec<String>,
    pub combinator: FacetCombinator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FacetCombinator {
    Or,
    And,
}

/// Exploration move from one topic-chain link to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationType {
    Related,
    Deeper,
    Broader,
    Alternative,
}

/// One step of a [`TopicSearchChain`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicChainLink {
    pub query: String,
    pub primary_topic: String,
    pub related_topics: Vec<String>,
    pub chain_position: usize,
    pub relevance_score: f64,
    pub exploration_type: ExplorationType,
    pub parent_query: String,
}

/// An ordered list of derived queries that progressively explore related
/// topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSearchChain {
    pub original_query: String,
    pub links: Vec<TopicChainLink>,
}

/// A set of documents sharing topics/entities/project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCluster {
    pub document_ids: Vec<String>,
    pub centroid_topics: Vec<String>,
    pub coherence_score: f64,
    pub summary: String,
}

/// Pairwise document similarity with per-metric breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSimilarity {
    pub document_a: String,
    pub document_b: String,
    pub combined_score: f64,
    pub metric_scores: HashMap<String, f64>,
    pub explanation: String,
}

/// A detected contradiction, version mismatch, or similar disagreement
/// between two documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictCategory {
    Contradiction,
    VersionMismatch,
    PolicyDivergence,
    TemporalInconsistency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictingPair {
    pub document_a: String,
    pub document_b: String,
    pub category: ConflictCategory,
    pub explanation: String,
    pub resolution_suggestion: String,
}

/// A list of conflicting document pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflicts: Vec<ConflictingPair>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_stable_across_calls() {
        let a = derive_document_id("git:repo", Some("README.md"), Some("Readme"));
        let b = derive_document_id("git:repo", Some("README.md"), Some("Readme"));
        assert_eq!(a, b);
    }

    #[test]
    fn document_id_changes_with_inputs() {
        let a = derive_document_id("git:repo", Some("README.md"), None);
        let b = derive_document_id("git:repo", Some("CHANGELOG.md"), None);
        assert_ne!(a, b);
    }

    #[test]
    fn content_fingerprint_changes_with_content() {
        let mut doc = Document::new("git", "git:repo", "p1", "hello", "md");
        let first = doc.content_fingerprint();
        doc.content = "hello world".to_string();
        let second = doc.content_fingerprint();
        assert_ne!(first, second);
    }

    #[test]
    fn content_type_classifies_by_tag_then_language_hint() {
        assert_eq!(ContentType::classify("markdown", None), ContentType::Md);
        assert_eq!(ContentType::classify("html", None), ContentType::Html);
        assert_eq!(
            ContentType::classify("txt", Some("rust")),
            ContentType::Code
        );
        assert_eq!(ContentType::classify("txt", None), ContentType::Text);
    }

    #[test]
    fn from_embedded_chunk_carries_text_and_both_timestamps() {
        let document = Document::new("git", "git:repo", "p1", "hello world", "md");
        let chunk = Chunk {
            id: Chunk::new_id(),
            document_id: document.id.clone(),
            content: "hello world".to_string(),
            chunk_index: 0,
            total_chunks: 1,
            chunk_size: 11,
            chunking_strategy: "text".to_string(),
            metadata: Metadata::new(),
        };
        let embedded = EmbeddedChunk { chunk, vector: vec![0.1, 0.2] };
        let point = VectorPoint::from_embedded_chunk(&embedded, &document);
        assert_eq!(point.payload.get("text").and_then(|v| v.as_str()), Some("hello world"));
        assert!(point.payload.contains_key("created_at"));
        assert!(point.payload.contains_key("updated_at"));
    }
}
