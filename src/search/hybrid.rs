//! Hybrid search engine: intent classification, query expansion,
//! dense + sparse retrieval, weighted combination.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::models::{Metadata, ScoredPoint, SearchResult};
use crate::nlp::NlpAnalyzer;
use crate::vector_store::{FieldFilter, VectorStoreClient};

use super::intent::{adaptive_strategy, classify_intent, SearchIntent};
use super::query_analysis::{expand_query, ContentTypePreference, ExpandedQuery};

const EMBED_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub source_types: Option<Vec<String>>,
    pub project_ids: Option<Vec<String>>,
    pub session_domain: Option<String>,
    pub last_intent: Option<SearchIntent>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 5,
            ..Default::default()
        }
    }
}

pub struct HybridSearchEngine {
    vector_store: Arc<dyn VectorStoreClient>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    nlp: Arc<dyn NlpAnalyzer>,
    retrieval: RetrievalConfig,
    collection_name: String,
}

impl HybridSearchEngine {
    pub fn new(
        vector_store: Arc<dyn VectorStoreClient>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        nlp: Arc<dyn NlpAnalyzer>,
        retrieval: RetrievalConfig,
        collection_name: String,
    ) -> Self {
        Self {
            vector_store,
            embedding_provider,
            nlp,
            retrieval,
            collection_name,
        }
    }

    pub async fn search(&self, request: SearchRequest) -> anyhow::Result<Vec<SearchResult>> {
        let limit = request.limit.max(1);

        // Step 1: intent classification, optional per config.
        let strategy = if self.retrieval.intent_classification_enabled {
            let classification = classify_intent(
                &request.query,
                self.nlp.as_ref(),
                request.session_domain.as_deref(),
                request.last_intent,
            );
            Some(adaptive_strategy(classification.primary.intent))
        } else {
            None
        };

        let vector_weight = strategy.as_ref().map(|s| s.vector_weight).unwrap_or(self.retrieval.vector_weight);
        let keyword_weight = strategy.as_ref().map(|s| s.keyword_weight).unwrap_or(self.retrieval.keyword_weight);
        let min_score = strategy.as_ref().map(|s| s.min_score).unwrap_or(self.retrieval.min_score);
        let aggressive = strategy.as_ref().map(|s| s.expansion_aggressiveness > 0.5).unwrap_or(false);

        // Step 2: query expansion.
        let expanded = expand_query(&request.query, self.nlp.as_ref(), aggressive);

        let filter = FieldFilter {
            project_id_in: request.project_ids.clone(),
            source_type_in: request.source_types.clone(),
        };
        let fetch_limit = (limit as i64 * self.retrieval.candidate_multiplier).max(limit as i64) as usize;

        // Step 3: dense search.
        let query_vector = embed_query(self.embedding_provider.as_ref(), EMBED_QUERY_TIMEOUT, &expanded.expanded_text).await?;
        let dense_hits = self
            .vector_store
            .search(&self.collection_name, &query_vector, fetch_limit, Some(&filter))
            .await?;

        // Step 4: sparse (keyword) search.
        let sparse_hits = self
            .vector_store
            .search_sparse(&self.collection_name, &expanded.expanded_text, fetch_limit, Some(&filter))
            .await?;

        // Step 5: combine.
        let combined = combine(dense_hits, sparse_hits, vector_weight, keyword_weight, self.retrieval.metadata_weight, &expanded);

        let mut results: Vec<SearchResult> = combined
            .into_iter()
            .filter(|(_, final_score, _)| *final_score >= min_score)
            .map(|(point, final_score, dense_score)| to_search_result(point, final_score, dense_score))
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.dense_score.partial_cmp(&a.dense_score).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        results.truncate(limit);

        Ok(results)
    }
}

fn normalize(scores: &HashMap<String, f64>) -> HashMap<String, f64> {
    let max = scores.values().cloned().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return scores.clone();
    }
    scores.iter().map(|(k, v)| (k.clone(), v / max)).collect()
}

/// True if `payload`'s own content-type signals match the query's detected
/// preference (code, tables, images, or docs).
fn content_type_matches(payload: &Metadata, preference: ContentTypePreference) -> bool {
    match preference {
        ContentTypePreference::Code => {
            payload.get("content_type").and_then(|v| v.as_str()) == Some("code")
                || payload.get("has_code_elements").and_then(|v| v.as_bool()).unwrap_or(false)
                || payload.get("has_code_blocks").and_then(|v| v.as_bool()).unwrap_or(false)
        }
        ContentTypePreference::Tables => payload.get("has_tables").and_then(|v| v.as_bool()).unwrap_or(false),
        ContentTypePreference::Images => payload.get("has_images").and_then(|v| v.as_bool()).unwrap_or(false),
        ContentTypePreference::Docs => matches!(
            payload.get("content_type").and_then(|v| v.as_str()),
            Some("md") | Some("html")
        ),
    }
}

/// Count how many of `query_terms` appear (case-insensitively) in the
/// payload's `key` string array, e.g. `entities` or `topics`.
fn overlap_count(payload: &Metadata, key: &str, query_terms: &[String]) -> usize {
    let Some(values) = payload.get(key).and_then(|v| v.as_array()) else {
        return 0;
    };
    let query_lower: HashSet<String> = query_terms.iter().map(|t| t.to_lowercase()).collect();
    values
        .iter()
        .filter_map(|v| v.as_str())
        .filter(|v| query_lower.contains(&v.to_lowercase()))
        .count()
}

fn metadata_boost(payload: &Metadata, query: &ExpandedQuery) -> f64 {
    let mut boost = 0.0;
    if payload.get("conversion_failed").and_then(|v| v.as_bool()).unwrap_or(false) {
        boost -= 0.1;
    }
    if payload.get("has_code_elements").and_then(|v| v.as_bool()).unwrap_or(false) {
        boost += 0.05;
    }
    if let Some(preference) = query.content_type_preference {
        if content_type_matches(payload, preference) {
            boost += 0.1;
        }
    }

    let overlap = overlap_count(payload, "entities", &query.entities) + overlap_count(payload, "topics", &query.topics);
    if overlap > 0 {
        boost += (0.05 * overlap as f64).min(0.15);
    }

    boost.clamp(-0.2, 0.2)
}

/// Merge dense and sparse hits keyed by point id, weighting normalized
/// scores. Returns (point, final_score, dense_score).
fn combine(
    dense_hits: Vec<ScoredPoint>,
    sparse_hits: Vec<ScoredPoint>,
    vector_weight: f64,
    keyword_weight: f64,
    metadata_weight: f64,
    query: &ExpandedQuery,
) -> Vec<(ScoredPoint, f64, f64)> {
    let dense_raw: HashMap<String, f64> = dense_hits.iter().map(|p| (p.id.clone(), p.score)).collect();
    let sparse_raw: HashMap<String, f64> = sparse_hits.iter().map(|p| (p.id.clone(), p.score)).collect();
    let dense_norm = normalize(&dense_raw);
    let sparse_norm = normalize(&sparse_raw);

    let mut by_id: HashMap<String, ScoredPoint> = HashMap::new();
    for point in dense_hits.into_iter().chain(sparse_hits.into_iter()) {
        by_id.entry(point.id.clone()).or_insert(point);
    }

    by_id
        .into_iter()
        .map(|(id, point)| {
            let dense_score = *dense_norm.get(&id).unwrap_or(&0.0);
            let sparse_score = *sparse_norm.get(&id).unwrap_or(&0.0);
            let boost = metadata_boost(&point.payload, query);
            let final_score = vector_weight * dense_score + keyword_weight * sparse_score + metadata_weight * boost;
            (point, final_score, dense_score)
        })
        .collect()
}

fn to_search_result(point: ScoredPoint, final_score: f64, dense_score: f64) -> SearchResult {
    let document_id = point
        .payload
        .get("document_id")
        .and_then(|v| v.as_str())
        .unwrap_or(&point.id)
        .to_string();
    let source_type = point
        .payload
        .get("source_type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let source_title = point.payload.get("title").and_then(|v| v.as_str()).map(str::to_string);
    let url = point.payload.get("url").and_then(|v| v.as_str()).map(str::to_string);
    let project_id = point
        .payload
        .get("project_id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    SearchResult {
        document_id,
        chunk_id: point.id,
        score: final_score,
        dense_score,
        source_type,
        source_title,
        url,
        project_id,
        metadata: point.payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(id: &str, score: f64) -> ScoredPoint {
        let mut payload = Metadata::new();
        payload.insert("document_id".to_string(), json!(id));
        payload.insert("source_type".to_string(), json!("localfile"));
        payload.insert("project_id".to_string(), json!("p1"));
        ScoredPoint {
            id: id.to_string(),
            score,
            payload,
        }
    }

    fn empty_query() -> ExpandedQuery {
        ExpandedQuery {
            original: String::new(),
            expanded_text: String::new(),
            added_terms: Vec::new(),
            entities: Vec::new(),
            topics: Vec::new(),
            content_type_preference: None,
        }
    }

    #[test]
    fn combine_favors_points_present_in_both_lists() {
        let dense = vec![point("a", 0.9), point("b", 0.4)];
        let sparse = vec![point("a", 0.8)];
        let combined = combine(dense, sparse, 0.6, 0.3, 0.1, &empty_query());
        let a = combined.iter().find(|(p, _, _)| p.id == "a").unwrap();
        let b = combined.iter().find(|(p, _, _)| p.id == "b").unwrap();
        assert!(a.1 > b.1);
    }

    #[test]
    fn normalize_scales_to_unit_max() {
        let mut scores = HashMap::new();
        scores.insert("a".to_string(), 0.5);
        scores.insert("b".to_string(), 1.0);
        let normalized = normalize(&scores);
        assert_eq!(normalized["b"], 1.0);
        assert_eq!(normalized["a"], 0.5);
    }

    #[test]
    fn metadata_boost_penalizes_conversion_failures() {
        let mut payload = Metadata::new();
        payload.insert("conversion_failed".to_string(), json!(true));
        assert!(metadata_boost(&payload, &empty_query()) < 0.0);
    }

    #[test]
    fn metadata_boost_rewards_matching_content_type_preference() {
        let mut payload = Metadata::new();
        payload.insert("content_type".to_string(), json!("code"));
        let mut query = empty_query();
        query.content_type_preference = Some(ContentTypePreference::Code);
        assert!(metadata_boost(&payload, &query) > metadata_boost(&payload, &empty_query()));
    }

    #[test]
    fn metadata_boost_rewards_entity_and_topic_overlap() {
        let mut payload = Metadata::new();
        payload.insert("entities".to_string(), json!(["Kubernetes"]));
        payload.insert("topics".to_string(), json!(["deployment"]));
        let mut query = empty_query();
        query.entities = vec!["Kubernetes".to_string()];
        query.topics = vec!["deployment".to_string()];
        assert!(metadata_boost(&payload, &query) > metadata_boost(&payload, &empty_query()));
    }
}
