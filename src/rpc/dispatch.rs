//! Tool implementations dispatched by [`super::dispatch`].

use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{FacetFilter, SearchResult, TopicSearchChain};

use crate::search::cross_doc::{self, ClusterStrategy, SimilarityMetric};
use crate::search::facets;
use crate::search::hybrid::SearchRequest;
use crate::search::intent::SearchIntent;
use crate::search::topic_chain::{self, ChainStrategy};

use super::{RpcState, INTERNAL_ERROR, INVALID_PARAMS};

type ToolError = (i64, String, Option<Value>);

fn invalid_params(field: &str, message: impl std::fmt::Display) -> ToolError {
    (INVALID_PARAMS, format!("invalid params: {message}"), Some(json!({"field": field})))
}

fn parse<T: for<'de> Deserialize<'de>>(params: &Value, field: &str) -> Result<T, ToolError> {
    serde_json::from_value(params.clone()).map_err(|e| invalid_params(field, e))
}

pub fn initialize() -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "serverInfo": { "name": "corpusloader", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": { "tools": {} },
    })
}

pub fn list_tools() -> Value {
    json!({
        "tools": super::TOOL_NAMES.iter().map(|name| json!({ "name": name })).collect::<Vec<_>>()
    })
}

/// `tools/call` envelope: `{ "name": "...", "arguments": { ... } }`.
pub async fn call_tool(state: &RpcState, params: Value) -> Result<Value, ToolError> {
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid_params("name", "missing tool name"))?
        .to_string();
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
    call_named(state, &name, arguments).await
}

pub async fn call_named(state: &RpcState, name: &str, params: Value) -> Result<Value, ToolError> {
    match name {
        "search" => search(state, params).await,
        "search_with_facets" => search_with_facets(state, params).await,
        "get_facet_suggestions" => get_facet_suggestions(params),
        "generate_topic_chain" => generate_topic_chain(state, params),
        "execute_topic_chain" => execute_topic_chain(state, params).await,
        "search_with_topic_chain" => search_with_topic_chain(state, params).await,
        "analyze_document_relationships" => analyze_document_relationships(params),
        "find_similar_documents" => find_similar_documents(params),
        "detect_document_conflicts" => detect_document_conflicts(params),
        "find_complementary_content" => find_complementary_content(params),
        "cluster_documents" => cluster_documents(params),
        other => Err((super::METHOD_NOT_FOUND, format!("unknown tool: {other}"), None)),
    }
}

#[derive(Debug, Deserialize, Default)]
struct SearchParams {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    source_types: Option<Vec<String>>,
    project_ids: Option<Vec<String>>,
    session_domain: Option<String>,
}

fn default_limit() -> usize {
    5
}

fn to_request(p: SearchParams) -> SearchRequest {
    SearchRequest {
        query: p.query,
        limit: p.limit,
        source_types: p.source_types,
        project_ids: p.project_ids,
        session_domain: p.session_domain,
        last_intent: None,
    }
}

async fn run_search(state: &RpcState, params: Value) -> Result<Vec<SearchResult>, ToolError> {
    let parsed: SearchParams = parse(&params, "query")?;
    if parsed.query.trim().is_empty() {
        return Err(invalid_params("query", "query must not be empty"));
    }
    state
        .engine
        .search(to_request(parsed))
        .await
        .map_err(|e| (INTERNAL_ERROR, e.to_string(), None))
}

async fn search(state: &RpcState, params: Value) -> Result<Value, ToolError> {
    let results = run_search(state, params).await?;
    Ok(json!({ "results": results }))
}

#[derive(Debug, Deserialize)]
struct SearchWithFacetsParams {
    #[serde(flatten)]
    search: SearchParams,
    #[serde(default)]
    facet_filters: Vec<FacetFilter>,
    top_n_per_facet: Option<usize>,
}

async fn search_with_facets(state: &RpcState, params: Value) -> Result<Value, ToolError> {
    let parsed: SearchWithFacetsParams = parse(&params, "query")?;
    if parsed.search.query.trim().is_empty() {
        return Err(invalid_params("query", "query must not be empty"));
    }
    let mut results = state
        .engine
        .search(to_request(parsed.search))
        .await
        .map_err(|e| (INTERNAL_ERROR, e.to_string(), None))?;

    if !parsed.facet_filters.is_empty() {
        results = facets::apply_facet_filters(results, &parsed.facet_filters);
    }
    let computed = facets::compute_facets(&results, parsed.top_n_per_facet);

    Ok(json!({ "results": results, "facets": computed }))
}

#[derive(Debug, Deserialize)]
struct FacetSuggestionParams {
    results: Vec<SearchResult>,
    top_n_per_facet: Option<usize>,
}

fn get_facet_suggestions(params: Value) -> Result<Value, ToolError> {
    let parsed: FacetSuggestionParams = parse(&params, "results")?;
    let computed = facets::compute_facets(&parsed.results, parsed.top_n_per_facet);
    let suggestions = facets::suggest_refinements(&parsed.results, &computed);
    let suggestions_json: Vec<Value> = suggestions
        .into_iter()
        .map(|s| json!({ "facet_type": format!("{:?}", s.facet_type), "value": s.value, "resulting_count": s.resulting_count, "reduction_ratio": s.reduction_ratio }))
        .collect();
    Ok(json!({ "suggestions": suggestions_json }))
}

fn parse_chain_strategy(raw: &str) -> Result<ChainStrategy, ToolError> {
    match raw {
        "breadth_first" => Ok(ChainStrategy::BreadthFirst),
        "depth_first" => Ok(ChainStrategy::DepthFirst),
        "relevance_ranked" => Ok(ChainStrategy::RelevanceRanked),
        "mixed_exploration" => Ok(ChainStrategy::MixedExploration),
        other => Err(invalid_params("strategy", format!("unknown chain strategy: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
struct GenerateTopicChainParams {
    query: String,
    #[serde(default)]
    seed: Vec<SearchResult>,
    #[serde(default = "default_chain_strategy")]
    strategy: String,
    #[serde(default = "default_max_links")]
    max_links: usize,
}

fn default_chain_strategy() -> String {
    "relevance_ranked".to_string()
}
fn default_max_links() -> usize {
    5
}

fn generate_topic_chain(state: &RpcState, params: Value) -> Result<Value, ToolError> {
    let parsed: GenerateTopicChainParams = parse(&params, "query")?;
    let strategy = parse_chain_strategy(&parsed.strategy)?;
    let chain = topic_chain::generate_search_chain(&parsed.query, &parsed.seed, state.nlp.as_ref(), strategy, parsed.max_links);
    chain_response(chain, parsed.max_links)
}

fn chain_response(chain: TopicSearchChain, max_links: usize) -> Result<Value, ToolError> {
    let coherence = topic_chain::chain_coherence(&chain);
    let discovery = topic_chain::discovery_potential(&chain, max_links);
    Ok(json!({ "chain": chain, "chain_coherence": coherence, "discovery_potential": discovery }))
}

#[derive(Debug, Deserialize)]
struct ExecuteTopicChainParams {
    chain: TopicSearchChain,
    #[serde(default = "default_limit")]
    results_per_link: usize,
    source_types: Option<Vec<String>>,
    project_ids: Option<Vec<String>>,
}

async fn execute_topic_chain(state: &RpcState, params: Value) -> Result<Value, ToolError> {
    let parsed: ExecuteTopicChainParams = parse(&params, "chain")?;
    let executed = topic_chain::execute_chain(&state.engine, &parsed.chain, parsed.results_per_link, parsed.source_types, parsed.project_ids).await;
    Ok(json!({ "results_by_query": executed }))
}

#[derive(Debug, Deserialize)]
struct SearchWithTopicChainParams {
    query: String,
    #[serde(default = "default_chain_strategy")]
    strategy: String,
    #[serde(default = "default_max_links")]
    max_links: usize,
    #[serde(default = "default_limit")]
    results_per_link: usize,
    source_types: Option<Vec<String>>,
    project_ids: Option<Vec<String>>,
}

async fn search_with_topic_chain(state: &RpcState, params: Value) -> Result<Value, ToolError> {
    let parsed: SearchWithTopicChainParams = parse(&params, "query")?;
    let strategy = parse_chain_strategy(&parsed.strategy)?;

    let seed = state
        .engine
        .search(SearchRequest {
            query: parsed.query.clone(),
            limit: parsed.results_per_link,
            source_types: parsed.source_types.clone(),
            project_ids: parsed.project_ids.clone(),
            session_domain: None,
            last_intent: None::<SearchIntent>,
        })
        .await
        .map_err(|e| (INTERNAL_ERROR, e.to_string(), None))?;

    let chain = topic_chain::generate_search_chain(&parsed.query, &seed, state.nlp.as_ref(), strategy, parsed.max_links);
    let executed = topic_chain::execute_chain(&state.engine, &chain, parsed.results_per_link, parsed.source_types, parsed.project_ids).await;
    let coherence = topic_chain::chain_coherence(&chain);
    let discovery = topic_chain::discovery_potential(&chain, parsed.max_links);

    Ok(json!({
        "chain": chain,
        "chain_coherence": coherence,
        "discovery_potential": discovery,
        "results_by_query": executed,
    }))
}

#[derive(Debug, Deserialize)]
struct DocsParams {
    documents: Vec<SearchResult>,
}

fn analyze_document_relationships(params: Value) -> Result<Value, ToolError> {
    let parsed: DocsParams = parse(&params, "documents")?;
    let summary = cross_doc::analyze_relationships(&parsed.documents);
    Ok(json!({
        "counts_by_source_type": summary.counts_by_source_type,
        "notable_pairs": summary.notable_pairs,
    }))
}

fn parse_metric(raw: &str) -> Result<SimilarityMetric, ToolError> {
    match raw {
        "entity_overlap" => Ok(SimilarityMetric::EntityOverlap),
        "topic_overlap" => Ok(SimilarityMetric::TopicOverlap),
        "semantic_embedding" => Ok(SimilarityMetric::SemanticEmbedding),
        "metadata_affinity" => Ok(SimilarityMetric::MetadataAffinity),
        "project_and_source_affinity" => Ok(SimilarityMetric::ProjectAndSourceAffinity),
        "hierarchy_affinity" => Ok(SimilarityMetric::HierarchyAffinity),
        other => Err(invalid_params("metrics", format!("unknown similarity metric: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
struct FindSimilarParams {
    target: SearchResult,
    candidates: Vec<SearchResult>,
    metrics: Option<Vec<String>>,
    #[serde(default = "default_max_similar")]
    max: usize,
}

fn default_max_similar() -> usize {
    5
}

fn find_similar_documents(params: Value) -> Result<Value, ToolError> {
    let parsed: FindSimilarParams = parse(&params, "target")?;
    let metrics = parsed
        .metrics
        .map(|names| names.iter().map(|n| parse_metric(n)).collect::<Result<Vec<_>, _>>())
        .transpose()?;
    let similar = cross_doc::find_similar(&parsed.target, &parsed.candidates, metrics.as_deref(), parsed.max);
    Ok(json!({ "similar": similar }))
}

#[derive(Debug, Deserialize)]
struct DetectConflictsParams {
    documents: Vec<SearchResult>,
    max_pairs_total: Option<usize>,
}

fn detect_document_conflicts(params: Value) -> Result<Value, ToolError> {
    let parsed: DetectConflictsParams = parse(&params, "documents")?;
    let report = cross_doc::detect_conflicts(&parsed.documents, parsed.max_pairs_total);
    serde_json::to_value(report).map_err(|e| (INTERNAL_ERROR, e.to_string(), None))
}

#[derive(Debug, Deserialize)]
struct FindComplementaryParams {
    target: SearchResult,
    candidates: Vec<SearchResult>,
    #[serde(default = "default_max_similar")]
    max: usize,
}

fn find_complementary_content(params: Value) -> Result<Value, ToolError> {
    let parsed: FindComplementaryParams = parse(&params, "target")?;
    let complementary = cross_doc::find_complementary(&parsed.target, &parsed.candidates, parsed.max);
    Ok(json!({ "complementary": complementary }))
}

fn parse_cluster_strategy(raw: &str) -> Result<ClusterStrategy, ToolError> {
    match raw {
        "mixed_features" => Ok(ClusterStrategy::MixedFeatures),
        "semantic_embedding" => Ok(ClusterStrategy::SemanticEmbedding),
        "topic_based" => Ok(ClusterStrategy::TopicBased),
        "entity_based" => Ok(ClusterStrategy::EntityBased),
        "project_based" => Ok(ClusterStrategy::ProjectBased),
        "hierarchical" => Ok(ClusterStrategy::Hierarchical),
        other => Err(invalid_params("strategy", format!("unknown cluster strategy: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
struct ClusterParams {
    documents: Vec<SearchResult>,
    strategy: Option<String>,
    #[serde(default = "default_max_clusters")]
    max_clusters: usize,
    #[serde(default = "default_min_cluster_size")]
    min_cluster_size: usize,
}

fn default_max_clusters() -> usize {
    10
}
fn default_min_cluster_size() -> usize {
    2
}

fn cluster_documents(params: Value) -> Result<Value, ToolError> {
    let parsed: ClusterParams = parse(&params, "documents")?;
    let strategy = match parsed.strategy.as_deref() {
        None | Some("adaptive") => cross_doc::select_adaptive_strategy(&parsed.documents),
        Some(other) => parse_cluster_strategy(other)?,
    };
    let clusters = cross_doc::cluster(&parsed.documents, strategy, parsed.max_clusters, parsed.min_cluster_size);
    Ok(json!({ "clusters": clusters, "strategy_used": format!("{strategy:?}") }))
}
