//! Cross-document intelligence: relationship summaries,
//! similarity, conflict detection, complementary-content recommendation,
//! and clustering over a list of SearchResult.

use std::collections::{HashMap, HashSet};

use crate::models::{ConflictCategory, ConflictingPair, ConflictReport, DocumentCluster, DocumentSimilarity, SearchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimilarityMetric {
    EntityOverlap,
    TopicOverlap,
    SemanticEmbedding,
    MetadataAffinity,
    ProjectAndSourceAffinity,
    HierarchyAffinity,
}

const ALL_METRICS: [SimilarityMetric; 6] = [
    SimilarityMetric::EntityOverlap,
    SimilarityMetric::TopicOverlap,
    SimilarityMetric::SemanticEmbedding,
    SimilarityMetric::MetadataAffinity,
    SimilarityMetric::ProjectAndSourceAffinity,
    SimilarityMetric::HierarchyAffinity,
];

fn metric_name(metric: SimilarityMetric) -> &'static str {
    match metric {
        SimilarityMetric::EntityOverlap => "entity_overlap",
        SimilarityMetric::TopicOverlap => "topic_overlap",
        SimilarityMetric::SemanticEmbedding => "semantic_embedding",
        SimilarityMetric::MetadataAffinity => "metadata_affinity",
        SimilarityMetric::ProjectAndSourceAffinity => "project_and_source_affinity",
        SimilarityMetric::HierarchyAffinity => "hierarchy_affinity",
    }
}

fn string_set(result: &SearchResult, key: &str) -> HashSet<String> {
    result
        .metadata
        .get(key)
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count().max(1);
    intersection as f64 / union as f64
}

fn metric_score(a: &SearchResult, b: &SearchResult, metric: SimilarityMetric) -> f64 {
    match metric {
        SimilarityMetric::EntityOverlap => jaccard(&string_set(a, "entities"), &string_set(b, "entities")),
        SimilarityMetric::TopicOverlap => jaccard(&string_set(a, "topics"), &string_set(b, "topics")),
        SimilarityMetric::SemanticEmbedding => {
            // SearchResult carries only the dense score, not the vector
            // itself; approximate via how close the two dense scores are.
            1.0 - (a.dense_score - b.dense_score).abs()
        }
        SimilarityMetric::MetadataAffinity => {
            let mut matches = 0;
            let mut total = 0;
            for key in ["content_type", "section_type", "chunking_strategy"] {
                total += 1;
                if a.metadata.get(key) == b.metadata.get(key) && a.metadata.get(key).is_some() {
                    matches += 1;
                }
            }
            if total == 0 {
                0.0
            } else {
                matches as f64 / total as f64
            }
        }
        SimilarityMetric::ProjectAndSourceAffinity => {
            let project_match = if a.project_id == b.project_id { 0.5 } else { 0.0 };
            let source_match = if a.source_type == b.source_type { 0.5 } else { 0.0 };
            project_match + source_match
        }
        SimilarityMetric::HierarchyAffinity => {
            let breadcrumb_a = string_set(a, "breadcrumb");
            let breadcrumb_b = string_set(b, "breadcrumb");
            jaccard(&breadcrumb_a, &breadcrumb_b)
        }
    }
}

fn combined_similarity(a: &SearchResult, b: &SearchResult, metrics: &[SimilarityMetric]) -> DocumentSimilarity {
    let mut metric_scores = HashMap::new();
    let mut total = 0.0;
    for metric in metrics {
        let score = metric_score(a, b, *metric);
        metric_scores.insert(metric_name(*metric).to_string(), score);
        total += score;
    }
    let combined_score = if metrics.is_empty() { 0.0 } else { total / metrics.len() as f64 };
    let top_metric = metric_scores
        .iter()
        .max_by(|x, y| x.1.partial_cmp(y.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(k, v)| format!("{k} ({v:.2})"))
        .unwrap_or_default();

    DocumentSimilarity {
        document_a: a.document_id.clone(),
        document_b: b.document_id.clone(),
        combined_score,
        metric_scores,
        explanation: format!(
            "{} and {} share {} as the strongest signal",
            a.document_id, b.document_id, top_metric
        ),
    }
}

/// `analyze_relationships`: summary counts by source type plus
/// notable pairs (similarity above 0.6 across the default metric set).
pub struct RelationshipSummary {
    pub counts_by_source_type: HashMap<String, usize>,
    pub notable_pairs: Vec<DocumentSimilarity>,
}

pub fn analyze_relationships(docs: &[SearchResult]) -> RelationshipSummary {
    let mut counts_by_source_type = HashMap::new();
    for doc in docs {
        *counts_by_source_type.entry(doc.source_type.clone()).or_insert(0) += 1;
    }

    let mut notable_pairs = Vec::new();
    for i in 0..docs.len() {
        for j in (i + 1)..docs.len() {
            let similarity = combined_similarity(&docs[i], &docs[j], &ALL_METRICS);
            if similarity.combined_score > 0.6 {
                notable_pairs.push(similarity);
            }
        }
    }
    notable_pairs.sort_by(|a, b| b.combined_score.partial_cmp(&a.combined_score).unwrap_or(std::cmp::Ordering::Equal));

    RelationshipSummary {
        counts_by_source_type,
        notable_pairs,
    }
}

/// `find_similar`: top `max` candidates ranked by combined
/// similarity across the requested (or default) metric subset.
pub fn find_similar(
    target: &SearchResult,
    candidates: &[SearchResult],
    metrics: Option<&[SimilarityMetric]>,
    max: usize,
) -> Vec<DocumentSimilarity> {
    let metrics = metrics.unwrap_or(&ALL_METRICS);
    let mut scored: Vec<DocumentSimilarity> = candidates
        .iter()
        .filter(|c| c.document_id != target.document_id)
        .map(|c| combined_similarity(target, c, metrics))
        .collect();
    scored.sort_by(|a, b| b.combined_score.partial_cmp(&a.combined_score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(max);
    scored
}

fn classify_conflict(a: &SearchResult, b: &SearchResult) -> Option<ConflictCategory> {
    let version_a = a.metadata.get("version").and_then(|v| v.as_str());
    let version_b = b.metadata.get("version").and_then(|v| v.as_str());
    if let (Some(va), Some(vb)) = (version_a, version_b) {
        if va != vb {
            return Some(ConflictCategory::VersionMismatch);
        }
    }

    let status_a = a.metadata.get("status").and_then(|v| v.as_str());
    let status_b = b.metadata.get("status").and_then(|v| v.as_str());
    if let (Some(sa), Some(sb)) = (status_a, status_b) {
        if sa != sb && (sa == "deprecated" || sb == "deprecated") {
            return Some(ConflictCategory::PolicyDivergence);
        }
    }

    let updated_a = a.metadata.get("modified_timestamp").and_then(|v| v.as_i64());
    let updated_b = b.metadata.get("modified_timestamp").and_then(|v| v.as_i64());
    if let (Some(ta), Some(tb)) = (updated_a, updated_b) {
        if (ta - tb).abs() > 31_536_000 {
            return Some(ConflictCategory::TemporalInconsistency);
        }
    }

    let topics_overlap = jaccard(&string_set(a, "topics"), &string_set(b, "topics"));
    if topics_overlap > 0.5 && a.source_title != b.source_title {
        return Some(ConflictCategory::Contradiction);
    }

    None
}

fn resolution_for(category: ConflictCategory) -> &'static str {
    match category {
        ConflictCategory::Contradiction => "Review both documents and mark the authoritative source.",
        ConflictCategory::VersionMismatch => "Confirm which document describes the currently deployed version.",
        ConflictCategory::PolicyDivergence => "Retire or clearly label the deprecated document.",
        ConflictCategory::TemporalInconsistency => "Re-verify the older document is still accurate.",
    }
}

/// `detect_conflicts`: enumerate candidate pairs bounded by
/// `max_pairs_total`, classify by category.
pub fn detect_conflicts(docs: &[SearchResult], max_pairs_total: Option<usize>) -> ConflictReport {
    let limit = max_pairs_total.unwrap_or(200);
    let mut conflicts = Vec::new();

    'outer: for i in 0..docs.len() {
        for j in (i + 1)..docs.len() {
            if conflicts.len() >= limit {
                break 'outer;
            }
            if let Some(category) = classify_conflict(&docs[i], &docs[j]) {
                conflicts.push(ConflictingPair {
                    document_a: docs[i].document_id.clone(),
                    document_b: docs[j].document_id.clone(),
                    category,
                    explanation: format!("{:?} detected between {} and {}", category, docs[i].document_id, docs[j].document_id),
                    resolution_suggestion: resolution_for(category).to_string(),
                });
            }
        }
    }

    ConflictReport { conflicts }
}

/// `find_complementary`: recommend documents filling gaps —
/// different sections, adjacent topics, related entities — rather than
/// near-duplicates.
pub fn find_complementary(target: &SearchResult, candidates: &[SearchResult], max: usize) -> Vec<DocumentSimilarity> {
    let target_topics = string_set(target, "topics");
    let target_section = target.metadata.get("section_type").and_then(|v| v.as_str());

    let mut scored: Vec<DocumentSimilarity> = candidates
        .iter()
        .filter(|c| c.document_id != target.document_id)
        .filter_map(|c| {
            let candidate_topics = string_set(c, "topics");
            let topic_overlap = jaccard(&target_topics, &candidate_topics);
            let different_section = c.metadata.get("section_type").and_then(|v| v.as_str()) != target_section;
            // Adjacent topics: some overlap, but not a near-duplicate.
            if topic_overlap > 0.0 && topic_overlap < 0.6 && different_section {
                let mut similarity = combined_similarity(target, c, &ALL_METRICS);
                similarity.combined_score = topic_overlap;
                similarity.explanation = format!(
                    "{} complements {} via adjacent topics in a different section",
                    c.document_id, target.document_id
                );
                Some(similarity)
            } else {
                None
            }
        })
        .collect();

    scored.sort_by(|a, b| b.combined_score.partial_cmp(&a.combined_score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(max);
    scored
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStrategy {
    MixedFeatures,
    SemanticEmbedding,
    TopicBased,
    EntityBased,
    ProjectBased,
    Hierarchical,
}

fn cluster_key(doc: &SearchResult, strategy: ClusterStrategy) -> String {
    match strategy {
        ClusterStrategy::MixedFeatures => format!("{}:{}", doc.project_id, doc.source_type),
        ClusterStrategy::SemanticEmbedding => format!("{:.1}", doc.dense_score),
        ClusterStrategy::TopicBased => {
            let mut topics: Vec<String> = string_set(doc, "topics").into_iter().collect();
            topics.sort();
            topics.join(",")
        }
        ClusterStrategy::EntityBased => {
            let mut entities: Vec<String> = string_set(doc, "entities").into_iter().collect();
            entities.sort();
            entities.join(",")
        }
        ClusterStrategy::ProjectBased => doc.project_id.clone(),
        ClusterStrategy::Hierarchical => doc
            .metadata
            .get("breadcrumb")
            .and_then(|v| v.as_array())
            .map(|a| a.len().to_string())
            .unwrap_or_default(),
    }
}

/// `cluster`: group documents by the chosen strategy, dropping
/// clusters below `min_cluster_size` and capping at `max_clusters`.
pub fn cluster(
    docs: &[SearchResult],
    strategy: ClusterStrategy,
    max_clusters: usize,
    min_cluster_size: usize,
) -> Vec<DocumentCluster> {
    let mut groups: HashMap<String, Vec<&SearchResult>> = HashMap::new();
    for doc in docs {
        groups.entry(cluster_key(doc, strategy)).or_default().push(doc);
    }

    let mut clusters: Vec<DocumentCluster> = groups
        .into_iter()
        .filter(|(key, members)| !key.is_empty() && members.len() >= min_cluster_size)
        .map(|(key, members)| {
            let mut topic_counts: HashMap<String, usize> = HashMap::new();
            for doc in &members {
                for topic in string_set(doc, "topics") {
                    *topic_counts.entry(topic).or_insert(0) += 1;
                }
            }
            let mut centroid_topics: Vec<String> = topic_counts.into_iter().map(|(t, _)| t).collect();
            centroid_topics.sort();
            centroid_topics.truncate(5);

            let coherence_score = if members.len() < 2 {
                1.0
            } else {
                let mut total = 0.0;
                let mut pairs = 0;
                for i in 0..members.len() {
                    for j in (i + 1)..members.len() {
                        total += combined_similarity(members[i], members[j], &ALL_METRICS).combined_score;
                        pairs += 1;
                    }
                }
                if pairs == 0 {
                    1.0
                } else {
                    total / pairs as f64
                }
            };

            DocumentCluster {
                document_ids: members.iter().map(|d| d.document_id.clone()).collect(),
                centroid_topics,
                coherence_score,
                summary: format!("{} documents grouped by {key}", members.len()),
            }
        })
        .collect();

    clusters.sort_by(|a, b| b.document_ids.len().cmp(&a.document_ids.len()));
    clusters.truncate(max_clusters);
    clusters
}

/// Adaptive strategy selection: score each strategy from
/// observed document characteristics and pick the highest, defaulting to
/// `MixedFeatures`.
pub fn select_adaptive_strategy(docs: &[SearchResult]) -> ClusterStrategy {
    if docs.is_empty() {
        return ClusterStrategy::MixedFeatures;
    }
    let n = docs.len() as f64;

    let entity_richness = (docs.iter().map(|d| string_set(d, "entities").len()).sum::<usize>() as f64 / n / 5.0).min(1.0);
    let topic_clarity = {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for d in docs {
            *counts.entry(d.source_type.clone()).or_insert(0) += 1;
        }
        counts.values().cloned().max().unwrap_or(0) as f64 / n
    };
    let project_distribution = {
        let unique: HashSet<&str> = docs.iter().map(|d| d.project_id.as_str()).collect();
        (unique.len() as f64 / n).min(1.0)
    };
    let hierarchical_structure = (docs
        .iter()
        .map(|d| d.metadata.get("breadcrumb").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0))
        .sum::<usize>() as f64
        / n
        / 5.0)
        .min(1.0);
    let source_diversity = {
        let unique: HashSet<&str> = docs.iter().map(|d| d.source_type.as_str()).collect();
        (unique.len() as f64 / n).min(1.0)
    };

    let scored = [
        (ClusterStrategy::EntityBased, entity_richness),
        (ClusterStrategy::TopicBased, topic_clarity),
        (ClusterStrategy::ProjectBased, project_distribution),
        (ClusterStrategy::Hierarchical, hierarchical_structure),
        (ClusterStrategy::SemanticEmbedding, source_diversity),
    ];

    scored
        .iter()
        .cloned()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .filter(|(_, score)| *score > 0.5)
        .map(|(strategy, _)| strategy)
        .unwrap_or(ClusterStrategy::MixedFeatures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use serde_json::json;

    fn doc(id: &str, project_id: &str, topics: &[&str]) -> SearchResult {
        let mut metadata = Metadata::new();
        metadata.insert("topics".to_string(), json!(topics));
        SearchResult {
            document_id: id.to_string(),
            chunk_id: format!("{id}-c1"),
            score: 0.7,
            dense_score: 0.7,
            source_type: "localfile".to_string(),
            source_title: Some(id.to_string()),
            url: None,
            project_id: project_id.to_string(),
            metadata,
        }
    }

    #[test]
    fn find_similar_excludes_target_and_respects_max() {
        let target = doc("a", "p1", &["auth"]);
        let candidates = vec![doc("a", "p1", &["auth"]), doc("b", "p1", &["auth"]), doc("c", "p1", &["deploy"])];
        let similar = find_similar(&target, &candidates, None, 1);
        assert_eq!(similar.len(), 1);
        assert_ne!(similar[0].document_b, "a");
    }

    #[test]
    fn cluster_drops_groups_below_min_size() {
        let docs = vec![doc("a", "p1", &["auth"]), doc("b", "p2", &["deploy"])];
        let clusters = cluster(&docs, ClusterStrategy::ProjectBased, 10, 2);
        assert!(clusters.is_empty());
    }

    #[test]
    fn cluster_groups_same_project_together() {
        let docs = vec![doc("a", "p1", &["auth"]), doc("b", "p1", &["deploy"])];
        let clusters = cluster(&docs, ClusterStrategy::ProjectBased, 10, 2);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].document_ids.len(), 2);
    }

    #[test]
    fn adaptive_strategy_defaults_to_mixed_features_for_uniform_docs() {
        let docs = vec![doc("a", "p1", &[]), doc("b", "p1", &[])];
        let strategy = select_adaptive_strategy(&docs);
        assert_eq!(strategy, ClusterStrategy::MixedFeatures);
    }
}
