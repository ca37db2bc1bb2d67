//! Faceted search: derive facets from a result set, apply facet
//! filters, and suggest refinements that meaningfully narrow the set.

use std::collections::HashMap;

use crate::models::{Facet, FacetCombinator, FacetFilter, FacetType, FacetValue, SearchResult};

const TOP_N_PER_FACET: usize = 10;
const MAX_SUGGESTIONS: usize = 5;
const MIN_REDUCTION_RATIO: f64 = 0.20;

const ALL_FACET_TYPES: [FacetType; 16] = [
    FacetType::ContentType,
    FacetType::SourceType,
    FacetType::FileType,
    FacetType::HasFeatures,
    FacetType::HierarchyDepth,
    FacetType::ReadTime,
    FacetType::Project,
    FacetType::Repository,
    FacetType::Entities,
    FacetType::EntityTypes,
    FacetType::Topics,
    FacetType::KeyPhrases,
    FacetType::SectionType,
    FacetType::AttachmentType,
    FacetType::ConversionMethod,
    FacetType::ChunkingStrategy,
];

fn display_name(facet_type: FacetType) -> &'static str {
    match facet_type {
        FacetType::ContentType => "Content Type",
        FacetType::SourceType => "Source",
        FacetType::FileType => "File Type",
        FacetType::HasFeatures => "Features",
        FacetType::HierarchyDepth => "Hierarchy Depth",
        FacetType::ReadTime => "Read Time",
        FacetType::Project => "Project",
        FacetType::Repository => "Repository",
        FacetType::Entities => "Entities",
        FacetType::EntityTypes => "Entity Types",
        FacetType::Topics => "Topics",
        FacetType::KeyPhrases => "Key Phrases",
        FacetType::SectionType => "Section Type",
        FacetType::AttachmentType => "Attachment Type",
        FacetType::ConversionMethod => "Conversion Method",
        FacetType::ChunkingStrategy => "Chunking Strategy",
    }
}

/// Extract the facet values a single result contributes for `facet_type`.
/// Most facets are single-valued (one string per result); a few (entities,
/// topics, key phrases) are multi-valued.
fn values_for(result: &SearchResult, facet_type: FacetType) -> Vec<String> {
    let meta = &result.metadata;
    let single = |key: &str| meta.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let array = |key: &str| -> Vec<String> {
        meta.get(key)
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    };

    match facet_type {
        FacetType::ContentType => single("content_type").into_iter().collect(),
        FacetType::SourceType => vec![result.source_type.clone()],
        FacetType::FileType => single("original_file_type").or_else(|| single("file_type")).into_iter().collect(),
        FacetType::HasFeatures => {
            let mut out = Vec::new();
            if meta.get("has_code_elements").and_then(|v| v.as_bool()).unwrap_or(false)
                || meta.get("has_code_blocks").and_then(|v| v.as_bool()).unwrap_or(false)
            {
                out.push("code".to_string());
            }
            if meta.get("has_tables").and_then(|v| v.as_bool()).unwrap_or(false) {
                out.push("tables".to_string());
            }
            if meta.get("has_images").and_then(|v| v.as_bool()).unwrap_or(false) {
                out.push("images".to_string());
            }
            if meta.get("has_links").and_then(|v| v.as_bool()).unwrap_or(false) {
                out.push("links".to_string());
            }
            if meta.get("is_attachment").and_then(|v| v.as_bool()).unwrap_or(false) {
                out.push("attachment".to_string());
            }
            out
        }
        FacetType::HierarchyDepth => meta
            .get("breadcrumb")
            .and_then(|v| v.as_array())
            .map(|a| a.len().to_string())
            .into_iter()
            .collect(),
        FacetType::ReadTime => single("read_time_bucket").into_iter().collect(),
        FacetType::Project => vec![result.project_id.clone()],
        FacetType::Repository => single("repo_name").into_iter().collect(),
        FacetType::Entities => array("entities"),
        FacetType::EntityTypes => array("entity_types"),
        FacetType::Topics => array("topics"),
        FacetType::KeyPhrases => array("key_phrases"),
        FacetType::SectionType => single("section_type").into_iter().collect(),
        FacetType::AttachmentType => single("attachment_type").into_iter().collect(),
        FacetType::ConversionMethod => single("conversion_method").into_iter().collect(),
        FacetType::ChunkingStrategy => single("chunking_strategy").into_iter().collect(),
    }
}

/// Build facets over `results`, each capped at the top `top_n` values by
/// occurrence count.
pub fn compute_facets(results: &[SearchResult], top_n: Option<usize>) -> Vec<Facet> {
    let top_n = top_n.unwrap_or(TOP_N_PER_FACET);
    let mut facets = Vec::new();

    for facet_type in ALL_FACET_TYPES {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for result in results {
            for value in values_for(result, facet_type) {
                *counts.entry(value).or_insert(0) += 1;
            }
        }
        if counts.is_empty() {
            continue;
        }
        let mut values: Vec<FacetValue> = counts
            .into_iter()
            .map(|(value, count)| FacetValue {
                display_name: value.clone(),
                value,
                count,
                description: None,
            })
            .collect();
        values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        values.truncate(top_n);

        facets.push(Facet {
            facet_type,
            display_name: display_name(facet_type).to_string(),
            values,
        });
    }

    facets
}

/// Apply one facet filter to a result set, honoring AND/OR semantics for
/// multi-valued facets.
pub fn apply_facet_filter(results: Vec<SearchResult>, filter: &FacetFilter) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|result| {
            let present = values_for(result, filter.facet_type);
            match filter.combinator {
                FacetCombinator::Or => filter.values.iter().any(|v| present.contains(v)),
                FacetCombinator::And => filter.values.iter().all(|v| present.contains(v)),
            }
        })
        .collect()
}

pub fn apply_facet_filters(mut results: Vec<SearchResult>, filters: &[FacetFilter]) -> Vec<SearchResult> {
    for filter in filters {
        results = apply_facet_filter(results, filter);
    }
    results
}

#[derive(Debug, Clone)]
pub struct RefinementSuggestion {
    pub facet_type: FacetType,
    pub value: String,
    pub resulting_count: usize,
    pub reduction_ratio: f64,
}

/// Suggest up to `MAX_SUGGESTIONS` single-value refinements that would
/// shrink the result set by at least `MIN_REDUCTION_RATIO`.
pub fn suggest_refinements(results: &[SearchResult], facets: &[Facet]) -> Vec<RefinementSuggestion> {
    if results.is_empty() {
        return Vec::new();
    }
    let total = results.len();
    let mut suggestions = Vec::new();

    for facet in facets {
        for value in &facet.values {
            if value.count == total {
                continue;
            }
            let reduction = 1.0 - (value.count as f64 / total as f64);
            if reduction >= MIN_REDUCTION_RATIO {
                suggestions.push(RefinementSuggestion {
                    facet_type: facet.facet_type,
                    value: value.value.clone(),
                    resulting_count: value.count,
                    reduction_ratio: reduction,
                });
            }
        }
    }

    suggestions.sort_by(|a, b| b.reduction_ratio.partial_cmp(&a.reduction_ratio).unwrap_or(std::cmp::Ordering::Equal));
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn result(source_type: &str, project_id: &str) -> SearchResult {
        SearchResult {
            document_id: "d1".to_string(),
            chunk_id: "c1".to_string(),
            score: 0.8,
            dense_score: 0.8,
            source_type: source_type.to_string(),
            source_title: None,
            url: None,
            project_id: project_id.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn has_features_facet_covers_all_five_sub_values() {
        let mut r = result("git", "p1");
        r.metadata.insert("has_code_elements".to_string(), serde_json::json!(true));
        r.metadata.insert("has_tables".to_string(), serde_json::json!(true));
        r.metadata.insert("has_images".to_string(), serde_json::json!(true));
        r.metadata.insert("has_links".to_string(), serde_json::json!(true));
        r.metadata.insert("is_attachment".to_string(), serde_json::json!(true));
        let values = values_for(&r, FacetType::HasFeatures);
        for expected in ["code", "tables", "images", "links", "attachment"] {
            assert!(values.iter().any(|v| v == expected), "missing {expected}");
        }
    }

    #[test]
    fn computes_source_type_facet_with_counts() {
        let results = vec![result("git", "p1"), result("git", "p1"), result("confluence", "p1")];
        let facets = compute_facets(&results, None);
        let source_facet = facets.iter().find(|f| f.facet_type == FacetType::SourceType).unwrap();
        let git_value = source_facet.values.iter().find(|v| v.value == "git").unwrap();
        assert_eq!(git_value.count, 2);
    }

    #[test]
    fn filter_narrows_to_matching_source_type() {
        let results = vec![result("git", "p1"), result("confluence", "p1")];
        let filter = FacetFilter {
            facet_type: FacetType::SourceType,
            values: vec!["git".to_string()],
            combinator: FacetCombinator::Or,
        };
        let filtered = apply_facet_filter(results, &filter);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].source_type, "git");
    }

    #[test]
    fn suggests_refinements_that_meaningfully_shrink_results() {
        let results = vec![result("git", "p1"), result("git", "p1"), result("confluence", "p1"), result("confluence", "p1"), result("confluence", "p1")];
        let facets = compute_facets(&results, None);
        let suggestions = suggest_refinements(&results, &facets);
        assert!(suggestions.len() <= MAX_SUGGESTIONS);
        assert!(suggestions.iter().all(|s| s.reduction_ratio >= MIN_REDUCTION_RATIO));
    }
}
