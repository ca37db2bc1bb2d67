//! Query expansion: broadens a query with NLP-derived
//! keywords/concepts, falling back to a small domain dictionary.

use crate::nlp::{domain_expansions, NlpAnalyzer};

/// The content-type the query appears to be asking for, used to boost
/// payloads whose own content type matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentTypePreference {
    Code,
    Tables,
    Images,
    Docs,
}

const CODE_HINTS: &[&str] = &["code", "function", "class", "method", "snippet", "implementation", "api"];
const TABLE_HINTS: &[&str] = &["table", "spreadsheet", "csv", "row", "column"];
const IMAGE_HINTS: &[&str] = &["image", "screenshot", "diagram", "picture", "photo"];
const DOC_HINTS: &[&str] = &["document", "doc", "guide", "readme", "manual"];

fn detect_content_type_preference(query_lower: &str) -> Option<ContentTypePreference> {
    if CODE_HINTS.iter().any(|hint| query_lower.contains(hint)) {
        Some(ContentTypePreference::Code)
    } else if TABLE_HINTS.iter().any(|hint| query_lower.contains(hint)) {
        Some(ContentTypePreference::Tables)
    } else if IMAGE_HINTS.iter().any(|hint| query_lower.contains(hint)) {
        Some(ContentTypePreference::Images)
    } else if DOC_HINTS.iter().any(|hint| query_lower.contains(hint)) {
        Some(ContentTypePreference::Docs)
    } else {
        None
    }
}

pub struct ExpandedQuery {
    pub original: String,
    pub expanded_text: String,
    pub added_terms: Vec<String>,
    pub entities: Vec<String>,
    pub topics: Vec<String>,
    pub content_type_preference: Option<ContentTypePreference>,
}

/// Expand `query` using `nlp`. `aggressive` widens the caps:
/// normal mode adds up to 3 keywords + 2 concepts; aggressive mode adds up
/// to 5 keywords + 4 concepts + 3 entity surface forms.
pub fn expand_query(query: &str, nlp: &dyn NlpAnalyzer, aggressive: bool) -> ExpandedQuery {
    let analysis = nlp.analyze(query);
    let (keyword_cap, concept_cap, entity_cap) = if aggressive { (5, 4, 3) } else { (3, 2, 0) };

    let mut added = Vec::new();
    added.extend(analysis.keywords.iter().take(keyword_cap).cloned());
    added.extend(analysis.concepts.iter().take(concept_cap).cloned());
    if entity_cap > 0 {
        added.extend(analysis.entities.iter().take(entity_cap).cloned());
    }

    if added.is_empty() {
        for term in query.split_whitespace() {
            if let Some(expansions) = domain_expansions(term) {
                added.extend(expansions.iter().map(|s| s.to_string()));
            }
        }
    }

    added.sort();
    added.dedup();

    let expanded_text = if added.is_empty() {
        query.to_string()
    } else {
        format!("{} {}", query, added.join(" "))
    };

    ExpandedQuery {
        original: query.to_string(),
        expanded_text,
        added_terms: added,
        entities: analysis.entities.clone(),
        topics: analysis.concepts.clone(),
        content_type_preference: detect_content_type_preference(&query.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::HeuristicNlpAnalyzer;

    #[test]
    fn expands_with_nlp_keywords() {
        let nlp = HeuristicNlpAnalyzer::new();
        let expanded = expand_query("how does authentication work", &nlp, false);
        assert!(expanded.expanded_text.len() >= expanded.original.len());
    }

    #[test]
    fn detects_code_content_type_preference() {
        let nlp = HeuristicNlpAnalyzer::new();
        let expanded = expand_query("show me the retry function implementation", &nlp, false);
        assert_eq!(expanded.content_type_preference, Some(ContentTypePreference::Code));
    }

    #[test]
    fn falls_back_to_domain_dictionary_for_empty_nlp_yield() {
        let nlp = HeuristicNlpAnalyzer::new();
        let expanded = expand_query("api", &nlp, false);
        assert!(expanded.added_terms.iter().any(|t| t == "endpoint") || !expanded.added_terms.is_empty());
    }

    #[test]
    fn aggressive_mode_allows_more_terms() {
        let nlp = HeuristicNlpAnalyzer::new();
        let normal = expand_query("deployment pipeline configuration settings", &nlp, false);
        let aggressive = expand_query("deployment pipeline configuration settings", &nlp, true);
        assert!(aggressive.added_terms.len() >= normal.added_terms.len());
    }
}
