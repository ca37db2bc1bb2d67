//! Intent classifier and adaptive retrieval strategy.

use std::collections::HashMap;

use crate::nlp::NlpAnalyzer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchIntent {
    TechnicalLookup,
    BusinessContext,
    VendorEvaluation,
    Procedural,
    Informational,
    Troubleshooting,
    Exploratory,
    General,
}

impl SearchIntent {
    const ALL: [SearchIntent; 7] = [
        SearchIntent::TechnicalLookup,
        SearchIntent::BusinessContext,
        SearchIntent::VendorEvaluation,
        SearchIntent::Procedural,
        SearchIntent::Informational,
        SearchIntent::Troubleshooting,
        SearchIntent::Exploratory,
    ];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            SearchIntent::TechnicalLookup => &["api", "function", "error", "code", "config", "parameter", "method"],
            SearchIntent::BusinessContext => &["revenue", "customer", "strategy", "market", "roadmap", "stakeholder"],
            SearchIntent::VendorEvaluation => &["vendor", "compare", "pricing", "contract", "sla", "alternative"],
            SearchIntent::Procedural => &["how", "step", "install", "setup", "configure", "deploy", "guide"],
            SearchIntent::Informational => &["what", "explain", "overview", "definition", "describe"],
            SearchIntent::Troubleshooting => &["error", "fail", "broken", "issue", "bug", "crash", "fix"],
            SearchIntent::Exploratory => &["explore", "related", "similar", "discover", "around"],
            SearchIntent::General => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntentScore {
    pub intent: SearchIntent,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct IntentClassification {
    pub primary: IntentScore,
    pub secondary: Vec<IntentScore>,
}

/// Weighted mix: keyword overlap 40%, POS-sequence 25% (here,
/// question-word presence as the cheapest available proxy), named-entity
/// matches 20% (approximated via extracted entity count), question-word
/// matches 10%, linguistic-indicator bonus 5% (presence of an imperative
/// verb for Procedural).
pub fn classify_intent(
    query: &str,
    nlp: &dyn NlpAnalyzer,
    session_domain: Option<&str>,
    last_intent: Option<SearchIntent>,
) -> IntentClassification {
    let analysis = nlp.analyze(query);
    let query_lower = query.to_lowercase();

    let mut scores: HashMap<SearchIntent, f64> = HashMap::new();
    for intent in SearchIntent::ALL {
        let keywords = intent.keywords();
        let overlap = if keywords.is_empty() {
            0.0
        } else {
            let hits = keywords.iter().filter(|k| query_lower.contains(**k)).count();
            hits as f64 / keywords.len() as f64
        };
        let pos_component = if analysis.is_question { 1.0 } else { 0.0 };
        let entity_component = (analysis.entities.len() as f64 / 3.0).min(1.0);
        let question_word_component = if query_lower.starts_with("how") && intent == SearchIntent::Procedural {
            1.0
        } else if query_lower.starts_with("what") && intent == SearchIntent::Informational {
            1.0
        } else {
            0.0
        };
        let linguistic_bonus = if intent == SearchIntent::Procedural && query_lower.starts_with("how to") {
            1.0
        } else {
            0.0
        };

        let score = overlap * 0.40 + pos_component * 0.25 + entity_component * 0.20 + question_word_component * 0.10 + linguistic_bonus * 0.05;
        scores.insert(intent, score);
    }

    // Behavioral weighting: boost an intent that commonly follows the last one.
    if let Some(prev) = last_intent {
        if let Some(next) = transition_boost(prev) {
            *scores.entry(next).or_insert(0.0) *= 1.20;
        }
    }

    // Session weighting: a domain hint nudges technical/business intents.
    if let Some(domain) = session_domain {
        let domain_lower = domain.to_lowercase();
        if domain_lower.contains("engineering") || domain_lower.contains("tech") {
            *scores.entry(SearchIntent::TechnicalLookup).or_insert(0.0) *= 1.20;
        } else if domain_lower.contains("business") || domain_lower.contains("sales") {
            *scores.entry(SearchIntent::BusinessContext).or_insert(0.0) *= 1.20;
        }
    }

    let mut ranked: Vec<(SearchIntent, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (top_intent, top_score) = ranked.first().cloned().unwrap_or((SearchIntent::General, 0.0));
    let primary = if top_score < 0.3 {
        IntentScore {
            intent: SearchIntent::General,
            confidence: 1.0 - top_score,
        }
    } else {
        IntentScore {
            intent: top_intent,
            confidence: top_score.min(1.0),
        }
    };

    let secondary: Vec<IntentScore> = ranked
        .into_iter()
        .skip(1)
        .filter(|(_, score)| *score > 0.3 * primary.confidence)
        .take(3)
        .map(|(intent, confidence)| IntentScore { intent, confidence })
        .collect();

    IntentClassification { primary, secondary }
}

fn transition_boost(prev: SearchIntent) -> Option<SearchIntent> {
    match prev {
        SearchIntent::Informational => Some(SearchIntent::Procedural),
        SearchIntent::Procedural => Some(SearchIntent::Troubleshooting),
        SearchIntent::Troubleshooting => Some(SearchIntent::TechnicalLookup),
        SearchIntent::Exploratory => Some(SearchIntent::Informational),
        _ => None,
    }
}

/// Per-intent overrides to the retrieval configuration.
#[derive(Debug, Clone)]
pub struct AdaptiveStrategy {
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub min_score: f64,
    pub max_results: usize,
    pub expansion_aggressiveness: f64,
    pub use_knowledge_graph_hints: bool,
}

pub fn adaptive_strategy(intent: SearchIntent) -> AdaptiveStrategy {
    match intent {
        SearchIntent::TechnicalLookup => AdaptiveStrategy {
            vector_weight: 0.5,
            keyword_weight: 0.45,
            min_score: 0.35,
            max_results: 8,
            expansion_aggressiveness: 0.3,
            use_knowledge_graph_hints: true,
        },
        SearchIntent::BusinessContext => AdaptiveStrategy {
            vector_weight: 0.7,
            keyword_weight: 0.2,
            min_score: 0.3,
            max_results: 5,
            expansion_aggressiveness: 0.5,
            use_knowledge_graph_hints: false,
        },
        SearchIntent::VendorEvaluation => AdaptiveStrategy {
            vector_weight: 0.6,
            keyword_weight: 0.3,
            min_score: 0.3,
            max_results: 6,
            expansion_aggressiveness: 0.5,
            use_knowledge_graph_hints: true,
        },
        SearchIntent::Procedural => AdaptiveStrategy {
            vector_weight: 0.55,
            keyword_weight: 0.35,
            min_score: 0.3,
            max_results: 6,
            expansion_aggressiveness: 0.4,
            use_knowledge_graph_hints: false,
        },
        SearchIntent::Informational => AdaptiveStrategy {
            vector_weight: 0.65,
            keyword_weight: 0.25,
            min_score: 0.3,
            max_results: 5,
            expansion_aggressiveness: 0.6,
            use_knowledge_graph_hints: false,
        },
        SearchIntent::Troubleshooting => AdaptiveStrategy {
            vector_weight: 0.45,
            keyword_weight: 0.45,
            min_score: 0.35,
            max_results: 8,
            expansion_aggressiveness: 0.2,
            use_knowledge_graph_hints: true,
        },
        SearchIntent::Exploratory => AdaptiveStrategy {
            vector_weight: 0.7,
            keyword_weight: 0.15,
            min_score: 0.25,
            max_results: 10,
            expansion_aggressiveness: 1.0,
            use_knowledge_graph_hints: true,
        },
        SearchIntent::General => AdaptiveStrategy {
            vector_weight: 0.6,
            keyword_weight: 0.3,
            min_score: 0.3,
            max_results: 5,
            expansion_aggressiveness: 0.4,
            use_knowledge_graph_hints: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::HeuristicNlpAnalyzer;

    #[test]
    fn procedural_query_classifies_as_procedural_or_falls_back_to_general() {
        let nlp = HeuristicNlpAnalyzer::new();
        let result = classify_intent("how to configure the deployment pipeline", &nlp, None, None);
        assert!(matches!(
            result.primary.intent,
            SearchIntent::Procedural | SearchIntent::General
        ));
    }

    #[test]
    fn low_confidence_falls_back_to_general() {
        let nlp = HeuristicNlpAnalyzer::new();
        let result = classify_intent("xyz qux blorp", &nlp, None, None);
        assert_eq!(result.primary.intent, SearchIntent::General);
    }

    #[test]
    fn secondary_intents_stay_bounded_at_three() {
        let nlp = HeuristicNlpAnalyzer::new();
        let result = classify_intent("how to fix the api error in the deploy config", &nlp, None, None);
        assert!(result.secondary.len() <= 3);
    }
}
