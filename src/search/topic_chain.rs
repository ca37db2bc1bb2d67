//! Topic search chaining: build a topic relationship map from a
//! seed result set, then walk it to generate and execute a chain of
//! progressively-exploring queries.

use std::collections::{HashMap, HashSet};

use crate::models::{ExplorationType, SearchResult, TopicChainLink, TopicSearchChain};
use crate::nlp::NlpAnalyzer;

use super::hybrid::{HybridSearchEngine, SearchRequest};

const SEMANTIC_SIMILARITY_THRESHOLD: f64 = 0.4;
const COOCCURRENCE_SIGNIFICANCE: usize = 2;
const DOC_FREQUENCY_CAP_FACTOR: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicRelationship {
    Semantic,
    Cooccurrence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStrategy {
    BreadthFirst,
    DepthFirst,
    RelevanceRanked,
    MixedExploration,
}

/// Topic document-frequency and pairwise co-occurrence counts derived from
/// a seed result set's `topics` metadata arrays.
pub struct TopicMap {
    pub doc_frequency: HashMap<String, usize>,
    pub cooccurrence: HashMap<(String, String), usize>,
    total_docs: usize,
}

fn topics_of(result: &SearchResult) -> Vec<String> {
    result
        .metadata
        .get("topics")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

pub fn build_topic_map(seed: &[SearchResult]) -> TopicMap {
    let mut doc_frequency: HashMap<String, usize> = HashMap::new();
    let mut cooccurrence: HashMap<(String, String), usize> = HashMap::new();

    for result in seed {
        let topics = topics_of(result);
        for topic in &topics {
            *doc_frequency.entry(topic.clone()).or_insert(0) += 1;
        }
        for i in 0..topics.len() {
            for j in (i + 1)..topics.len() {
                *cooccurrence.entry(pair_key(&topics[i], &topics[j])).or_insert(0) += 1;
            }
        }
    }

    TopicMap {
        doc_frequency,
        cooccurrence,
        total_docs: seed.len().max(1),
    }
}

fn pmi_score(map: &TopicMap, a: &str, b: &str, count: usize) -> f64 {
    let n = map.total_docs as f64;
    let p_ab = count as f64 / n;
    let p_a = *map.doc_frequency.get(a).unwrap_or(&1) as f64 / n;
    let p_b = *map.doc_frequency.get(b).unwrap_or(&1) as f64 / n;
    if p_a <= 0.0 || p_b <= 0.0 || p_ab <= 0.0 {
        return 0.0;
    }
    let pmi = (p_ab / (p_a * p_b)).log2();
    // Normalize PMI into [0, 1] via the standard npmi transform.
    let npmi = pmi / -p_ab.log2();
    npmi.clamp(0.0, 1.0)
}

/// `find_related_topics`: returns (topic, score, relationship)
/// tuples derived from `seed`, ranked by score descending.
pub fn find_related_topics(
    seed: &[SearchResult],
    nlp: &dyn NlpAnalyzer,
    max: usize,
    semantic_enabled: bool,
    cooccurrence_enabled: bool,
) -> Vec<(String, f64, TopicRelationship)> {
    let map = build_topic_map(seed);
    let mut scored: Vec<(String, f64, TopicRelationship)> = Vec::new();
    let topics: Vec<&String> = map.doc_frequency.keys().collect();

    if semantic_enabled {
        for i in 0..topics.len() {
            for j in 0..topics.len() {
                if i == j {
                    continue;
                }
                let sim = nlp.semantic_similarity(topics[i], topics[j]);
                if sim >= SEMANTIC_SIMILARITY_THRESHOLD {
                    let df_factor = (*map.doc_frequency.get(topics[j]).unwrap_or(&1) as f64).min(DOC_FREQUENCY_CAP_FACTOR);
                    scored.push((topics[j].clone(), (sim * df_factor).min(1.0), TopicRelationship::Semantic));
                }
            }
        }
    }

    if cooccurrence_enabled {
        for ((a, b), count) in &map.cooccurrence {
            if *count >= COOCCURRENCE_SIGNIFICANCE {
                let score = pmi_score(&map, a, b, *count);
                scored.push((b.clone(), score, TopicRelationship::Cooccurrence));
                scored.push((a.clone(), score, TopicRelationship::Cooccurrence));
            }
        }
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.dedup_by(|a, b| a.0 == b.0);
    scored.truncate(max);
    scored
}

/// `generate_search_chain`: builds a chain of derived queries.
/// Each link's `chain_position` strictly increases, `relevance_score`
/// decays along the chain, and `parent_query` points at the preceding
/// member (or the original query for position 0).
pub fn generate_search_chain(
    query: &str,
    seed: &[SearchResult],
    nlp: &dyn NlpAnalyzer,
    strategy: ChainStrategy,
    max_links: usize,
) -> TopicSearchChain {
    let related = find_related_topics(seed, nlp, max_links.max(1) * 2, true, true);
    let ordered_topics = order_topics_for_strategy(related, strategy, max_links);

    let mut links = Vec::new();
    let mut parent_query = query.to_string();
    let mut decay = 1.0_f64;

    for (position, (topic, score, relationship)) in ordered_topics.into_iter().enumerate() {
        decay *= 0.85;
        let exploration_type = match (strategy, relationship) {
            (ChainStrategy::DepthFirst, _) => ExplorationType::Deeper,
            (_, TopicRelationship::Semantic) => ExplorationType::Related,
            (_, TopicRelationship::Cooccurrence) => ExplorationType::Broader,
        };
        let link_query = format!("{parent_query} {topic}");
        links.push(TopicChainLink {
            query: link_query.clone(),
            primary_topic: topic,
            related_topics: Vec::new(),
            chain_position: position,
            relevance_score: (score * decay).max(0.0),
            exploration_type,
            parent_query: parent_query.clone(),
        });
        parent_query = link_query;
    }

    TopicSearchChain {
        original_query: query.to_string(),
        links,
    }
}

fn order_topics_for_strategy(
    mut related: Vec<(String, f64, TopicRelationship)>,
    strategy: ChainStrategy,
    max_links: usize,
) -> Vec<(String, f64, TopicRelationship)> {
    match strategy {
        ChainStrategy::RelevanceRanked => {
            related.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        }
        ChainStrategy::BreadthFirst => {
            related.sort_by(|a, b| a.0.cmp(&b.0));
        }
        ChainStrategy::DepthFirst => {
            // Keep discovery order, which follows a single topic's
            // semantic neighborhood before moving to the next.
        }
        ChainStrategy::MixedExploration => {
            related.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            // Interleave semantic and co-occurrence links.
            let (semantic, cooccurrence): (Vec<_>, Vec<_>) = related
                .into_iter()
                .partition(|(_, _, rel)| matches!(rel, TopicRelationship::Semantic));
            let mut mixed = Vec::new();
            let mut s_iter = semantic.into_iter();
            let mut c_iter = cooccurrence.into_iter();
            loop {
                match (s_iter.next(), c_iter.next()) {
                    (None, None) => break,
                    (a, b) => {
                        if let Some(a) = a {
                            mixed.push(a);
                        }
                        if let Some(b) = b {
                            mixed.push(b);
                        }
                    }
                }
            }
            related = mixed;
        }
    }
    related.truncate(max_links);
    related
}

/// `execute_chain`: runs `search` for the original query and
/// every chain link's query, mapping query string to its results. A
/// failing link yields an empty list rather than aborting the chain.
pub async fn execute_chain(
    engine: &HybridSearchEngine,
    chain: &TopicSearchChain,
    results_per_link: usize,
    source_types: Option<Vec<String>>,
    project_ids: Option<Vec<String>>,
) -> HashMap<String, Vec<SearchResult>> {
    let mut out = HashMap::new();

    let mut queries = vec![chain.original_query.clone()];
    queries.extend(chain.links.iter().map(|l| l.query.clone()));

    for query in queries {
        let request = SearchRequest {
            query: query.clone(),
            limit: results_per_link,
            source_types: source_types.clone(),
            project_ids: project_ids.clone(),
            session_domain: None,
            last_intent: None,
        };
        let results = engine.search(request).await.unwrap_or_default();
        out.insert(query, results);
    }

    out
}

/// Average Jaccard similarity of consecutive links' topic sets. A chain with fewer than two links is perfectly coherent.
pub fn chain_coherence(chain: &TopicSearchChain) -> f64 {
    if chain.links.len() < 2 {
        return 1.0;
    }
    let mut total = 0.0;
    let mut count = 0;
    for window in chain.links.windows(2) {
        let a: HashSet<&str> = std::iter::once(window[0].primary_topic.as_str())
            .chain(window[0].related_topics.iter().map(String::as_str))
            .collect();
        let b: HashSet<&str> = std::iter::once(window[1].primary_topic.as_str())
            .chain(window[1].related_topics.iter().map(String::as_str))
            .collect();
        let intersection = a.intersection(&b).count();
        let union = a.union(&b).count().max(1);
        total += intersection as f64 / union as f64;
        count += 1;
    }
    total / count as f64
}

/// Discovery potential: weighted sum of topic diversity (30%),
/// average relevance (40%), exploration-type diversity (20%), length
/// factor (10%).
pub fn discovery_potential(chain: &TopicSearchChain, max_links: usize) -> f64 {
    if chain.links.is_empty() {
        return 0.0;
    }
    let topic_diversity = {
        let unique: HashSet<&str> = chain.links.iter().map(|l| l.primary_topic.as_str()).collect();
        unique.len() as f64 / chain.links.len() as f64
    };
    let avg_relevance = chain.links.iter().map(|l| l.relevance_score).sum::<f64>() / chain.links.len() as f64;
    let exploration_diversity = {
        let unique: HashSet<_> = chain.links.iter().map(|l| l.exploration_type).collect();
        unique.len() as f64 / 4.0
    };
    let length_factor = (chain.links.len() as f64 / max_links.max(1) as f64).min(1.0);

    topic_diversity * 0.30 + avg_relevance * 0.40 + exploration_diversity * 0.20 + length_factor * 0.10
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use crate::nlp::HeuristicNlpAnalyzer;
    use serde_json::json;

    fn result_with_topics(topics: &[&str]) -> SearchResult {
        let mut metadata = Metadata::new();
        metadata.insert("topics".to_string(), json!(topics));
        SearchResult {
            document_id: "d1".to_string(),
            chunk_id: "c1".to_string(),
            score: 0.8,
            dense_score: 0.8,
            source_type: "localfile".to_string(),
            source_title: None,
            url: None,
            project_id: "p1".to_string(),
            metadata,
        }
    }

    #[test]
    fn cooccurrence_counts_significant_pairs() {
        let seed = vec![
            result_with_topics(&["auth", "security"]),
            result_with_topics(&["auth", "security"]),
            result_with_topics(&["deployment"]),
        ];
        let map = build_topic_map(&seed);
        assert_eq!(*map.cooccurrence.get(&("auth".to_string(), "security".to_string())).unwrap(), 2);
    }

    #[test]
    fn chain_positions_strictly_increase() {
        let seed = vec![
            result_with_topics(&["auth", "security"]),
            result_with_topics(&["auth", "security"]),
        ];
        let nlp = HeuristicNlpAnalyzer::new();
        let chain = generate_search_chain("auth", &seed, &nlp, ChainStrategy::RelevanceRanked, 3);
        for (i, link) in chain.links.iter().enumerate() {
            assert_eq!(link.chain_position, i);
        }
    }

    #[test]
    fn relevance_decays_along_chain() {
        let seed = vec![
            result_with_topics(&["auth", "security", "tokens"]),
            result_with_topics(&["auth", "security", "tokens"]),
        ];
        let nlp = HeuristicNlpAnalyzer::new();
        let chain = generate_search_chain("auth", &seed, &nlp, ChainStrategy::RelevanceRanked, 3);
        for window in chain.links.windows(2) {
            assert!(window[1].relevance_score <= window[0].relevance_score + 1e-9);
        }
    }

    #[test]
    fn single_link_chain_is_fully_coherent() {
        let chain = TopicSearchChain {
            original_query: "q".to_string(),
            links: vec![],
        };
        assert_eq!(chain_coherence(&chain), 1.0);
    }
}
