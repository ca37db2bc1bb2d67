//! NLP analyzer trait and a dependency-free heuristic implementation.
//!
//! The spaCy-based analyzer the search engine is modeled against is an
//! external collaborator assumed available as a dependency with a defined
//! interface. [`NlpAnalyzer`] fixes that interface; [`HeuristicNlpAnalyzer`]
//! is a runnable stand-in (regex/POS-pattern heuristics, a stopword list, a
//! capitalized-sequence entity heuristic) so the rest of the system —
//! query expansion, intent classification, topic chaining — works without a
//! live spaCy process. A real spaCy-backed implementation satisfies the same
//! trait.

use std::collections::{HashMap, HashSet};

use stopwords::STOPWORDS;
use regex::Regex;

/// A coarse part-of-speech tag, enough to drive the heuristics this crate
/// needs (question detection, keyword extraction) without a full tagger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pos {
    Noun,
    Verb,
    Adjective,
    QuestionWord,
    Other,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    pub pos: Pos,
}

#[derive(Debug, Clone, Default)]
pub struct NlpAnalysis {
    pub tokens: Vec<Token>,
    pub keywords: Vec<String>,
    pub entities: Vec<String>,
    pub concepts: Vec<String>,
    pub is_question: bool,
}

pub trait NlpAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> NlpAnalysis;

    /// Semantic similarity between two topic strings in [0, 1], used by
    /// topic-search chaining's similarity cache.
    fn semantic_similarity(&self, a: &str, b: &str) -> f64;
}

static QUESTION_WORDS: &[&str] = &[
    "what", "why", "how", "when", "where", "who", "which", "can", "should", "does", "is", "are",
];

pub struct HeuristicNlpAnalyzer {
    word_boundary: Regex,
    capitalized_run: Regex,
}

impl Default for HeuristicNlpAnalyzer {
    fn default() -> Self {
        Self {
            word_boundary: Regex::new(r"[A-Za-z][A-Za-z0-9_'-]*").unwrap(),
            capitalized_run: Regex::new(r"\b([A-Z][a-zA-Z0-9]*(?:\s+[A-Z][a-zA-Z0-9]*)*)\b")
                .unwrap(),
        }
    }
}

impl HeuristicNlpAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        self.word_boundary
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    fn classify_pos(&self, word: &str, position: usize) -> Pos {
        let lower = word.to_lowercase();
        if QUESTION_WORDS.contains(&lower.as_str()) && position == 0 {
            return Pos::QuestionWord;
        }
        if lower.ends_with("ing") || lower.ends_with("ed") || lower.ends_with("ize") {
            return Pos::Verb;
        }
        if lower.ends_with("ive") || lower.ends_with("al") || lower.ends_with("ous") {
            return Pos::Adjective;
        }
        if lower.ends_with("tion") || lower.ends_with("ment") || lower.ends_with("ness") {
            return Pos::Noun;
        }
        Pos::Other
    }
}

impl NlpAnalyzer for HeuristicNlpAnalyzer {
    fn analyze(&self, text: &str) -> NlpAnalysis {
        let words = self.tokenize(text);
        let tokens: Vec<Token> = words
            .iter()
            .enumerate()
            .map(|(i, w)| Token {
                text: w.clone(),
                pos: self.classify_pos(w, i),
            })
            .collect();

        let is_question = text.trim_end().ends_with('?')
            || tokens
                .first()
                .map(|t| t.pos == Pos::QuestionWord)
                .unwrap_or(false);

        let stopwords: HashSet<&str> = STOPWORDS.iter().copied().collect();
        let mut seen = HashSet::new();
        let keywords: Vec<String> = tokens
            .iter()
            .map(|t| t.text.to_lowercase())
            .filter(|w| w.len() > 2 && !stopwords.contains(w.as_str()))
            .filter(|w| seen.insert(w.clone()))
            .collect();

        let entities: Vec<String> = self
            .capitalized_run
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Concepts: the most frequent non-stopword keywords, a cheap proxy
        // for main topics without a real semantic model.
        let mut freq: HashMap<String, usize> = HashMap::new();
        for k in &keywords {
            *freq.entry(k.clone()).or_insert(0) += 1;
        }
        let mut concepts: Vec<String> = freq.into_iter().map(|(k, _)| k).collect();
        concepts.sort();
        concepts.truncate(5);

        NlpAnalysis {
            tokens,
            keywords,
            entities,
            concepts,
            is_question,
        }
    }

    fn semantic_similarity(&self, a: &str, b: &str) -> f64 {
        if a.eq_ignore_ascii_case(b) {
            return 1.0;
        }
        let ta: HashSet<String> = self.tokenize(a).into_iter().map(|s| s.to_lowercase()).collect();
        let tb: HashSet<String> = self.tokenize(b).into_iter().map(|s| s.to_lowercase()).collect();
        if ta.is_empty() || tb.is_empty() {
            return 0.0;
        }
        let intersection = ta.intersection(&tb).count();
        let union = ta.union(&tb).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }
}

/// Domain expansion dictionary used as a fallback when NLP-driven expansion
/// fails or yields nothing.
pub fn domain_expansions(term: &str) -> Option<&'static [&'static str]> {
    match term.to_lowercase().as_str() {
        "api" => Some(&["interface", "endpoint", "service", "restful"]),
        "db" => Some(&["database", "datastore", "storage"]),
        "auth" => Some(&["authentication", "authorization", "login"]),
        "config" => Some(&["configuration", "settings", "options"]),
        "ci" => Some(&["continuous integration", "pipeline", "build"]),
        _ => None,
    }
}

mod stopwords {
    pub static STOPWORDS: &[&str] = &[
        "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "be", "been", "to",
        "of", "in", "on", "for", "with", "as", "by", "at", "from", "that", "this", "it", "its",
        "do", "does", "did", "not", "can", "will", "would", "should", "could", "i", "you", "we",
        "they", "he", "she",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_question_by_leading_word() {
        let nlp = HeuristicNlpAnalyzer::new();
        let analysis = nlp.analyze("How does the pipeline handle retries");
        assert!(analysis.is_question);
    }

    #[test]
    fn extracts_capitalized_entities() {
        let nlp = HeuristicNlpAnalyzer::new();
        let analysis = nlp.analyze("The Acme Corp uses Kubernetes in production.");
        assert!(analysis.entities.iter().any(|e| e.contains("Acme Corp")));
    }

    #[test]
    fn semantic_similarity_is_symmetric() {
        let nlp = HeuristicNlpAnalyzer::new();
        assert_eq!(
            nlp.semantic_similarity("vector search", "search vector"),
            nlp.semantic_similarity("search vector", "vector search")
        );
    }

    #[test]
    fn domain_expansion_covers_api() {
        assert!(domain_expansions("API").unwrap().contains(&"endpoint"));
    }
}
