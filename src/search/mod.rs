//! Hybrid search and retrieval engine: query expansion, intent
//! classification, dense+sparse retrieval, faceted search, topic search
//! chaining, and cross-document intelligence.

pub mod cross_doc;
pub mod facets;
pub mod hybrid;
pub mod intent;
pub mod query_analysis;
pub mod topic_chain;
