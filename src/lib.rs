//! # corpusloader
//!
//! A hybrid retrieval platform: a connector-driven ingestion pipeline
//! (Core A) that chunks, embeds, and upserts documents from multiple
//! sources into a vector store, and a hybrid dense+sparse search engine
//! (Core B) exposed over JSON-RPC 2.0 (stdio and HTTP/SSE transports).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌───────────────┐
//! │  Connectors   │──▶│  Pipeline          │──▶│  Vector store  │
//! │  git/jira/... │   │  chunk→embed→upsert│   │  + state store │
//! └──────────────┘   └───────────────────┘   └──────┬────────┘
//!                                                    │
//!                              ┌─────────────────────┤
//!                              ▼                      ▼
//!                        ┌───────────┐          ┌───────────┐
//!                        │  stdio     │          │  HTTP/SSE │
//!                        │  transport │          │  transport│
//!                        └───────────┘          └───────────┘
//!                              (JSON-RPC 2.0 over `rpc`)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | YAML configuration parsing, `${VAR}`/`$HOME` substitution, validation |
//! | [`models`] | Core data types: `Document`, `Chunk`, `SearchResult`, facets, clusters |
//! | [`errors`] | `thiserror` error taxonomy per module family |
//! | [`db`] | SQLite connection pool setup (WAL mode) |
//! | [`migrate`] | Idempotent schema migrations |
//! | [`state_store`] | Persisted ingestion state (change detection ledger) |
//! | [`change_detection`] | New/updated/unchanged/deleted classification |
//! | [`vector_store`] | `VectorStoreClient` trait + SQLite-backed implementation |
//! | [`embedding`] | `EmbeddingProvider` trait, OpenAI implementation |
//! | [`nlp`] | `NlpAnalyzer` trait + heuristic stand-in |
//! | [`chunking`] | Per-content-type chunking strategies |
//! | [`file_conversion`] | Non-text source conversion (PDF, DOCX/zip, HTML) |
//! | [`connectors`] | Source connectors: git, confluence, jira, publicdocs, local file |
//! | [`pipeline`] | Orchestrator + chunk/embed/upsert workers + resource manager |
//! | [`search`] | Hybrid search, intent classification, facets, topic chains, cross-doc intelligence |
//! | [`rpc`] | JSON-RPC 2.0 dispatch + stdio/HTTP transports |

pub mod change_detection;
pub mod chunking;
pub mod config;
pub mod connectors;
pub mod db;
pub mod embedding;
pub mod errors;
pub mod extract;
pub mod file_conversion;
pub mod migrate;
pub mod models;
pub mod nlp;
pub mod pipeline;
pub mod rpc;
pub mod search;
pub mod state_store;
pub mod vector_store;
