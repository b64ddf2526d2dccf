//! `kora-memory` — the structured domain memory store.
//!
//! # Overview
//!
//! One SQLite file holds a 14-domain knowledge graph: entities, facts with
//! supersede history, typed edges, working/archived notes, and an f32
//! vector index. The [`engine::MemoryEngine`] layers the public operations
//! on top:
//!
//! | Operation  | Behaviour                                                   |
//! |------------|-------------------------------------------------------------|
//! | `recall`   | keyword + semantic + graph retrieval, agent self-load       |
//! | `remember` | extractor-driven persistence with contradiction superseding |
//! | `traverse` | bounded outbound subgraph walk                              |
//! | `decay`    | periodic rescoring; facts are deprioritised, never deleted  |
//!
//! The embedding and extraction collaborators are traits ([`embed::Embedder`],
//! [`extract::Extractor`]); production implementations are HTTP clients in
//! `kora-agent`. The [`budget::UsageLedger`] shares the database file and
//! tracks per-call LLM spend.

pub mod budget;
pub mod db;
pub mod domain;
pub mod embed;
pub mod engine;
pub mod error;
pub mod extract;
pub mod store;
pub mod types;

pub use domain::{Domain, ALL_DOMAINS};
pub use embed::Embedder;
pub use engine::{EngineConfig, MemoryEngine};
pub use error::{MemoryError, Result};
pub use extract::Extractor;
pub use store::{FactUpsert, SqliteStore};
pub use types::{
    Edge, Entity, EntityKind, Extraction, ExtractionReport, Fact, Graph, Note, NoteTier,
    RecallOptions, RecallResult, TimeWindow,
};
