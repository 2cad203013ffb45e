#![forbid(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(clippy::all)]

//! # oxirag: a graph-augmented knowledge retrieval engine
//!
//! `oxirag` ingests text documents into a combined vector+graph representation,
//! extracts entities and relationships through an external reasoning model,
//! detects topical communities in the resulting entity graph, and answers
//! queries through four retrieval strategies:
//!
//! - **vector**: nearest-neighbor search over document embeddings
//! - **graph**: entity-seeded breadth-first traversal with structural scoring
//! - **hybrid**: weighted fusion of the vector and graph result sets
//! - **global**: community-guided retrieval over detected topic clusters
//!
//! The external collaborators (graph store, embedding model, reasoning model)
//! are trait seams; the crate ships an in-memory store, a deterministic hash
//! embedder, and HTTP clients for OpenAI-compatible endpoints.

pub mod core;

pub use crate::core::common::RagError;
pub use crate::core::config::{GraphRagConfig, GraphRagConfigBuilder};
pub use crate::core::engine::{GraphRagEngine, GraphRagEngineBuilder, RetrieveOptions};
pub use crate::core::model::{Embedder, HashEmbedder, HttpEmbedder, HttpReasoner, Reasoner};
pub use crate::core::store::{GraphStore, MemoryGraphStore};
pub use crate::core::types::{
    Community, CommunityAlgorithm, CommunityDetectionResult, Document, Entity, EntityType,
    IngestResult, Relationship, ScoredDocument, SearchMode,
};

/// Core result type for the library.
pub type Result<T> = std::result::Result<T, RagError>;
