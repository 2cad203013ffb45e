// src/core/store/mod.rs

//! The graph-store seam: the persistence contract the engine consumes, the
//! connection-retry policy, and the shipped in-memory implementation.

mod memory;

pub use memory::MemoryGraphStore;

use crate::core::common::{RagError, Result};
use crate::core::types::{
    Community, Document, Entity, Relationship, ScoredCommunity, ScoredDocument, ScoredEntity,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// An entity plus its mention count within one source document, as produced
/// by the entity resolver for a single chunk.
#[derive(Debug, Clone)]
pub struct MentionedEntity {
    /// The resolved entity.
    pub entity: Entity,
    /// Times the source document referenced it.
    pub mentions: u64,
}

/// A document reached by graph traversal.
#[derive(Debug, Clone)]
pub struct GraphHit {
    /// The document.
    pub document: Document,
    /// Hops from the nearest seed entity to an entity this document mentions.
    pub hops: usize,
    /// Total mention count over the visited entities this document mentions.
    pub mentions: u64,
}

/// A document found through mention edges, with the matched entities.
#[derive(Debug, Clone)]
pub struct MentionHit {
    /// The document.
    pub document: Document,
    /// Which of the requested entities this document mentions.
    pub entity_names: Vec<String>,
    /// Total mention count over the matched entities.
    pub total_mentions: u64,
}

/// Persistence contract for documents, entities, relationships, and
/// communities with vector indexes.
///
/// The store is the single source of truth and must provide its own internal
/// consistency for concurrent writers. Write and query failures are surfaced
/// as errors and never retried here; only connection establishment is
/// retried, via [`connect_with_retry`].
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// One connection/handshake attempt, including vector index setup.
    async fn connect(&self) -> Result<()>;

    /// Inserts documents; an existing id is superseded, not mutated.
    async fn add_documents(&self, documents: &[Document]) -> Result<()>;

    /// Bulk-deletes documents by id, along with their mention edges.
    async fn delete_documents(&self, ids: &[String]) -> Result<()>;

    /// Bulk-deletes every chunk of one source document.
    async fn delete_by_source(&self, source_doc_id: &str) -> Result<()>;

    /// Nearest-neighbor search over document embeddings. Scores are in
    /// `[0, 1]`; results below `threshold` are filtered out.
    async fn search_documents(
        &self,
        query_embedding: &[f32],
        limit: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<ScoredDocument>>;

    /// Stores entities resolved from one source document and records their
    /// mention edges. The first-seen entity for a name wins; duplicates only
    /// add mentions.
    async fn add_entities(
        &self,
        entities: &[MentionedEntity],
        source_document_id: &str,
    ) -> Result<()>;

    /// Stores relationships. Edges with an unresolved endpoint are rejected
    /// (skipped with a warning), not stored. Returns the number stored.
    async fn add_relationships(&self, relationships: &[Relationship]) -> Result<usize>;

    /// Nearest-neighbor search over entity embeddings.
    async fn search_entities(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredEntity>>;

    /// Breadth-first traversal from the seed entities along relationship
    /// edges, up to `max_hops`, collecting the documents that mention any
    /// visited entity with their minimum hop distance.
    async fn graph_traverse(&self, seed_names: &[String], max_hops: usize)
        -> Result<Vec<GraphHit>>;

    /// Finds all documents mentioning any of the given entities.
    async fn documents_for_entities(&self, entity_names: &[String]) -> Result<Vec<MentionHit>>;

    /// Wholesale-replaces the stored communities with this detection run's.
    async fn add_communities(&self, communities: &[Community]) -> Result<()>;

    /// Nearest-neighbor search over community embeddings, restricted to
    /// `level >= min_level`. Results include their member entity lists;
    /// a store that omits them silently degrades global mode to its
    /// vector-search fallback.
    async fn search_communities(
        &self,
        query_embedding: &[f32],
        min_level: u32,
        limit: usize,
    ) -> Result<Vec<ScoredCommunity>>;

    /// All stored entities (community detection input).
    async fn all_entities(&self) -> Result<Vec<Entity>>;

    /// All stored relationships (community detection input).
    async fn all_relationships(&self) -> Result<Vec<Relationship>>;

    /// Looks up one entity by name.
    async fn entity(&self, name: &str) -> Result<Option<Entity>>;

    /// Mention count recorded for one (document, entity) pair.
    async fn mention_count(&self, document_id: &str, entity_name: &str) -> Result<u64>;
}

/// Establishes the store connection, retrying with exponential backoff.
///
/// `max_retries` counts attempts beyond the first; the delay doubles per
/// attempt starting from `base_delay_ms`. Exhausting the attempts yields
/// [`RagError::Connection`].
pub async fn connect_with_retry(
    store: &dyn GraphStore,
    max_retries: u32,
    base_delay_ms: u64,
) -> Result<()> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match store.connect().await {
            Ok(()) => return Ok(()),
            Err(err) if attempt <= max_retries => {
                let delay_ms = base_delay_ms.saturating_mul(1_u64 << (attempt - 1).min(16));
                warn!(attempt, delay_ms, "graph store connection failed, retrying: {err}");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(err) => {
                return Err(RagError::Connection { attempts: attempt, message: err.to_string() })
            }
        }
    }
}
