// src/core/types/mod.rs

//! Data model for the retrieval engine: documents, entities, relationships,
//! communities, and the result records the engine-facing API returns.

use crate::core::common::RagError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A piece of text content, usually one chunk of a larger source document.
///
/// The embedding covers the content only, never relationship data, so graph
/// edits never require re-embedding. Documents are immutable once embedded;
/// re-ingestion supersedes the stored record instead of mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier for this chunk.
    pub id: String,
    /// The actual text content.
    pub content: String,
    /// Content-only embedding, populated during ingestion if absent.
    pub embedding: Option<Vec<f32>>,
    /// Identifier of the source document this chunk was split from.
    pub source_doc_id: Option<String>,
    /// Position of this chunk within the source document.
    pub chunk_index: usize,
    /// Total number of chunks the source document was split into.
    pub total_chunks: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Creates a new single-chunk document with the given id.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            embedding: None,
            source_doc_id: None,
            chunk_index: 0,
            total_chunks: 1,
            created_at: Utc::now(),
        }
    }

    /// Creates a document with a generated id.
    pub fn from_content(content: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), content)
    }

    /// Records which source document this chunk belongs to.
    #[must_use]
    pub fn with_source(
        mut self,
        source_doc_id: impl Into<String>,
        chunk_index: usize,
        total_chunks: usize,
    ) -> Self {
        self.source_doc_id = Some(source_doc_id.into());
        self.chunk_index = chunk_index;
        self.total_chunks = total_chunks;
        self
    }

    /// Attaches a precomputed embedding.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Closed set of entity categories the extraction schema accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    /// A person.
    Person,
    /// An organization or company.
    Organization,
    /// A geographic location.
    Location,
    /// A product or service.
    Product,
    /// An event.
    Event,
    /// An abstract concept; also the fallback for unrecognized labels.
    Concept,
}

impl EntityType {
    /// Parses a reasoner-supplied type label, tolerating common aliases.
    /// Returns `None` for labels outside the closed set.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "PERSON" | "PEOPLE" => Some(Self::Person),
            "ORGANIZATION" | "ORG" | "COMPANY" => Some(Self::Organization),
            "LOCATION" | "PLACE" | "GPE" => Some(Self::Location),
            "PRODUCT" => Some(Self::Product),
            "EVENT" => Some(Self::Event),
            "CONCEPT" => Some(Self::Concept),
            _ => None,
        }
    }

    /// Canonical uppercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Organization => "ORGANIZATION",
            Self::Location => "LOCATION",
            Self::Product => "PRODUCT",
            Self::Event => "EVENT",
            Self::Concept => "CONCEPT",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named entity extracted from document content.
///
/// Identity is name-based: the first-seen entity for a given name wins and
/// later duplicates merge their mention counts into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name; the identity key within a collection.
    pub name: String,
    /// Category of the entity.
    pub entity_type: EntityType,
    /// Short description from the extraction pass; first seen wins.
    pub description: String,
    /// Embedding of [`Self::embedding_text`], never of graph edges.
    pub embedding: Option<Vec<f32>>,
}

impl Entity {
    /// Creates a new entity without an embedding.
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        description: impl Into<String>,
    ) -> Self {
        Self { name: name.into(), entity_type, description: description.into(), embedding: None }
    }

    /// Attaches an embedding.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Text the entity embedding is computed over: name, type, description.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        format!("{} ({}): {}", self.name, self.entity_type, self.description)
    }
}

/// A typed edge between two resolved entities.
///
/// Relationships carry no embedding; they exist purely as graph edges, so
/// adding or removing an edge never requires re-embedding anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Name of the source entity; must reference a resolved entity.
    pub source: String,
    /// Name of the target entity; must reference a resolved entity.
    pub target: String,
    /// Normalized relationship type, uppercase with underscores.
    pub rel_type: String,
    /// Short description of the relationship.
    pub description: String,
    /// Strength of the relationship, clamped into `[0, 1]`.
    pub strength: f32,
}

impl Relationship {
    /// Creates a relationship, normalizing the type label and clamping the
    /// strength into range.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        rel_type: &str,
        description: impl Into<String>,
        strength: f32,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            rel_type: Self::normalize_type(rel_type),
            description: description.into(),
            strength: strength.clamp(0.0, 1.0),
        }
    }

    /// Normalizes a type label to uppercase with underscores for spaces.
    #[must_use]
    pub fn normalize_type(raw: &str) -> String {
        let trimmed = raw.trim();
        let label = if trimmed.is_empty() { "RELATED_TO" } else { trimmed };
        label.to_uppercase().split_whitespace().collect::<Vec<_>>().join("_")
    }
}

/// A topical cluster of entities produced by one community-detection run.
///
/// Level 0 is the finest grain; higher levels aggregate lower ones through
/// the `parent_id` relation, forming a forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    /// Unique identifier for the community.
    pub id: String,
    /// Hierarchy level; 0 is finest-grained.
    pub level: u32,
    /// Short display title.
    pub title: String,
    /// Natural-language thematic summary.
    pub summary: String,
    /// Importance rating in `[0, 1]`.
    pub rating: f32,
    /// Ordered member entity names; may be empty.
    pub entity_names: Vec<String>,
    /// Aggregating community at the next level, if any.
    pub parent_id: Option<String>,
    /// Embedding of the summary alone.
    pub embedding: Option<Vec<f32>>,
}

/// A document returned from a search operation, with its score populated.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    /// The retrieved document.
    pub document: Document,
    /// Relevance score in `[0, 1]`.
    pub score: f32,
}

/// An entity returned from entity vector search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntity {
    /// The retrieved entity.
    pub entity: Entity,
    /// Relevance score in `[0, 1]`.
    pub score: f32,
}

/// A community returned from community vector search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCommunity {
    /// The retrieved community, including its member entity names.
    pub community: Community,
    /// Relevance score in `[0, 1]`.
    pub score: f32,
}

/// Success/failure breakdown of one document-ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestResult {
    /// Number of documents fully ingested.
    pub added: usize,
    /// Number of documents that failed and were skipped.
    pub failed: usize,
    /// One message per failed document.
    pub errors: Vec<String>,
}

/// Outcome of one community-detection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityDetectionResult {
    /// Number of communities persisted.
    pub community_count: usize,
    /// Number of hierarchy levels produced.
    pub level_count: usize,
    /// Algorithm that produced the partition.
    pub algorithm: CommunityAlgorithm,
}

/// Supported community-detection algorithm families.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunityAlgorithm {
    /// Modularity-optimizing hierarchical clustering.
    Louvain,
    /// Louvain with a refinement step between local moving and aggregation.
    #[default]
    Leiden,
}

impl fmt::Display for CommunityAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Louvain => f.write_str("louvain"),
            Self::Leiden => f.write_str("leiden"),
        }
    }
}

impl FromStr for CommunityAlgorithm {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "louvain" => Ok(Self::Louvain),
            "leiden" => Ok(Self::Leiden),
            other => Err(RagError::Configuration(format!(
                "unknown community algorithm '{other}' (expected louvain or leiden)"
            ))),
        }
    }
}

/// The four mutually exclusive retrieval strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Nearest-neighbor search over document embeddings.
    #[default]
    Vector,
    /// Entity-seeded breadth-first traversal with structural scoring.
    Graph,
    /// Weighted fusion of the vector and graph result sets.
    Hybrid,
    /// Community-guided retrieval; requires a prior detection run.
    Global,
}

impl SearchMode {
    /// Lowercase mode name as used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Graph => "graph",
            Self::Hybrid => "hybrid",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vector" => Ok(Self::Vector),
            "graph" => Ok(Self::Graph),
            "hybrid" => Ok(Self::Hybrid),
            "global" => Ok(Self::Global),
            other => Err(RagError::ModeNotSupported(format!(
                "unknown retrieval mode '{other}' (expected vector, graph, hybrid, or global)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_builders() {
        let doc = Document::new("doc-1", "Alice works at Acme.")
            .with_source("report.txt", 0, 2)
            .with_embedding(vec![0.1, 0.2]);
        assert_eq!(doc.id, "doc-1");
        assert_eq!(doc.source_doc_id.as_deref(), Some("report.txt"));
        assert_eq!(doc.chunk_index, 0);
        assert_eq!(doc.total_chunks, 2);
        assert_eq!(doc.embedding, Some(vec![0.1, 0.2]));

        let generated = Document::from_content("some chunk");
        assert!(!generated.id.is_empty());
        assert_eq!(generated.total_chunks, 1);
    }

    #[test]
    fn test_entity_type_parse_aliases() {
        assert_eq!(EntityType::parse("person"), Some(EntityType::Person));
        assert_eq!(EntityType::parse(" ORG "), Some(EntityType::Organization));
        assert_eq!(EntityType::parse("Place"), Some(EntityType::Location));
        assert_eq!(EntityType::parse("widget"), None);
    }

    #[test]
    fn test_entity_embedding_text() {
        let entity = Entity::new("Acme", EntityType::Organization, "A manufacturing company");
        assert_eq!(entity.embedding_text(), "Acme (ORGANIZATION): A manufacturing company");
    }

    #[test]
    fn test_relationship_normalization() {
        let rel = Relationship::new("Alice", "Acme", "works at", "Alice is employed by Acme", 1.4);
        assert_eq!(rel.rel_type, "WORKS_AT");
        assert_eq!(rel.strength, 1.0);

        let rel = Relationship::new("A", "B", "  ", "", -0.5);
        assert_eq!(rel.rel_type, "RELATED_TO");
        assert_eq!(rel.strength, 0.0);
    }

    #[test]
    fn test_search_mode_parsing() {
        assert_eq!("vector".parse::<SearchMode>().unwrap(), SearchMode::Vector);
        assert_eq!(" Global ".parse::<SearchMode>().unwrap(), SearchMode::Global);

        let err = "cosmic".parse::<SearchMode>().unwrap_err();
        match err {
            RagError::ModeNotSupported(msg) => assert!(msg.contains("cosmic")),
            other => panic!("expected ModeNotSupported, got {other:?}"),
        }
    }

    #[test]
    fn test_community_algorithm_parsing() {
        assert_eq!("leiden".parse::<CommunityAlgorithm>().unwrap(), CommunityAlgorithm::Leiden);
        assert_eq!(CommunityAlgorithm::default(), CommunityAlgorithm::Leiden);
        assert!("girvan".parse::<CommunityAlgorithm>().is_err());
    }
}
