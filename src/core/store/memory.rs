// src/core/store/memory.rs

//! In-memory [`GraphStore`] backed by brute-force cosine search. The default
//! store for tests, demos, and small corpora; everything lives behind one
//! `tokio::sync::RwLock` and no lock is ever held across an await point.

use crate::core::common::{RagError, Result};
use crate::core::store::{GraphHit, GraphStore, MentionHit, MentionedEntity};
use crate::core::types::{
    Community, Document, Entity, Relationship, ScoredCommunity, ScoredDocument, ScoredEntity,
};
use crate::core::vector::{cosine_similarity, unit_score};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const DOCUMENT_INDEX: &str = "document_embeddings";
const ENTITY_INDEX: &str = "entity_embeddings";
const COMMUNITY_INDEX: &str = "community_embeddings";

#[derive(Default)]
struct Tables {
    documents: HashMap<String, Document>,
    /// Keyed by entity name; the first-seen record for a name wins.
    entities: HashMap<String, Entity>,
    relationships: Vec<Relationship>,
    /// Undirected neighbor sets derived from the relationships.
    adjacency: HashMap<String, HashSet<String>>,
    /// document id -> entity name -> summed mention count.
    mentions: HashMap<String, HashMap<String, u64>>,
    communities: Vec<Community>,
    indexes: HashSet<String>,
}

/// In-memory graph store with three named vector indexes.
pub struct MemoryGraphStore {
    dimension: usize,
    tables: RwLock<Tables>,
}

impl MemoryGraphStore {
    /// Creates an empty store for embeddings of the given dimension.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension, tables: RwLock::new(Tables::default()) }
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    fn ensure_index(tables: &Tables, name: &str) -> Result<()> {
        if tables.indexes.contains(name) {
            Ok(())
        } else {
            Err(RagError::IndexMissing { name: name.to_string() })
        }
    }
}

/// Stable descending sort by score, with the id as tie-breaker so equal
/// scores order deterministically.
fn sort_scored<T>(items: &mut [(T, f32, String)]) {
    items.sort_by(|a, b| {
        b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.2.cmp(&b.2))
    });
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn connect(&self) -> Result<()> {
        let mut tables = self.tables.write().await;
        for name in [DOCUMENT_INDEX, ENTITY_INDEX, COMMUNITY_INDEX] {
            tables.indexes.insert(name.to_string());
        }
        debug!(dimension = self.dimension, "in-memory graph store connected");
        Ok(())
    }

    async fn add_documents(&self, documents: &[Document]) -> Result<()> {
        let mut tables = self.tables.write().await;
        for document in documents {
            if let Some(embedding) = &document.embedding {
                self.check_dimension(embedding)?;
            }
            tables.documents.insert(document.id.clone(), document.clone());
        }
        Ok(())
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<()> {
        let mut tables = self.tables.write().await;
        for id in ids {
            tables.documents.remove(id);
            tables.mentions.remove(id);
        }
        Ok(())
    }

    async fn delete_by_source(&self, source_doc_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let ids: Vec<String> = tables
            .documents
            .values()
            .filter(|doc| doc.source_doc_id.as_deref() == Some(source_doc_id))
            .map(|doc| doc.id.clone())
            .collect();
        for id in &ids {
            tables.documents.remove(id);
            tables.mentions.remove(id);
        }
        debug!(source_doc_id, removed = ids.len(), "deleted chunks by source");
        Ok(())
    }

    async fn search_documents(
        &self,
        query_embedding: &[f32],
        limit: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<ScoredDocument>> {
        self.check_dimension(query_embedding)?;
        let tables = self.tables.read().await;
        Self::ensure_index(&tables, DOCUMENT_INDEX)?;

        let mut scored: Vec<(Document, f32, String)> = Vec::new();
        for document in tables.documents.values() {
            let Some(embedding) = &document.embedding else { continue };
            let score = match cosine_similarity(query_embedding, embedding) {
                Ok(raw) => unit_score(raw),
                Err(RagError::ZeroMagnitude) => continue,
                Err(err) => return Err(err),
            };
            if threshold.is_some_and(|t| score < t) {
                continue;
            }
            let id = document.id.clone();
            scored.push((document.clone(), score, id));
        }
        sort_scored(&mut scored);
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(document, score, _)| ScoredDocument { document, score }).collect())
    }

    async fn add_entities(
        &self,
        entities: &[MentionedEntity],
        source_document_id: &str,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        for mentioned in entities {
            if let Some(embedding) = &mentioned.entity.embedding {
                self.check_dimension(embedding)?;
            }
            let name = mentioned.entity.name.clone();
            tables.entities.entry(name.clone()).or_insert_with(|| mentioned.entity.clone());
            *tables
                .mentions
                .entry(source_document_id.to_string())
                .or_default()
                .entry(name)
                .or_insert(0) += mentioned.mentions;
        }
        Ok(())
    }

    async fn add_relationships(&self, relationships: &[Relationship]) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let mut stored = 0;
        for relationship in relationships {
            if !tables.entities.contains_key(&relationship.source)
                || !tables.entities.contains_key(&relationship.target)
            {
                warn!(
                    source = %relationship.source,
                    target = %relationship.target,
                    "skipping relationship with unresolved endpoint"
                );
                continue;
            }
            tables
                .adjacency
                .entry(relationship.source.clone())
                .or_default()
                .insert(relationship.target.clone());
            tables
                .adjacency
                .entry(relationship.target.clone())
                .or_default()
                .insert(relationship.source.clone());
            tables.relationships.push(relationship.clone());
            stored += 1;
        }
        Ok(stored)
    }

    async fn search_entities(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredEntity>> {
        self.check_dimension(query_embedding)?;
        let tables = self.tables.read().await;
        Self::ensure_index(&tables, ENTITY_INDEX)?;

        let mut scored: Vec<(Entity, f32, String)> = Vec::new();
        for entity in tables.entities.values() {
            let Some(embedding) = &entity.embedding else { continue };
            let score = match cosine_similarity(query_embedding, embedding) {
                Ok(raw) => unit_score(raw),
                Err(RagError::ZeroMagnitude) => continue,
                Err(err) => return Err(err),
            };
            let name = entity.name.clone();
            scored.push((entity.clone(), score, name));
        }
        sort_scored(&mut scored);
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(entity, score, _)| ScoredEntity { entity, score }).collect())
    }

    async fn graph_traverse(
        &self,
        seed_names: &[String],
        max_hops: usize,
    ) -> Result<Vec<GraphHit>> {
        let tables = self.tables.read().await;

        // BFS over the entity adjacency; records the minimum hop distance
        // from any seed to each reached entity.
        let mut distance: HashMap<&str, usize> = HashMap::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        for seed in seed_names {
            if let Some((name, _)) = tables.entities.get_key_value(seed) {
                if !distance.contains_key(name.as_str()) {
                    distance.insert(name, 0);
                    queue.push_back((name, 0));
                }
            }
        }
        while let Some((name, hops)) = queue.pop_front() {
            if hops == max_hops {
                continue;
            }
            if let Some(neighbors) = tables.adjacency.get(name) {
                for neighbor in neighbors {
                    if !distance.contains_key(neighbor.as_str()) {
                        distance.insert(neighbor, hops + 1);
                        queue.push_back((neighbor, hops + 1));
                    }
                }
            }
        }

        let mut hits: Vec<GraphHit> = Vec::new();
        for (doc_id, entity_mentions) in &tables.mentions {
            let mut best_hops: Option<usize> = None;
            let mut mentions: u64 = 0;
            for (entity_name, count) in entity_mentions {
                if let Some(&hops) = distance.get(entity_name.as_str()) {
                    best_hops = Some(best_hops.map_or(hops, |h| h.min(hops)));
                    mentions += count;
                }
            }
            let (Some(hops), Some(document)) = (best_hops, tables.documents.get(doc_id)) else {
                continue;
            };
            hits.push(GraphHit { document: document.clone(), hops, mentions });
        }
        hits.sort_by(|a, b| a.hops.cmp(&b.hops).then_with(|| a.document.id.cmp(&b.document.id)));
        Ok(hits)
    }

    async fn documents_for_entities(&self, entity_names: &[String]) -> Result<Vec<MentionHit>> {
        let tables = self.tables.read().await;
        let requested: HashSet<&str> = entity_names.iter().map(String::as_str).collect();

        let mut hits: Vec<MentionHit> = Vec::new();
        for (doc_id, entity_mentions) in &tables.mentions {
            let mut matched: Vec<String> = Vec::new();
            let mut total_mentions: u64 = 0;
            for (entity_name, count) in entity_mentions {
                if requested.contains(entity_name.as_str()) {
                    matched.push(entity_name.clone());
                    total_mentions += count;
                }
            }
            if matched.is_empty() {
                continue;
            }
            let Some(document) = tables.documents.get(doc_id) else { continue };
            matched.sort_unstable();
            hits.push(MentionHit { document: document.clone(), entity_names: matched, total_mentions });
        }
        hits.sort_by(|a, b| a.document.id.cmp(&b.document.id));
        Ok(hits)
    }

    async fn add_communities(&self, communities: &[Community]) -> Result<()> {
        let mut tables = self.tables.write().await;
        for community in communities {
            if let Some(embedding) = &community.embedding {
                self.check_dimension(embedding)?;
            }
        }
        tables.communities = communities.to_vec();
        Ok(())
    }

    async fn search_communities(
        &self,
        query_embedding: &[f32],
        min_level: u32,
        limit: usize,
    ) -> Result<Vec<ScoredCommunity>> {
        self.check_dimension(query_embedding)?;
        let tables = self.tables.read().await;
        Self::ensure_index(&tables, COMMUNITY_INDEX)?;

        let mut scored: Vec<(Community, f32, String)> = Vec::new();
        for community in &tables.communities {
            if community.level < min_level {
                continue;
            }
            let Some(embedding) = &community.embedding else { continue };
            let score = match cosine_similarity(query_embedding, embedding) {
                Ok(raw) => unit_score(raw),
                Err(RagError::ZeroMagnitude) => continue,
                Err(err) => return Err(err),
            };
            let id = community.id.clone();
            scored.push((community.clone(), score, id));
        }
        sort_scored(&mut scored);
        scored.truncate(limit);
        Ok(scored
            .into_iter()
            .map(|(community, score, _)| ScoredCommunity { community, score })
            .collect())
    }

    async fn all_entities(&self) -> Result<Vec<Entity>> {
        let tables = self.tables.read().await;
        let mut entities: Vec<Entity> = tables.entities.values().cloned().collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entities)
    }

    async fn all_relationships(&self) -> Result<Vec<Relationship>> {
        let tables = self.tables.read().await;
        Ok(tables.relationships.clone())
    }

    async fn entity(&self, name: &str) -> Result<Option<Entity>> {
        let tables = self.tables.read().await;
        Ok(tables.entities.get(name).cloned())
    }

    async fn mention_count(&self, document_id: &str, entity_name: &str) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .mentions
            .get(document_id)
            .and_then(|per_entity| per_entity.get(entity_name))
            .copied()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EntityType;

    const DIM: usize = 3;

    fn store() -> MemoryGraphStore {
        MemoryGraphStore::new(DIM)
    }

    fn doc(id: &str, embedding: Vec<f32>) -> Document {
        Document::new(id, format!("content of {id}")).with_embedding(embedding)
    }

    fn mentioned(name: &str, mentions: u64) -> MentionedEntity {
        MentionedEntity {
            entity: Entity::new(name, EntityType::Concept, "")
                .with_embedding(vec![1.0, 0.0, 0.0]),
            mentions,
        }
    }

    #[tokio::test]
    async fn test_search_requires_connect() {
        let store = store();
        let err = store.search_documents(&[1.0, 0.0, 0.0], 5, None).await.unwrap_err();
        match err {
            RagError::IndexMissing { name } => assert_eq!(name, "document_embeddings"),
            other => panic!("expected IndexMissing, got {other:?}"),
        }

        store.connect().await.unwrap();
        assert!(store.search_documents(&[1.0, 0.0, 0.0], 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_document_search_ranks_and_filters() {
        let store = store();
        store.connect().await.unwrap();
        store
            .add_documents(&[
                doc("a", vec![1.0, 0.0, 0.0]),
                doc("b", vec![0.7, 0.7, 0.0]),
                doc("c", vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.search_documents(&[1.0, 0.0, 0.0], 10, None).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].document.id, "a");
        assert_eq!(results[1].document.id, "b");
        assert!(results[0].score > results[1].score);

        let filtered = store.search_documents(&[1.0, 0.0, 0.0], 10, Some(0.5)).await.unwrap();
        assert_eq!(filtered.len(), 2);

        let limited = store.search_documents(&[1.0, 0.0, 0.0], 1, None).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_reingesting_supersedes_document() {
        let store = store();
        store.connect().await.unwrap();
        store.add_documents(&[doc("a", vec![1.0, 0.0, 0.0])]).await.unwrap();
        let replacement = Document::new("a", "updated").with_embedding(vec![0.0, 1.0, 0.0]);
        store.add_documents(&[replacement]).await.unwrap();

        let results = store.search_documents(&[0.0, 1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(results[0].document.content, "updated");
    }

    #[tokio::test]
    async fn test_dimension_enforced_on_write_and_query() {
        let store = store();
        store.connect().await.unwrap();
        assert!(matches!(
            store.add_documents(&[doc("a", vec![1.0, 0.0])]).await,
            Err(RagError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(matches!(
            store.search_documents(&[1.0], 5, None).await,
            Err(RagError::DimensionMismatch { expected: 3, actual: 1 })
        ));
    }

    #[tokio::test]
    async fn test_entity_first_seen_wins_and_mentions_accumulate() {
        let store = store();
        store.connect().await.unwrap();

        let first = MentionedEntity {
            entity: Entity::new("Acme", EntityType::Organization, "a company")
                .with_embedding(vec![1.0, 0.0, 0.0]),
            mentions: 2,
        };
        let second = MentionedEntity {
            entity: Entity::new("Acme", EntityType::Concept, "different description"),
            mentions: 3,
        };
        store.add_entities(&[first], "doc-1").await.unwrap();
        store.add_entities(&[second], "doc-1").await.unwrap();

        let stored = store.entity("Acme").await.unwrap().unwrap();
        assert_eq!(stored.entity_type, EntityType::Organization);
        assert_eq!(stored.description, "a company");
        assert_eq!(store.mention_count("doc-1", "Acme").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_relationships_reject_dangling_endpoints() {
        let store = store();
        store.connect().await.unwrap();
        store.add_entities(&[mentioned("A", 1), mentioned("B", 1)], "doc-1").await.unwrap();

        let stored = store
            .add_relationships(&[
                Relationship::new("A", "B", "KNOWS", "", 0.8),
                Relationship::new("A", "Ghost", "KNOWS", "", 0.8),
            ])
            .await
            .unwrap();
        assert_eq!(stored, 1);
        assert_eq!(store.all_relationships().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_graph_traverse_minimum_hops() {
        let store = store();
        store.connect().await.unwrap();
        store.add_documents(&[doc("d1", vec![1.0, 0.0, 0.0])]).await.unwrap();
        store.add_documents(&[doc("d2", vec![0.0, 1.0, 0.0])]).await.unwrap();
        store.add_documents(&[doc("d3", vec![0.0, 0.0, 1.0])]).await.unwrap();

        // Chain A - B - C; d1 mentions A, d2 mentions B, d3 mentions C.
        store.add_entities(&[mentioned("A", 2)], "d1").await.unwrap();
        store.add_entities(&[mentioned("B", 1)], "d2").await.unwrap();
        store.add_entities(&[mentioned("C", 1)], "d3").await.unwrap();
        store
            .add_relationships(&[
                Relationship::new("A", "B", "LINKED", "", 1.0),
                Relationship::new("B", "C", "LINKED", "", 1.0),
            ])
            .await
            .unwrap();

        let hits = store.graph_traverse(&["A".to_string()], 1).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.id, "d1");
        assert_eq!(hits[0].hops, 0);
        assert_eq!(hits[0].mentions, 2);
        assert_eq!(hits[1].document.id, "d2");
        assert_eq!(hits[1].hops, 1);

        let wider = store.graph_traverse(&["A".to_string()], 2).await.unwrap();
        assert_eq!(wider.len(), 3);

        let missing = store.graph_traverse(&["Nobody".to_string()], 2).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_documents_for_entities_sums_mentions() {
        let store = store();
        store.connect().await.unwrap();
        store.add_documents(&[doc("d1", vec![1.0, 0.0, 0.0])]).await.unwrap();
        store.add_entities(&[mentioned("A", 2), mentioned("B", 3)], "d1").await.unwrap();

        let hits = store
            .documents_for_entities(&["A".to_string(), "B".to_string(), "C".to_string()])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_names, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(hits[0].total_mentions, 5);
    }

    #[tokio::test]
    async fn test_delete_by_source_removes_chunks_and_mentions() {
        let store = store();
        store.connect().await.unwrap();
        let chunk = Document::new("c1", "chunk")
            .with_source("report.txt", 0, 1)
            .with_embedding(vec![1.0, 0.0, 0.0]);
        store.add_documents(&[chunk, doc("other", vec![0.0, 1.0, 0.0])]).await.unwrap();
        store.add_entities(&[mentioned("A", 1)], "c1").await.unwrap();

        store.delete_by_source("report.txt").await.unwrap();
        let results = store.search_documents(&[1.0, 0.0, 0.0], 10, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "other");
        assert_eq!(store.mention_count("c1", "A").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_community_search_respects_min_level_and_replace() {
        let store = store();
        store.connect().await.unwrap();

        let community = |id: &str, level: u32, embedding: Vec<f32>| Community {
            id: id.to_string(),
            level,
            title: id.to_string(),
            summary: String::new(),
            rating: 0.5,
            entity_names: vec!["A".to_string()],
            parent_id: None,
            embedding: Some(embedding),
        };
        store
            .add_communities(&[
                community("fine", 0, vec![1.0, 0.0, 0.0]),
                community("coarse", 1, vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let all = store.search_communities(&[1.0, 0.0, 0.0], 0, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        let coarse_only = store.search_communities(&[1.0, 0.0, 0.0], 1, 10).await.unwrap();
        assert_eq!(coarse_only.len(), 1);
        assert_eq!(coarse_only[0].community.id, "coarse");

        // A new detection run replaces the previous communities wholesale.
        store.add_communities(&[community("rerun", 0, vec![0.0, 1.0, 0.0])]).await.unwrap();
        let after = store.search_communities(&[0.0, 1.0, 0.0], 0, 10).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].community.id, "rerun");
    }
}
