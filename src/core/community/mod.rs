// src/core/community/mod.rs

//! Community detection over the entity graph: hierarchical clustering of
//! entities into topic groups, plus the summarization/embedding pipeline
//! that turns partitions into persistable [`Community`] records.

mod leiden;
mod louvain;

pub use leiden::LeidenDetector;
pub use louvain::LouvainDetector;

use crate::core::common::Result;
use crate::core::model::{Embedder, Reasoner};
use crate::core::types::{Community, CommunityAlgorithm, Entity, Relationship};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

/// Entity names quoted into one community summarization prompt.
const MAX_SUMMARY_CONTEXT: usize = 20;

/// Entity names used for rule-based fallback summaries and titles.
const FALLBACK_NAMES: usize = 5;

/// Tuning parameters shared by both detector families.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Resolution parameter; higher values produce smaller communities.
    pub resolution: f64,
    /// Maximum local-moving sweeps per level.
    pub max_iterations: usize,
    /// Minimum modularity improvement to keep sweeping.
    pub min_improvement: f64,
    /// Random seed for reproducible node orderings.
    pub seed: Option<u64>,
    /// Maximum number of hierarchy levels.
    pub max_levels: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            max_iterations: 100,
            min_improvement: 0.0001,
            seed: None,
            max_levels: 4,
        }
    }
}

/// Weighted undirected adjacency view of the entity graph, built from
/// relationship edges. Store-agnostic: detectors only see this view.
pub struct EntityGraph {
    names: Vec<String>,
    adjacency: Vec<Vec<(usize, f64)>>,
}

impl EntityGraph {
    /// Builds the adjacency view. Relationships whose endpoints are not in
    /// `entities` are skipped; parallel edges sum their strengths.
    #[must_use]
    pub fn build(entities: &[Entity], relationships: &[Relationship]) -> Self {
        let names: Vec<String> = entities.iter().map(|e| e.name.clone()).collect();
        let index: HashMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();

        let mut weights: HashMap<(usize, usize), f64> = HashMap::new();
        for rel in relationships {
            let (Some(&a), Some(&b)) =
                (index.get(rel.source.as_str()), index.get(rel.target.as_str()))
            else {
                continue;
            };
            if a == b {
                continue;
            }
            let key = (a.min(b), a.max(b));
            *weights.entry(key).or_insert(0.0) += f64::from(rel.strength.max(f32::EPSILON));
        }

        let mut adjacency = vec![Vec::new(); names.len()];
        for ((a, b), w) in weights {
            adjacency[a].push((b, w));
            adjacency[b].push((a, w));
        }

        Self { names, adjacency }
    }

    /// Number of entities in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Whether the graph has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub(crate) fn name(&self, node: usize) -> &str {
        &self.names[node]
    }

    pub(crate) fn neighbors(&self, node: usize) -> &[(usize, f64)] {
        &self.adjacency[node]
    }
}

/// Runs the configured detector and returns one membership vector per level
/// (level 0 first), each mapping entity index to a contiguous community id.
#[must_use]
pub fn detect_partitions(
    graph: &EntityGraph,
    algorithm: CommunityAlgorithm,
    config: &DetectorConfig,
) -> Vec<Vec<usize>> {
    match algorithm {
        CommunityAlgorithm::Louvain => LouvainDetector::new(config.clone()).detect(graph),
        CommunityAlgorithm::Leiden => LeidenDetector::new(config.clone()).detect(graph),
    }
}

/// Detects communities and runs the summarization/embedding pipeline.
///
/// Summaries are requested from the reasoner under a bounded-concurrency
/// limiter; a failed summary falls back to a rule-based one instead of
/// failing the run. All summaries are embedded in a single batch call.
pub async fn build_communities(
    reasoner: Arc<dyn Reasoner>,
    embedder: Arc<dyn Embedder>,
    entities: &[Entity],
    relationships: &[Relationship],
    algorithm: CommunityAlgorithm,
    config: &DetectorConfig,
    concurrency: usize,
) -> Result<Vec<Community>> {
    let graph = EntityGraph::build(entities, relationships);
    if graph.is_empty() {
        info!("entity graph is empty, no communities to detect");
        return Ok(Vec::new());
    }

    let partitions = detect_partitions(&graph, algorithm, config);

    // Member name lists per level, ordered by entity index.
    let mut levels: Vec<Vec<Vec<String>>> = Vec::with_capacity(partitions.len());
    for membership in &partitions {
        let group_count = membership.iter().max().map_or(0, |&c| c + 1);
        let mut groups: Vec<Vec<String>> = vec![Vec::new(); group_count];
        for (node, &community) in membership.iter().enumerate() {
            groups[community].push(graph.name(node).to_string());
        }
        levels.push(groups);
    }

    // Pre-assign ids so parent links can be wired before summarization.
    let ids: Vec<Vec<String>> = levels
        .iter()
        .map(|groups| groups.iter().map(|_| Uuid::new_v4().to_string()).collect())
        .collect();

    let mut communities = Vec::new();
    for (level, groups) in levels.iter().enumerate() {
        for (community_index, names) in groups.iter().enumerate() {
            // A community's parent is the next-level community that absorbed
            // its first member; partitions are nested, so any member works.
            let parent_id = partitions.get(level + 1).map(|next_membership| {
                let first_node = partitions[level]
                    .iter()
                    .position(|&c| c == community_index)
                    .unwrap_or(0);
                ids[level + 1][next_membership[first_node]].clone()
            });

            communities.push(Community {
                id: ids[level][community_index].clone(),
                level: level as u32,
                title: fallback_title(names),
                summary: String::new(),
                rating: (names.len() as f32 / 10.0).min(1.0),
                entity_names: names.clone(),
                parent_id,
                embedding: None,
            });
        }
    }

    summarize(&reasoner, &mut communities, concurrency).await;

    let summaries: Vec<String> = communities.iter().map(|c| c.summary.clone()).collect();
    let embeddings = embedder.embed_batch(&summaries).await?;
    for (community, embedding) in communities.iter_mut().zip(embeddings) {
        community.embedding = Some(embedding);
    }

    info!(
        community_count = communities.len(),
        level_count = levels.len(),
        %algorithm,
        "communities built"
    );
    Ok(communities)
}

/// Fills in titles and summaries, reasoner-first with rule-based fallback.
async fn summarize(reasoner: &Arc<dyn Reasoner>, communities: &mut [Community], concurrency: usize) {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let tasks = communities.iter().map(|community| {
        let reasoner = Arc::clone(reasoner);
        let semaphore = Arc::clone(&semaphore);
        let names = community.entity_names.clone();
        async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return None;
            };
            let listed: Vec<&str> =
                names.iter().take(MAX_SUMMARY_CONTEXT).map(String::as_str).collect();
            match reasoner.extract(&summary_prompt(&listed)).await {
                Ok(raw) => Some(parse_summary(&raw)),
                Err(err) => {
                    warn!("community summarization failed, using fallback: {err}");
                    None
                }
            }
        }
    });

    let outcomes = join_all(tasks).await;
    for (community, outcome) in communities.iter_mut().zip(outcomes) {
        match outcome {
            Some((title, summary)) => {
                if let Some(title) = title {
                    community.title = title;
                }
                community.summary = summary;
            }
            None => community.summary = fallback_summary(&community.entity_names),
        }
    }
}

fn summary_prompt(entities: &[&str]) -> String {
    format!(
        "Summarize the common theme of this group of related entities in one or two \
         sentences. Respond with JSON of the form {{\"title\": ..., \"summary\": ...}}.\n\n\
         Entities: {}",
        entities.join(", ")
    )
}

/// Extracts `(title, summary)` from the reasoner response, tolerating plain
/// text as well as the requested JSON object.
fn parse_summary(raw: &str) -> (Option<String>, String) {
    let cleaned = crate::core::extract::clean_json_response(raw);
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(cleaned) {
        if let Some(object) = value.as_object() {
            let title = object.get("title").and_then(|v| v.as_str()).map(String::from);
            if let Some(summary) = object.get("summary").and_then(|v| v.as_str()) {
                return (title, summary.to_string());
            }
        }
    }
    (None, cleaned.to_string())
}

fn fallback_summary(names: &[String]) -> String {
    let listed: Vec<&str> = names.iter().take(FALLBACK_NAMES).map(String::as_str).collect();
    format!("A community containing: {}", listed.join(", "))
}

fn fallback_title(names: &[String]) -> String {
    let listed: Vec<&str> = names.iter().take(3).map(String::as_str).collect();
    listed.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::RagError;
    use crate::core::model::HashEmbedder;
    use crate::core::types::EntityType;
    use async_trait::async_trait;

    pub(super) fn two_cluster_fixture() -> (Vec<Entity>, Vec<Relationship>) {
        let entities: Vec<Entity> = ["A1", "A2", "A3", "B1", "B2", "B3"]
            .iter()
            .map(|name| Entity::new(*name, EntityType::Concept, "test entity"))
            .collect();
        let edge = |a: &str, b: &str| Relationship::new(a, b, "LINKED", "", 1.0);
        let relationships = vec![
            // Triangle A.
            edge("A1", "A2"),
            edge("A2", "A3"),
            edge("A1", "A3"),
            // Triangle B.
            edge("B1", "B2"),
            edge("B2", "B3"),
            edge("B1", "B3"),
            // One weak bridge.
            edge("A3", "B1"),
        ];
        (entities, relationships)
    }

    struct FixedReasoner(String);

    #[async_trait]
    impl Reasoner for FixedReasoner {
        async fn extract(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingReasoner;

    #[async_trait]
    impl Reasoner for FailingReasoner {
        async fn extract(&self, _prompt: &str) -> Result<String> {
            Err(RagError::Extraction("summarizer offline".to_string()))
        }
    }

    #[test]
    fn test_entity_graph_skips_unknown_endpoints_and_sums_parallel_edges() {
        let entities = vec![
            Entity::new("A", EntityType::Concept, ""),
            Entity::new("B", EntityType::Concept, ""),
        ];
        let relationships = vec![
            Relationship::new("A", "B", "X", "", 0.4),
            Relationship::new("B", "A", "Y", "", 0.6),
            Relationship::new("A", "Ghost", "Z", "", 1.0),
        ];
        let graph = EntityGraph::build(&entities, &relationships);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.neighbors(0).len(), 1);
        let (neighbor, weight) = graph.neighbors(0)[0];
        assert_eq!(neighbor, 1);
        assert!((weight - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_build_communities_empty_graph() {
        let reasoner: Arc<dyn Reasoner> = Arc::new(FixedReasoner(String::new()));
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
        let communities = build_communities(
            reasoner,
            embedder,
            &[],
            &[],
            CommunityAlgorithm::Leiden,
            &DetectorConfig::default(),
            2,
        )
        .await
        .unwrap();
        assert!(communities.is_empty());
    }

    #[tokio::test]
    async fn test_build_communities_two_clusters() {
        let (entities, relationships) = two_cluster_fixture();
        let reasoner: Arc<dyn Reasoner> = Arc::new(FixedReasoner(
            r#"{"title": "Test cluster", "summary": "A tightly linked group."}"#.to_string(),
        ));
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));

        let config = DetectorConfig { seed: Some(7), ..DetectorConfig::default() };
        let communities = build_communities(
            reasoner,
            embedder,
            &entities,
            &relationships,
            CommunityAlgorithm::Louvain,
            &config,
            2,
        )
        .await
        .unwrap();

        let level0: Vec<&Community> = communities.iter().filter(|c| c.level == 0).collect();
        assert_eq!(level0.len(), 2, "expected the two triangles as level-0 communities");
        for community in &communities {
            assert_eq!(community.entity_names.len(), 3);
            assert_eq!(community.title, "Test cluster");
            assert_eq!(community.summary, "A tightly linked group.");
            assert!((community.rating - 0.3).abs() < 1e-6);
            assert!(community.embedding.is_some());
        }
    }

    #[tokio::test]
    async fn test_summarization_failure_uses_fallback() {
        let (entities, relationships) = two_cluster_fixture();
        let reasoner: Arc<dyn Reasoner> = Arc::new(FailingReasoner);
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));

        let config = DetectorConfig { seed: Some(7), ..DetectorConfig::default() };
        let communities = build_communities(
            reasoner,
            embedder,
            &entities,
            &relationships,
            CommunityAlgorithm::Leiden,
            &config,
            2,
        )
        .await
        .unwrap();

        assert!(!communities.is_empty());
        for community in &communities {
            assert!(community.summary.starts_with("A community containing: "));
            assert!(community.embedding.is_some());
        }
    }

    #[test]
    fn test_parse_summary_tolerates_plain_text() {
        let (title, summary) = parse_summary("Just a plain sentence.");
        assert!(title.is_none());
        assert_eq!(summary, "Just a plain sentence.");

        let (title, summary) =
            parse_summary(r#"{"title": "Topic", "summary": "The gist."}"#);
        assert_eq!(title.as_deref(), Some("Topic"));
        assert_eq!(summary, "The gist.");
    }
}
