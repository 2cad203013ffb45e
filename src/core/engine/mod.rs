// src/core/engine/mod.rs

//! The retrieval engine: document ingestion with entity/relationship
//! extraction, community detection, and the four retrieval modes.

use crate::core::common::{RagError, Result};
use crate::core::community::{build_communities, DetectorConfig};
use crate::core::config::GraphRagConfig;
use crate::core::extract::{EntityResolver, RelationshipExtractor};
use crate::core::model::{Embedder, Reasoner};
use crate::core::store::{connect_with_retry, GraphStore, MentionedEntity};
use crate::core::types::{
    CommunityAlgorithm, CommunityDetectionResult, Document, IngestResult, ScoredDocument,
    SearchMode,
};
use crate::core::vector::{cosine_similarity, unit_score};
use futures::future::join_all;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};


/// Per-query overrides for [`GraphRagEngine::retrieve`]. Any field left
/// unset falls back to the engine configuration.
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    /// Which retrieval strategy to run.
    pub mode: SearchMode,
    /// Result count override.
    pub limit: Option<usize>,
    /// Similarity threshold override (vector and hybrid modes).
    pub threshold: Option<f32>,
    /// Traversal depth override (graph and hybrid modes).
    pub max_hops: Option<usize>,
    /// Vector fusion weight override (hybrid mode).
    pub vector_weight: Option<f32>,
    /// Graph fusion weight override (hybrid mode).
    pub graph_weight: Option<f32>,
}

impl RetrieveOptions {
    /// Options for the given mode with no overrides.
    #[must_use]
    pub const fn new(mode: SearchMode) -> Self {
        Self {
            mode,
            limit: None,
            threshold: None,
            max_hops: None,
            vector_weight: None,
            graph_weight: None,
        }
    }

    /// Overrides the result count.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Overrides the similarity threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Overrides the traversal depth.
    #[must_use]
    pub const fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = Some(max_hops);
        self
    }

    /// Overrides both hybrid fusion weights.
    #[must_use]
    pub const fn with_fusion_weights(mut self, vector_weight: f32, graph_weight: f32) -> Self {
        self.vector_weight = Some(vector_weight);
        self.graph_weight = Some(graph_weight);
        self
    }
}

struct Inner {
    config: GraphRagConfig,
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    reasoner: Arc<dyn Reasoner>,
    resolver: EntityResolver,
    relationships: RelationshipExtractor,
    /// Set once a community detection run has completed; gates global mode.
    communities_ready: AtomicBool,
    /// Set by the first successful ingestion batch.
    ingested_once: AtomicBool,
}

/// Graph-augmented retrieval engine over a [`GraphStore`], an [`Embedder`],
/// and a [`Reasoner`]. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct GraphRagEngine {
    inner: Arc<Inner>,
}

impl fmt::Debug for GraphRagEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphRagEngine")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl GraphRagEngine {
    /// Returns a builder for wiring up the engine's collaborators.
    #[must_use]
    pub fn builder() -> GraphRagEngineBuilder {
        GraphRagEngineBuilder::default()
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &GraphRagConfig {
        &self.inner.config
    }

    /// Whether a community detection run has completed since startup.
    #[must_use]
    pub fn communities_detected(&self) -> bool {
        self.inner.communities_ready.load(AtomicOrdering::SeqCst)
    }

    /// Ingests a batch of documents: embeds each one, resolves its entities
    /// and relationships through the reasoner, and persists everything.
    ///
    /// Documents are processed concurrently under the configured extraction
    /// concurrency ceiling. Each document is persisted before its extraction
    /// passes, so a failed entity pass degrades it to vector-only retrieval
    /// and a failed relationship pass to entities-only; only embedding or
    /// storage failures fail the document itself, and those isolate to it —
    /// the rest of the batch continues and the failure is reported in the
    /// result.
    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<IngestResult> {
        let semaphore = Arc::new(Semaphore::new(self.inner.config.extraction_concurrency));

        let tasks = documents.into_iter().map(|document| {
            let inner = Arc::clone(&self.inner);
            let semaphore = Arc::clone(&semaphore);
            async move {
                let id = document.id.clone();
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Err(format!("{id}: ingestion semaphore closed"));
                };
                inner.ingest_one(document).await.map_err(|err| format!("{id}: {err}"))
            }
        });

        let mut result = IngestResult::default();
        for outcome in join_all(tasks).await {
            match outcome {
                Ok(()) => result.added += 1,
                Err(message) => {
                    warn!("document ingestion failed: {message}");
                    result.failed += 1;
                    result.errors.push(message);
                }
            }
        }
        info!(added = result.added, failed = result.failed, "document batch ingested");

        if result.added > 0
            && self.inner.config.auto_detect_communities
            && !self.inner.ingested_once.swap(true, AtomicOrdering::SeqCst)
        {
            let engine = self.clone();
            tokio::spawn(async move {
                if let Err(err) = engine.detect_communities(CommunityAlgorithm::default()).await {
                    error!("background community detection failed: {err}");
                }
            });
        }

        Ok(result)
    }

    /// Deletes documents by id, along with their mention edges.
    pub async fn delete_documents(&self, ids: &[String]) -> Result<()> {
        self.inner.store.delete_documents(ids).await
    }

    /// Deletes every chunk of one source document.
    pub async fn delete_by_source(&self, source_doc_id: &str) -> Result<()> {
        self.inner.store.delete_by_source(source_doc_id).await
    }

    /// Retrieves documents for a query using the strategy in `options`.
    ///
    /// Scores are always within `[0, 1]` and results are ordered best-first.
    /// Global mode requires a completed [`Self::detect_communities`] run and
    /// fails before doing any I/O otherwise.
    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> Result<Vec<ScoredDocument>> {
        if options.mode == SearchMode::Global && !self.communities_detected() {
            return Err(RagError::ModeNotSupported(
                "global mode requires a completed community detection run; \
                 call detect_communities first"
                    .to_string(),
            ));
        }
        let limit = options.limit.unwrap_or(self.inner.config.default_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.inner.embedder.embed(query).await?;
        let threshold = options.threshold.or(self.inner.config.similarity_threshold);
        let max_hops = options.max_hops.unwrap_or(self.inner.config.max_hops);

        match options.mode {
            SearchMode::Vector => {
                self.inner.vector_search(&query_embedding, limit, threshold).await
            }
            SearchMode::Graph => self.inner.graph_search(&query_embedding, limit, max_hops).await,
            SearchMode::Hybrid => {
                let vector_weight =
                    options.vector_weight.unwrap_or(self.inner.config.vector_weight);
                let graph_weight = options.graph_weight.unwrap_or(self.inner.config.graph_weight);
                self.inner
                    .hybrid_search(
                        &query_embedding,
                        limit,
                        threshold,
                        max_hops,
                        vector_weight,
                        graph_weight,
                    )
                    .await
            }
            SearchMode::Global => self.inner.global_search(&query_embedding, limit).await,
        }
    }

    /// Detects communities over the stored entity graph and persists them,
    /// replacing any previous run's output. Unblocks global mode.
    pub async fn detect_communities(
        &self,
        algorithm: CommunityAlgorithm,
    ) -> Result<CommunityDetectionResult> {
        let entities = self.inner.store.all_entities().await?;
        let relationships = self.inner.store.all_relationships().await?;

        let communities = build_communities(
            Arc::clone(&self.inner.reasoner),
            Arc::clone(&self.inner.embedder),
            &entities,
            &relationships,
            algorithm,
            &DetectorConfig::default(),
            self.inner.config.extraction_concurrency,
        )
        .await?;

        self.inner.store.add_communities(&communities).await?;
        self.inner.communities_ready.store(true, AtomicOrdering::SeqCst);

        let level_count =
            communities.iter().map(|c| c.level as usize + 1).max().unwrap_or(0);
        Ok(CommunityDetectionResult {
            community_count: communities.len(),
            level_count,
            algorithm,
        })
    }
}

impl Inner {
    /// Full ingestion of one document: embed, persist, then the entity and
    /// relationship passes.
    async fn ingest_one(&self, mut document: Document) -> Result<()> {
        if document.embedding.is_none() {
            document.embedding = Some(self.embedder.embed(&document.content).await?);
        }
        self.store.add_documents(std::slice::from_ref(&document)).await?;

        // The document is already stored, so an entity-pass failure only
        // skips this chunk's graph contribution.
        let resolved = match self.resolver.resolve_chunk(&document.content).await {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(
                    document_id = %document.id,
                    "entity extraction failed, document kept without graph data: {err}"
                );
                return Ok(());
            }
        };

        let texts: Vec<String> =
            resolved.iter().map(|r| r.entity.embedding_text()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        let mentioned: Vec<MentionedEntity> = resolved
            .into_iter()
            .zip(embeddings)
            .map(|(resolved, embedding)| MentionedEntity {
                entity: resolved.entity.with_embedding(embedding),
                mentions: resolved.mentions,
            })
            .collect();

        self.store.add_entities(&mentioned, &document.id).await?;

        // The relationship pass degrades gracefully: its failure leaves the
        // document ingested with entities but no edges.
        let names: Vec<String> =
            mentioned.iter().map(|m| m.entity.name.clone()).collect();
        match self.relationships.extract_chunk(&document.content, &names).await {
            Ok(relationships) if !relationships.is_empty() => {
                if let Err(err) = self.store.add_relationships(&relationships).await {
                    warn!(document_id = %document.id, "failed to store relationships: {err}");
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(document_id = %document.id, "relationship extraction failed: {err}");
            }
        }
        Ok(())
    }

    async fn vector_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<ScoredDocument>> {
        self.store.search_documents(query_embedding, limit, threshold).await
    }

    /// Graph mode: seed entities by similarity, traverse the relationship
    /// graph, score structurally by hop distance with an optional content
    /// blend. Ties break toward fewer hops, then more mentions.
    async fn graph_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        max_hops: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let seeds =
            self.store.search_entities(query_embedding, self.config.seed_entity_limit).await?;
        if seeds.is_empty() {
            return Ok(Vec::new());
        }
        let seed_names: Vec<String> = seeds.into_iter().map(|s| s.entity.name).collect();
        let hits = self.store.graph_traverse(&seed_names, max_hops).await?;

        let content_weight = self.config.graph_content_weight;
        let mut scored: Vec<(ScoredDocument, usize, u64)> = hits
            .into_iter()
            .map(|hit| {
                let structural = 1.0 / (hit.hops as f32 + 1.0);
                let score = if content_weight > 0.0 {
                    let content = hit
                        .document
                        .embedding
                        .as_deref()
                        .and_then(|e| cosine_similarity(query_embedding, e).ok())
                        .map_or(0.0, unit_score);
                    unit_score((1.0 - content_weight) * structural + content_weight * content)
                } else {
                    structural
                };
                (ScoredDocument { document: hit.document, score }, hit.hops, hit.mentions)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.score
                .partial_cmp(&a.0.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| b.2.cmp(&a.2))
        });
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(scored, _, _)| scored).collect())
    }

    /// Hybrid mode: run the vector and graph searches concurrently and fuse
    /// per document as `clamp(vw * vector + gw * graph)`, treating a missing
    /// component as zero.
    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        threshold: Option<f32>,
        max_hops: usize,
        vector_weight: f32,
        graph_weight: f32,
    ) -> Result<Vec<ScoredDocument>> {
        let (vector, graph) = tokio::join!(
            self.vector_search(query_embedding, limit, threshold),
            self.graph_search(query_embedding, limit, max_hops),
        );
        let (vector, graph) = (vector?, graph?);

        let mut fused: HashMap<String, (Document, f32, f32)> = HashMap::new();
        for scored in vector {
            fused.insert(scored.document.id.clone(), (scored.document, scored.score, 0.0));
        }
        for scored in graph {
            match fused.entry(scored.document.id.clone()) {
                Entry::Occupied(mut entry) => entry.get_mut().2 = scored.score,
                Entry::Vacant(entry) => {
                    entry.insert((scored.document, 0.0, scored.score));
                }
            }
        }

        let mut results: Vec<ScoredDocument> = fused
            .into_values()
            .map(|(document, v, g)| ScoredDocument {
                document,
                score: unit_score(vector_weight * v + graph_weight * g),
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        results.truncate(limit);
        Ok(results)
    }

    /// Global mode: find the most relevant communities, gather documents
    /// mentioning their member entities, and score each candidate as
    /// `0.6 * vector + 0.2 * community + 0.1 * coverage + 0.1 * mentions`,
    /// where the community term is the document's matched entity weights
    /// summed and normalized by the selection size and the strongest weight.
    ///
    /// Candidates are oversampled to twice the limit by vector similarity
    /// before the full scoring pass. An empty result set falls back to plain
    /// vector search so a sparse community structure never blanks a query.
    async fn global_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let communities = self
            .store
            .search_communities(
                query_embedding,
                self.config.min_community_level,
                self.config.community_limit,
            )
            .await?;

        // Best community score per selected entity, insertion-ordered.
        let mut entity_weight: HashMap<String, f32> = HashMap::new();
        let mut selected: Vec<String> = Vec::new();
        for scored in &communities {
            for name in scored
                .community
                .entity_names
                .iter()
                .take(self.config.max_entities_per_community)
            {
                match entity_weight.entry(name.clone()) {
                    Entry::Occupied(mut entry) => {
                        let best = entry.get_mut();
                        *best = best.max(scored.score);
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(scored.score);
                        selected.push(name.clone());
                    }
                }
            }
        }

        if selected.is_empty() {
            warn!("global retrieval found no usable communities, falling back to vector search");
            return self.vector_search(query_embedding, limit, None).await;
        }
        let max_weight = entity_weight.values().fold(0.0_f32, |best, &w| best.max(w));

        let hits = self.store.documents_for_entities(&selected).await?;
        let mut candidates: Vec<(crate::core::store::MentionHit, f32)> = hits
            .into_iter()
            .map(|hit| {
                let vector_sim = hit
                    .document
                    .embedding
                    .as_deref()
                    .and_then(|e| cosine_similarity(query_embedding, e).ok())
                    .map_or(0.0, unit_score);
                (hit, vector_sim)
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.document.id.cmp(&b.0.document.id))
        });
        candidates.truncate(limit * 2);

        let mention_denominator = 10.0_f32.ln_1p();
        let mut results: Vec<ScoredDocument> = candidates
            .into_iter()
            .map(|(hit, vector_sim)| {
                let matched_weight: f32 = hit
                    .entity_names
                    .iter()
                    .filter_map(|name| entity_weight.get(name))
                    .sum();
                let community_weight =
                    normalized_community_weight(matched_weight, selected.len(), max_weight);
                let coverage = hit.entity_names.len() as f32 / selected.len() as f32;
                let mention_term =
                    ((hit.total_mentions as f32).ln_1p() / mention_denominator).min(1.0);
                let score = unit_score(
                    0.6 * vector_sim
                        + 0.2 * community_weight
                        + 0.1 * coverage.min(1.0)
                        + 0.1 * mention_term,
                );
                ScoredDocument { document: hit.document, score }
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        results.truncate(limit);

        if results.is_empty() {
            warn!("global retrieval matched no documents, falling back to vector search");
            return self.vector_search(query_embedding, limit, None).await;
        }
        Ok(results)
    }
}

/// Community term of the global-mode score: the sum of the document's
/// matched entity weights over `selected_count * max_weight`, so one strong
/// entity match out of a large selection contributes proportionally instead
/// of dominating.
fn normalized_community_weight(
    matched_weight: f32,
    selected_count: usize,
    max_weight: f32,
) -> f32 {
    if selected_count == 0 || max_weight <= 0.0 {
        return 0.0;
    }
    (matched_weight / (selected_count as f32 * max_weight)).clamp(0.0, 1.0)
}

/// Builder for [`GraphRagEngine`]. Collaborators are required; building
/// validates the configuration, checks the embedder dimension against it,
/// and establishes the store connection with retries.
#[derive(Default)]
pub struct GraphRagEngineBuilder {
    config: Option<GraphRagConfig>,
    store: Option<Arc<dyn GraphStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    reasoner: Option<Arc<dyn Reasoner>>,
}

impl GraphRagEngineBuilder {
    /// Sets the engine configuration; defaults apply when omitted.
    #[must_use]
    pub fn config(mut self, config: GraphRagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the graph store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Sets the reasoning model.
    #[must_use]
    pub fn reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    /// Builds the engine and connects to the store.
    pub async fn build(self) -> Result<GraphRagEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let store = self
            .store
            .ok_or_else(|| RagError::Configuration("a graph store is required".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| RagError::Configuration("an embedder is required".to_string()))?;
        let reasoner = self
            .reasoner
            .ok_or_else(|| RagError::Configuration("a reasoner is required".to_string()))?;

        if embedder.dimension() != config.vector_dimension {
            return Err(RagError::Configuration(format!(
                "embedder dimension {} does not match configured vector_dimension {}",
                embedder.dimension(),
                config.vector_dimension
            )));
        }

        connect_with_retry(
            store.as_ref(),
            config.connect_max_retries,
            config.connect_base_delay_ms,
        )
        .await?;

        let resolver = EntityResolver::new(Arc::clone(&reasoner), config.gleaning_rounds);
        let relationships = RelationshipExtractor::new(Arc::clone(&reasoner));
        Ok(GraphRagEngine {
            inner: Arc::new(Inner {
                config,
                store,
                embedder,
                reasoner,
                resolver,
                relationships,
                communities_ready: AtomicBool::new(false),
                ingested_once: AtomicBool::new(false),
            }),
        })
    }
}
