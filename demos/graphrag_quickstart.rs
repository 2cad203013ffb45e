// demos/graphrag_quickstart.rs
//
// End-to-end tour of the engine with in-process collaborators: an in-memory
// store, the deterministic hash embedder, and a canned reasoner standing in
// for an external reasoning model. Run with:
//
//     cargo run --example graphrag_quickstart

use async_trait::async_trait;
use oxirag::{
    CommunityAlgorithm, Document, GraphRagConfig, GraphRagEngine, HashEmbedder, MemoryGraphStore,
    RagError, Reasoner, RetrieveOptions, SearchMode,
};
use std::sync::Arc;

const DIM: usize = 384;

/// Stands in for an HTTP reasoner by pattern-matching the prompt family and
/// the document content it carries.
struct CannedReasoner;

#[async_trait]
impl Reasoner for CannedReasoner {
    async fn extract(&self, prompt: &str) -> Result<String, RagError> {
        if prompt.contains("already identified") {
            return Ok(r#"{"entities": []}"#.to_string());
        }
        if prompt.contains("Extract the named entities") {
            if prompt.contains("Alice") {
                return Ok(r#"{"entities": [
                    {"name": "Alice", "type": "PERSON", "description": "a widget engineer"},
                    {"name": "Acme", "type": "ORGANIZATION", "description": "a widget maker"}
                ]}"#
                .to_string());
            }
            if prompt.contains("Springfield") {
                return Ok(r#"{"entities": [
                    {"name": "Acme", "type": "ORGANIZATION", "description": "a widget maker"},
                    {"name": "Springfield", "type": "LOCATION", "description": "a small town"}
                ]}"#
                .to_string());
            }
            if prompt.contains("widget") {
                return Ok(r#"{"entities": [
                    {"name": "Widget", "type": "PRODUCT", "description": "the flagship product"},
                    {"name": "Acme", "type": "ORGANIZATION", "description": "a widget maker"}
                ]}"#
                .to_string());
            }
            return Ok(r#"{"entities": []}"#.to_string());
        }
        if prompt.contains("Extract the relationships") {
            if prompt.contains("Alice") {
                return Ok(r#"{"relationships": [
                    {"source": "Alice", "target": "Acme", "type": "WORKS_AT",
                     "description": "employment", "strength": 0.9}
                ]}"#
                .to_string());
            }
            if prompt.contains("Springfield") {
                return Ok(r#"{"relationships": [
                    {"source": "Acme", "target": "Springfield", "type": "LOCATED_IN",
                     "description": "headquarters", "strength": 0.8}
                ]}"#
                .to_string());
            }
            if prompt.contains("widget") {
                return Ok(r#"{"relationships": [
                    {"source": "Acme", "target": "Widget", "type": "PRODUCES",
                     "description": "manufacturing", "strength": 0.9}
                ]}"#
                .to_string());
            }
            return Ok(r#"{"relationships": []}"#.to_string());
        }
        // Community summarization.
        Ok(r#"{"title": "The Acme story",
               "summary": "Acme, its people, its town, and the widgets it makes."}"#
            .to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = GraphRagConfig::builder().vector_dimension(DIM).build()?;
    let engine = GraphRagEngine::builder()
        .config(config)
        .store(Arc::new(MemoryGraphStore::new(DIM)))
        .embedder(Arc::new(HashEmbedder::new(DIM)))
        .reasoner(Arc::new(CannedReasoner))
        .build()
        .await?;

    let documents = vec![
        Document::new("doc-1", "Alice works at Acme as a senior engineer."),
        Document::new("doc-2", "Acme is headquartered in Springfield."),
        Document::new("doc-3", "The widget is the flagship product of the company."),
    ];
    let ingested = engine.add_documents(documents).await?;
    println!("ingested {} documents ({} failed)", ingested.added, ingested.failed);

    let detection = engine.detect_communities(CommunityAlgorithm::Leiden).await?;
    println!(
        "detected {} communities across {} levels via {}",
        detection.community_count, detection.level_count, detection.algorithm
    );

    let query = "Who builds widgets at Acme?";
    for mode in [SearchMode::Vector, SearchMode::Graph, SearchMode::Hybrid, SearchMode::Global] {
        let results = engine.retrieve(query, &RetrieveOptions::new(mode)).await?;
        println!("\n[{mode}] {query}");
        for scored in results {
            println!("  {:.3}  {}  {}", scored.score, scored.document.id, scored.document.content);
        }
    }

    Ok(())
}
