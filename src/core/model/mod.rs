// src/core/model/mod.rs

//! External model seams: the embedding and reasoning contracts plus the
//! shipped implementations (HTTP clients and a deterministic hash embedder).

mod hash;
mod http;

pub use hash::HashEmbedder;
pub use http::{HttpEmbedder, HttpReasoner};

use crate::core::common::Result;
use async_trait::async_trait;

/// Trait for models that turn text into fixed-dimensional vectors.
///
/// Embedders are pure functions from the engine's perspective: the same
/// content must always yield the same vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Output dimensionality, declared at construction.
    fn dimension(&self) -> usize;

    /// Generates an embedding for a text string.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for a batch of texts.
    /// Default implementation calls `embed` for each text; implementers can
    /// override this for batch-optimized requests.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}

/// Trait for reasoning models that produce structured records from text.
///
/// The prompt carries the extraction schema; the returned string is parsed
/// and validated at the extraction boundary, where malformed records are
/// dropped rather than propagated.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Runs one extraction prompt and returns the raw model output.
    async fn extract(&self, prompt: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UpperReasoner;

    #[async_trait]
    impl Reasoner for UpperReasoner {
        async fn extract(&self, prompt: &str) -> Result<String> {
            Ok(prompt.to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_embed_batch_default_delegates_to_embed() {
        let embedder = HashEmbedder::new(16);
        let texts = vec!["first text".to_string(), "second text".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("first text").await.unwrap());
        assert_eq!(batch[1], embedder.embed("second text").await.unwrap());
    }

    #[tokio::test]
    async fn test_reasoner_trait_object() {
        let reasoner: Box<dyn Reasoner> = Box::new(UpperReasoner);
        assert_eq!(reasoner.extract("abc").await.unwrap(), "ABC");
    }
}
