// src/core/model/hash.rs

//! Deterministic, dependency-free embedder for offline use, demos, and tests.

use crate::core::common::Result;
use crate::core::model::Embedder;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Token-hash feature embedder.
///
/// Tokens are lowercased alphanumeric runs hashed into fixed buckets; the
/// resulting count vector is L2-normalized, so equal content always yields
/// an identical unit vector and token overlap raises cosine similarity.
/// Not a semantic model; it exists so the engine can run without network
/// access.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Creates an embedder with the given output dimensionality (floored
    /// at 1).
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1)
            .map(String::from)
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn bucket(&self, token: &str) -> usize {
        // DefaultHasher with default keys is deterministic across runs.
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.dimension
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut features = vec![0.0_f32; self.dimension];
        for token in Self::tokens(text) {
            features[self.bucket(&token)] += 1.0;
        }

        let magnitude: f32 = features.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut features {
                *value /= magnitude;
            }
        } else {
            // Token-free content still needs a nonzero vector so cosine
            // similarity stays defined.
            features[0] = 1.0;
        }

        Ok(features)
    }
}
