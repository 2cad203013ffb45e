// src/core/config.rs

//! Engine configuration: retrieval defaults, extraction knobs, community
//! detection behavior, and the store connection retry policy.

use crate::core::common::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for the retrieval engine.
///
/// All retrieval knobs here are defaults; individual `retrieve` calls may
/// override them per query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphRagConfig {
    /// Fixed dimensionality of every stored vector. Must match the embedder.
    pub vector_dimension: usize,
    /// Minimum score results must reach; `None` disables the filter.
    pub similarity_threshold: Option<f32>,
    /// Default number of results a retrieval returns.
    pub default_limit: usize,
    /// Default traversal depth for graph mode.
    pub max_hops: usize,
    /// Number of seed entities graph mode starts its traversal from.
    pub seed_entity_limit: usize,
    /// Weight of the vector score in hybrid fusion, in `[0, 1]`.
    pub vector_weight: f32,
    /// Weight of the graph score in hybrid fusion, in `[0, 1]`.
    pub graph_weight: f32,
    /// Number of communities global mode consults.
    pub community_limit: usize,
    /// Member entities taken from each community in global mode.
    pub max_entities_per_community: usize,
    /// Minimum community level considered by global mode.
    pub min_community_level: u32,
    /// Extra extraction passes per chunk beyond the first.
    pub gleaning_rounds: usize,
    /// Concurrency ceiling for extraction and summarization calls.
    pub extraction_concurrency: usize,
    /// Whether the first ingestion schedules one background detection run.
    pub auto_detect_communities: bool,
    /// Content weight blended into graph-mode scoring, in `[0, 1]`.
    ///
    /// At 0.0 graph mode scores purely structurally (`1 / (hops + 1)`), which
    /// keeps it differentiated from the content-weighted modes at the cost of
    /// occasionally surfacing structurally-close but off-topic documents.
    /// Whether that asymmetry is the right call is an open question in the
    /// source material; this knob preserves it as an explicit trade-off.
    pub graph_content_weight: f32,
    /// Connection attempts beyond the first before giving up.
    pub connect_max_retries: u32,
    /// Base backoff delay between connection attempts; doubles per attempt.
    pub connect_base_delay_ms: u64,
}

impl Default for GraphRagConfig {
    fn default() -> Self {
        Self {
            vector_dimension: 384,
            similarity_threshold: None,
            default_limit: 5,
            max_hops: 2,
            seed_entity_limit: 5,
            vector_weight: 0.5,
            graph_weight: 0.5,
            community_limit: 5,
            max_entities_per_community: 10,
            min_community_level: 0,
            gleaning_rounds: 1,
            extraction_concurrency: 5,
            auto_detect_communities: false,
            graph_content_weight: 0.0,
            connect_max_retries: 3,
            connect_base_delay_ms: 1000,
        }
    }
}

impl GraphRagConfig {
    /// Returns a builder initialized with defaults.
    #[must_use]
    pub fn builder() -> GraphRagConfigBuilder {
        GraphRagConfigBuilder::new()
    }

    /// Validates field ranges.
    pub fn validate(&self) -> Result<()> {
        if self.vector_dimension == 0 {
            return Err(RagError::Configuration("vector_dimension must be > 0".to_string()));
        }
        if self.default_limit == 0 {
            return Err(RagError::Configuration("default_limit must be > 0".to_string()));
        }
        if self.extraction_concurrency == 0 {
            return Err(RagError::Configuration("extraction_concurrency must be > 0".to_string()));
        }
        for (name, value) in [
            ("vector_weight", self.vector_weight),
            ("graph_weight", self.graph_weight),
            ("graph_content_weight", self.graph_content_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RagError::Configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if let Some(threshold) = self.similarity_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(RagError::Configuration(format!(
                    "similarity_threshold must be within [0, 1], got {threshold}"
                )));
            }
        }
        Ok(())
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&contents).map_err(|e| {
            RagError::Configuration(format!(
                "failed to parse {}: {e}",
                path.as_ref().display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Builder for [`GraphRagConfig`].
#[derive(Debug, Clone, Default)]
pub struct GraphRagConfigBuilder {
    config: GraphRagConfig,
}

impl GraphRagConfigBuilder {
    /// Creates a builder initialized with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the vector dimensionality.
    #[must_use]
    pub const fn vector_dimension(mut self, dimension: usize) -> Self {
        self.config.vector_dimension = dimension;
        self
    }

    /// Sets the default similarity threshold.
    #[must_use]
    pub const fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Sets the default result limit.
    #[must_use]
    pub const fn default_limit(mut self, limit: usize) -> Self {
        self.config.default_limit = limit;
        self
    }

    /// Sets the default graph-mode traversal depth.
    #[must_use]
    pub const fn max_hops(mut self, hops: usize) -> Self {
        self.config.max_hops = hops;
        self
    }

    /// Sets the number of graph-mode seed entities.
    #[must_use]
    pub const fn seed_entity_limit(mut self, limit: usize) -> Self {
        self.config.seed_entity_limit = limit;
        self
    }

    /// Sets the hybrid fusion weights.
    #[must_use]
    pub const fn fusion_weights(mut self, vector_weight: f32, graph_weight: f32) -> Self {
        self.config.vector_weight = vector_weight;
        self.config.graph_weight = graph_weight;
        self
    }

    /// Sets the number of communities global mode consults.
    #[must_use]
    pub const fn community_limit(mut self, limit: usize) -> Self {
        self.config.community_limit = limit;
        self
    }

    /// Sets the per-community entity cap for global mode.
    #[must_use]
    pub const fn max_entities_per_community(mut self, max: usize) -> Self {
        self.config.max_entities_per_community = max;
        self
    }

    /// Sets the minimum community level for global mode.
    #[must_use]
    pub const fn min_community_level(mut self, level: u32) -> Self {
        self.config.min_community_level = level;
        self
    }

    /// Sets the number of extra extraction passes per chunk.
    #[must_use]
    pub const fn gleaning_rounds(mut self, rounds: usize) -> Self {
        self.config.gleaning_rounds = rounds;
        self
    }

    /// Sets the extraction concurrency ceiling.
    #[must_use]
    pub const fn extraction_concurrency(mut self, permits: usize) -> Self {
        self.config.extraction_concurrency = permits;
        self
    }

    /// Enables or disables the first-ingest background detection run.
    #[must_use]
    pub const fn auto_detect_communities(mut self, enabled: bool) -> Self {
        self.config.auto_detect_communities = enabled;
        self
    }

    /// Sets the content weight blended into graph-mode scoring.
    #[must_use]
    pub const fn graph_content_weight(mut self, weight: f32) -> Self {
        self.config.graph_content_weight = weight;
        self
    }

    /// Sets the connection retry policy.
    #[must_use]
    pub const fn connect_retry(mut self, max_retries: u32, base_delay_ms: u64) -> Self {
        self.config.connect_max_retries = max_retries;
        self.config.connect_base_delay_ms = base_delay_ms;
        self
    }

    /// Builds the configuration, validating field ranges.
    pub fn build(self) -> Result<GraphRagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = GraphRagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_limit, 5);
        assert_eq!(config.max_hops, 2);
        assert_eq!(config.vector_weight, 0.5);
        assert_eq!(config.graph_content_weight, 0.0);
        assert!(!config.auto_detect_communities);
    }

    #[test]
    fn test_builder_overrides() {
        let config = GraphRagConfig::builder()
            .vector_dimension(256)
            .fusion_weights(0.7, 0.3)
            .gleaning_rounds(2)
            .auto_detect_communities(true)
            .build()
            .unwrap();
        assert_eq!(config.vector_dimension, 256);
        assert_eq!(config.vector_weight, 0.7);
        assert_eq!(config.graph_weight, 0.3);
        assert_eq!(config.gleaning_rounds, 2);
        assert!(config.auto_detect_communities);
    }

    #[test]
    fn test_invalid_fields_rejected() {
        assert!(GraphRagConfig::builder().vector_dimension(0).build().is_err());
        assert!(GraphRagConfig::builder().fusion_weights(1.5, 0.5).build().is_err());
        assert!(GraphRagConfig::builder().graph_content_weight(-0.1).build().is_err());
        assert!(GraphRagConfig::builder().extraction_concurrency(0).build().is_err());
        assert!(GraphRagConfig::builder().similarity_threshold(2.0).build().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "vector_dimension = 128\nmax_hops = 3\nvector_weight = 0.6\ngraph_weight = 0.4"
        )
        .unwrap();

        let config = GraphRagConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.vector_dimension, 128);
        assert_eq!(config.max_hops, 3);
        assert_eq!(config.vector_weight, 0.6);
        // Unspecified fields keep their defaults.
        assert_eq!(config.default_limit, 5);
    }

    #[test]
    fn test_load_malformed_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "vector_dimension = \"not a number\"").unwrap();

        match GraphRagConfig::load_from_file(file.path()) {
            Err(RagError::Configuration(_)) => {}
            other => panic!("expected Configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = GraphRagConfig::load_or_default("/nonexistent/oxirag.toml").unwrap();
        assert_eq!(config, GraphRagConfig::default());
    }
}
