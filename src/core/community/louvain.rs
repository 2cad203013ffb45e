// src/core/community/louvain.rs

//! Modularity-optimizing "Louvain"-style hierarchical clustering: greedy
//! local moving of nodes followed by aggregation into a coarser graph,
//! repeated while the partition keeps improving.

use crate::core::community::{DetectorConfig, EntityGraph};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use tracing::debug;

/// Working graph for one hierarchy level. Undirected; `adjacency[i]` maps
/// neighbor to edge weight, with intra-community weight accumulating in a
/// self-loop entry during aggregation.
pub(super) struct WorkGraph {
    pub adjacency: Vec<HashMap<usize, f64>>,
    /// Weighted degree per node, self-loops counted twice.
    pub strength: Vec<f64>,
    /// Sum of all strengths (2m in modularity terms).
    pub total: f64,
}

impl WorkGraph {
    pub fn from_entity_graph(graph: &EntityGraph) -> Self {
        let n = graph.node_count();
        let mut adjacency = vec![HashMap::new(); n];
        for node in 0..n {
            for &(neighbor, weight) in graph.neighbors(node) {
                adjacency[node].insert(neighbor, weight);
            }
        }
        Self::from_adjacency(adjacency)
    }

    pub fn from_adjacency(adjacency: Vec<HashMap<usize, f64>>) -> Self {
        let strength: Vec<f64> = adjacency
            .iter()
            .enumerate()
            .map(|(node, edges)| {
                edges
                    .iter()
                    .map(|(&neighbor, &w)| if neighbor == node { 2.0 * w } else { w })
                    .sum()
            })
            .collect();
        let total = strength.iter().sum();
        Self { adjacency, strength, total }
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Collapses the graph so each community becomes one node. `membership`
    /// must use contiguous ids `0..k`.
    pub fn aggregate(&self, membership: &[usize], community_count: usize) -> Self {
        let mut adjacency: Vec<HashMap<usize, f64>> = vec![HashMap::new(); community_count];
        for (node, edges) in self.adjacency.iter().enumerate() {
            for (&neighbor, &weight) in edges {
                // Visit each undirected edge once; keep self-loops.
                if neighbor < node {
                    continue;
                }
                let a = membership[node];
                let b = membership[neighbor];
                if a == b {
                    *adjacency[a].entry(a).or_insert(0.0) += weight;
                } else {
                    *adjacency[a].entry(b).or_insert(0.0) += weight;
                    *adjacency[b].entry(a).or_insert(0.0) += weight;
                }
            }
        }
        Self::from_adjacency(adjacency)
    }
}

/// One greedy local-moving phase. Returns the membership (contiguous ids)
/// and the number of communities.
pub(super) fn local_move(
    graph: &WorkGraph,
    config: &DetectorConfig,
    rng: &mut StdRng,
) -> (Vec<usize>, usize) {
    let n = graph.node_count();
    let mut membership: Vec<usize> = (0..n).collect();
    let mut community_strength: Vec<f64> = graph.strength.clone();

    if graph.total <= 0.0 {
        return (membership, n);
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut improved = true;
    let mut sweeps = 0;

    while improved && sweeps < config.max_iterations {
        improved = false;
        sweeps += 1;
        order.shuffle(rng);

        for &node in &order {
            let current = membership[node];
            let k_node = graph.strength[node];

            // Weight from `node` to each neighboring community.
            let mut to_community: HashMap<usize, f64> = HashMap::new();
            for (&neighbor, &weight) in &graph.adjacency[node] {
                if neighbor != node {
                    *to_community.entry(membership[neighbor]).or_insert(0.0) += weight;
                }
            }

            community_strength[current] -= k_node;
            let stay_gain = to_community.get(&current).copied().unwrap_or(0.0)
                - config.resolution * community_strength[current] * k_node / graph.total;

            let mut best_community = current;
            let mut best_gain = stay_gain;
            for (&candidate, &weight) in &to_community {
                if candidate == current {
                    continue;
                }
                let gain = weight
                    - config.resolution * community_strength[candidate] * k_node / graph.total;
                if gain > best_gain + config.min_improvement {
                    best_gain = gain;
                    best_community = candidate;
                }
            }

            community_strength[best_community] += k_node;
            if best_community != current {
                membership[node] = best_community;
                improved = true;
            }
        }
    }

    let count = renumber(&mut membership);
    debug!(sweeps, communities = count, "local moving finished");
    (membership, count)
}

/// Renumbers membership ids to be contiguous, preserving first-seen order.
/// Returns the community count.
pub(super) fn renumber(membership: &mut [usize]) -> usize {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    for community in membership.iter_mut() {
        let next = mapping.len();
        *community = *mapping.entry(*community).or_insert(next);
    }
    mapping.len()
}

pub(super) fn seeded_rng(config: &DetectorConfig) -> StdRng {
    match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Louvain-family hierarchical community detector.
pub struct LouvainDetector {
    config: DetectorConfig,
}

impl LouvainDetector {
    /// Creates a detector with the given tuning parameters.
    #[must_use]
    pub const fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Produces one membership vector per hierarchy level over the entity
    /// graph's nodes, level 0 (finest) first.
    #[must_use]
    pub fn detect(&self, graph: &EntityGraph) -> Vec<Vec<usize>> {
        let mut rng = seeded_rng(&self.config);
        let mut work = WorkGraph::from_entity_graph(graph);
        // Maps base entity index to its node in the current working graph.
        let mut base_to_node: Vec<usize> = (0..graph.node_count()).collect();
        let mut levels: Vec<Vec<usize>> = Vec::new();

        while levels.len() < self.config.max_levels {
            let (membership, count) = local_move(&work, &self.config, &mut rng);
            let merged = count < work.node_count();

            if !merged && !levels.is_empty() {
                break;
            }

            let level: Vec<usize> =
                base_to_node.iter().map(|&node| membership[node]).collect();
            levels.push(level);

            if !merged {
                break;
            }
            work = work.aggregate(&membership, count);
            for node in &mut base_to_node {
                *node = membership[*node];
            }
        }

        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::community::tests::two_cluster_fixture;

    fn config_with_seed(seed: u64) -> DetectorConfig {
        DetectorConfig { seed: Some(seed), ..DetectorConfig::default() }
    }

    #[test]
    fn test_two_triangles_split_into_two_communities() {
        let (entities, relationships) = two_cluster_fixture();
        let graph = EntityGraph::build(&entities, &relationships);
        let levels = LouvainDetector::new(config_with_seed(42)).detect(&graph);

        assert!(!levels.is_empty());
        let level0 = &levels[0];
        // A1..A3 together, B1..B3 together, in different communities.
        assert_eq!(level0[0], level0[1]);
        assert_eq!(level0[1], level0[2]);
        assert_eq!(level0[3], level0[4]);
        assert_eq!(level0[4], level0[5]);
        assert_ne!(level0[0], level0[3]);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let (entities, relationships) = two_cluster_fixture();
        let graph = EntityGraph::build(&entities, &relationships);
        let first = LouvainDetector::new(config_with_seed(7)).detect(&graph);
        let second = LouvainDetector::new(config_with_seed(7)).detect(&graph);
        assert_eq!(first, second);
    }

    #[test]
    fn test_edgeless_graph_keeps_singletons() {
        let (entities, _) = two_cluster_fixture();
        let graph = EntityGraph::build(&entities, &[]);
        let levels = LouvainDetector::new(config_with_seed(1)).detect(&graph);

        assert_eq!(levels.len(), 1);
        let mut seen = levels[0].clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), graph.node_count());
    }

    #[test]
    fn test_renumber_contiguous() {
        let mut membership = vec![5, 5, 2, 9, 2];
        let count = renumber(&mut membership);
        assert_eq!(count, 3);
        assert_eq!(membership, vec![0, 0, 1, 2, 1]);
    }
}
