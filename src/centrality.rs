//! PageRank over the street graph.
//!
//! Power iteration on the directed multigraph. Every edge carries weight 1,
//! so parallel `u → v` edges add up. Nodes with no outgoing edges spread
//! their rank uniformly over all nodes. Iteration stops once the L1 change
//! between rounds drops below `node_count × tolerance`.

use serde::{Deserialize, Serialize};

use crate::model::StreetGraph;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CentralityConfig {
    pub damping: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for CentralityConfig {
    fn default() -> Self {
        Self { damping: 0.85, tolerance: 1e-6, max_iterations: 100 }
    }
}

impl CentralityConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.damping > 0.0 && self.damping < 1.0) {
            return Err(Error::Config(format!("damping must be in (0, 1), got {}", self.damping)));
        }
        if !(self.tolerance > 0.0) {
            return Err(Error::Config(format!("tolerance must be positive, got {}", self.tolerance)));
        }
        if self.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be at least 1".into()));
        }
        Ok(())
    }
}

/// Score every node. Scores sum to 1.
pub fn compute(graph: &StreetGraph, config: &CentralityConfig) -> Result<Vec<f64>> {
    let count = graph.node_count();
    if count == 0 {
        return Ok(Vec::new());
    }

    let n = count as f64;
    let out_degree: Vec<f64> = (0..count).map(|i| graph.out_edges(i).len() as f64).collect();
    let mut ranks = vec![1.0 / n; count];

    for iteration in 1..=config.max_iterations {
        let next = iterate_once(graph, &ranks, &out_degree, config.damping, n);
        let delta: f64 = next.iter().zip(&ranks).map(|(a, b)| (a - b).abs()).sum();
        ranks = next;
        if delta < n * config.tolerance {
            tracing::debug!(iteration, delta, "pagerank converged");
            normalize(&mut ranks);
            return Ok(ranks);
        }
    }
    Err(Error::Convergence { iterations: config.max_iterations })
}

fn iterate_once(graph: &StreetGraph, ranks: &[f64], out_degree: &[f64], damping: f64, n: f64) -> Vec<f64> {
    let dangling: f64 = ranks
        .iter()
        .zip(out_degree)
        .filter(|(_, d)| **d == 0.0)
        .map(|(r, _)| r)
        .sum();
    let base = (1.0 - damping) / n + damping * dangling / n;

    let mut next = vec![base; ranks.len()];
    for e in 0..graph.edge_count() {
        let (u, v) = graph.endpoints(e);
        next[v] += damping * ranks[u] / out_degree[u];
    }
    next
}

fn normalize(ranks: &mut [f64]) {
    let total: f64 = ranks.iter().sum();
    if total > 0.0 {
        for rank in ranks.iter_mut() {
            *rank /= total;
        }
    }
}

/// Attach `pagerank` to every node.
pub fn add_pagerank(graph: &mut StreetGraph, config: &CentralityConfig) -> Result<()> {
    let ranks = compute(graph, config)?;
    for (node, rank) in graph.nodes_mut().zip(ranks) {
        node.pagerank = Some(rank);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeId, StreetNode};
    use geo::Point;

    fn graph(nodes: u64, edges: &[(u64, u64)]) -> StreetGraph {
        let mut g = StreetGraph::new();
        for i in 0..nodes {
            g.add_node(StreetNode::new(NodeId(i), Point::new(i as f64, 0.0))).unwrap();
        }
        for &(u, v) in edges {
            g.add_edge(NodeId(u), NodeId(v), 1.0, 1.0).unwrap();
        }
        g
    }

    #[test]
    fn test_symmetric_cycle_is_uniform() {
        let mut g = graph(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]);
        add_pagerank(&mut g, &CentralityConfig::default()).unwrap();
        for node in g.nodes() {
            assert!((node.pagerank.unwrap() - 0.25).abs() < 1e-9);
        }
    }

    #[test]
    fn test_scores_sum_to_one_with_dangling_node() {
        // 2 has no out-edges
        let g = graph(3, &[(0, 1), (1, 2), (0, 2)]);
        let ranks = compute(&g, &CentralityConfig::default()).unwrap();
        assert!((ranks.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(ranks[2] > ranks[1] && ranks[1] > ranks[0]);
    }

    #[test]
    fn test_parallel_edges_add_weight() {
        // 0 sends two edges to 1, one to 2
        let g = graph(3, &[(0, 1), (0, 1), (0, 2), (1, 0), (2, 0)]);
        let ranks = compute(&g, &CentralityConfig::default()).unwrap();
        assert!(ranks[1] > ranks[2]);
    }

    #[test]
    fn test_no_convergence_is_error() {
        let g = graph(3, &[(0, 1), (1, 2)]);
        let config = CentralityConfig { tolerance: 1e-300, max_iterations: 2, ..Default::default() };
        assert!(matches!(compute(&g, &config), Err(Error::Convergence { iterations: 2 })));
    }

    #[test]
    fn test_empty_graph_has_no_scores() {
        assert!(compute(&StreetGraph::new(), &CentralityConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_damping() {
        let config = CentralityConfig { damping: 1.0, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
