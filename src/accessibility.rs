//! Travel time to the nearest grocery-flagged node.
//!
//! One multi-source Dijkstra over travel-time weights, seeded from every
//! grocery node, gives each node its minimum travel time from any grocery.
//! Paths follow edge direction (source → node).
//!
//! A grocery node's own distance is trivially zero, which says nothing about
//! access. Each grocery node is therefore re-scored with the travel time to
//! the nearest *other* grocery node. A grocery node that reaches no other
//! grocery node is "isolated"; what it ends up with is decided by
//! [`IsolatedSourcePolicy`] and it is always listed in the report.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::model::{NodeId, StreetGraph};
use crate::{Error, Result};

/// Value given to a grocery node with no reachable other grocery node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolatedSourcePolicy {
    /// Keep the self-distance (zero).
    #[default]
    KeepSelfDistance,
    /// Report the node's travel time as missing.
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityReport {
    /// Grocery-flagged nodes used as sources.
    pub sources: usize,
    /// Nodes with a defined travel time.
    pub reached: usize,
    /// Nodes no grocery node can reach.
    pub unreachable: usize,
    /// Grocery nodes with no reachable other grocery node.
    pub isolated_sources: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct State {
    cost: f64,
    node: usize,
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on cost, then node index for determinism
        other.cost.total_cmp(&self.cost).then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest travel time from the nearest of `sources` to every node.
/// `None` where no source reaches the node.
pub fn multi_source_dijkstra(graph: &StreetGraph, sources: &[usize]) -> Vec<Option<f64>> {
    let mut dist: Vec<Option<f64>> = vec![None; graph.node_count()];
    let mut heap = BinaryHeap::new();
    for &s in sources {
        dist[s] = Some(0.0);
        heap.push(State { cost: 0.0, node: s });
    }

    while let Some(State { cost, node }) = heap.pop() {
        if dist[node].is_some_and(|d| cost > d) {
            continue;
        }
        relax(graph, node, cost, &mut dist, &mut heap);
    }
    dist
}

/// Shortest travel time from `source` to every node.
pub fn single_source_dijkstra(graph: &StreetGraph, source: usize) -> Vec<Option<f64>> {
    multi_source_dijkstra(graph, &[source])
}

/// Travel time from `source` to the closest node in `targets` other than
/// itself. Stops at the first such node settled.
fn nearest_other(graph: &StreetGraph, source: usize, targets: &[bool]) -> Option<f64> {
    let mut dist: Vec<Option<f64>> = vec![None; graph.node_count()];
    let mut heap = BinaryHeap::new();
    dist[source] = Some(0.0);
    heap.push(State { cost: 0.0, node: source });

    while let Some(State { cost, node }) = heap.pop() {
        if dist[node].is_some_and(|d| cost > d) {
            continue;
        }
        if node != source && targets[node] {
            return Some(cost);
        }
        relax(graph, node, cost, &mut dist, &mut heap);
    }
    None
}

fn relax(
    graph: &StreetGraph,
    node: usize,
    cost: f64,
    dist: &mut [Option<f64>],
    heap: &mut BinaryHeap<State>,
) {
    for &e in graph.out_edges(node) {
        let (_, next) = graph.endpoints(e);
        let candidate = cost + graph.edges()[e].travel_time;
        if dist[next].is_none_or(|d| candidate < d) {
            dist[next] = Some(candidate);
            heap.push(State { cost: candidate, node: next });
        }
    }
}

/// Attach `nearest_grocery_time` to every node.
///
/// Errors with `DegenerateGraph` when no node is grocery-flagged.
pub fn add_grocery_travel_time(
    graph: &mut StreetGraph,
    policy: IsolatedSourcePolicy,
) -> Result<AccessibilityReport> {
    let sources = graph.grocery_indices();
    if sources.is_empty() {
        return Err(Error::DegenerateGraph(
            "no grocery-flagged nodes; nearest grocery travel time is undefined".into(),
        ));
    }

    let mut times = multi_source_dijkstra(graph, &sources);

    let mut is_source = vec![false; graph.node_count()];
    for &s in &sources {
        is_source[s] = true;
    }

    let mut isolated = Vec::new();
    for &s in &sources {
        match nearest_other(graph, s, &is_source) {
            Some(t) => times[s] = Some(t),
            None => {
                isolated.push(graph.node_at(s).id);
                if policy == IsolatedSourcePolicy::Missing {
                    times[s] = None;
                }
            }
        }
    }
    if !isolated.is_empty() {
        tracing::warn!(
            isolated = isolated.len(),
            ?policy,
            "grocery nodes with no reachable other grocery node"
        );
    }

    for (node, time) in graph.nodes_mut().zip(&times) {
        node.nearest_grocery_time = *time;
    }

    let reached = times.iter().filter(|t| t.is_some()).count();
    Ok(AccessibilityReport {
        sources: sources.len(),
        reached,
        unreachable: times.len() - reached,
        isolated_sources: isolated,
    })
}
