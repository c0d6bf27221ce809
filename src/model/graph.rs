//! Street graph: an arena-backed directed multigraph.
//!
//! Nodes and edges live in dense `Vec`s addressed by index; `NodeId`s map to
//! indices through a hash index. Every enrichment stage mutates attribute
//! slots in place, so the graph is never flattened and rebuilt between
//! stages.
//!
//! ## Invariants
//!
//! - Node ids are unique and never change after insertion.
//! - Every edge's endpoints exist in the node arena.
//! - Edge travel times are finite and non-negative.

use hashbrown::HashMap;
use smallvec::SmallVec;

use super::{EdgeId, NodeId, StreetEdge, StreetNode};
use crate::{Error, Result};

type Adjacency = SmallVec<[usize; 4]>;

/// Directed multigraph of street nodes and road segments.
#[derive(Debug, Clone, Default)]
pub struct StreetGraph {
    nodes: Vec<StreetNode>,
    edges: Vec<StreetEdge>,
    /// node_id → arena index
    index: HashMap<NodeId, usize>,
    /// edge index → (source index, target index)
    endpoints: Vec<(usize, usize)>,
    /// node index → outgoing edge indices
    outgoing: Vec<Adjacency>,
    /// node index → incoming edge indices
    incoming: Vec<Adjacency>,
}

impl StreetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize { self.nodes.len() }
    pub fn edge_count(&self) -> usize { self.edges.len() }
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Insert a node, returning its arena index.
    pub fn add_node(&mut self, node: StreetNode) -> Result<usize> {
        if self.index.contains_key(&node.id) {
            return Err(Error::InvalidData(format!("Duplicate node {}", node.id)));
        }
        let idx = self.nodes.len();
        self.index.insert(node.id, idx);
        self.nodes.push(node);
        self.outgoing.push(Adjacency::new());
        self.incoming.push(Adjacency::new());
        Ok(idx)
    }

    /// Insert a directed edge `u → v`. The multigraph key is the number of
    /// `u → v` edges that already exist.
    pub fn add_edge(
        &mut self,
        u: NodeId,
        v: NodeId,
        travel_time: f64,
        length: f64,
    ) -> Result<&mut StreetEdge> {
        let src = self.index_of(u).ok_or_else(|| Error::NotFound(format!("Source node {u}")))?;
        let dst = self.index_of(v).ok_or_else(|| Error::NotFound(format!("Target node {v}")))?;
        if !travel_time.is_finite() || travel_time < 0.0 {
            return Err(Error::InvalidData(format!(
                "Edge ({u}, {v}) has invalid travel time {travel_time}"
            )));
        }

        let key = self.outgoing[src]
            .iter()
            .filter(|&&e| self.endpoints[e].1 == dst)
            .count() as u32;

        let edge_idx = self.edges.len();
        self.edges.push(StreetEdge::new(EdgeId { u, v, key }, travel_time, length));
        self.endpoints.push((src, dst));
        self.outgoing[src].push(edge_idx);
        self.incoming[dst].push(edge_idx);

        Ok(&mut self.edges[edge_idx])
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&StreetNode> {
        self.index_of(id).map(|i| &self.nodes[i])
    }

    pub fn node_at(&self, idx: usize) -> &StreetNode {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &[StreetNode] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut StreetNode> {
        self.nodes.iter_mut()
    }

    pub fn edges(&self) -> &[StreetEdge] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> impl Iterator<Item = &mut StreetEdge> {
        self.edges.iter_mut()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&StreetEdge> {
        let src = self.index_of(id.u)?;
        self.outgoing[src]
            .iter()
            .map(|&e| &self.edges[e])
            .find(|e| e.id == id)
    }

    /// (source index, target index) of the edge at `edge_idx`.
    pub fn endpoints(&self, edge_idx: usize) -> (usize, usize) {
        self.endpoints[edge_idx]
    }

    /// Outgoing edge indices of the node at `idx`.
    pub fn out_edges(&self, idx: usize) -> &[usize] {
        &self.outgoing[idx]
    }

    /// Incoming edge indices of the node at `idx`.
    pub fn in_edges(&self, idx: usize) -> &[usize] {
        &self.incoming[idx]
    }

    /// Arena indices of every grocery-flagged node, in insertion order.
    pub fn grocery_indices(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.grocery)
            .map(|(i, _)| i)
            .collect()
    }
}
