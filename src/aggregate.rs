//! Node → edge attribute projection.

use crate::model::{NodeAttribute, StreetGraph};

/// Set each edge's `attr` to the mean of its endpoints' values. An edge with
/// a missing endpoint value gets a missing value.
pub fn add_average_to_edge(graph: &mut StreetGraph, attr: &NodeAttribute) {
    let averages: Vec<Option<f64>> = (0..graph.edge_count())
        .map(|e| {
            let (u, v) = graph.endpoints(e);
            let a = graph.node_at(u).scalar(attr)?;
            let b = graph.node_at(v).scalar(attr)?;
            Some((a + b) / 2.0)
        })
        .collect();

    let mut missing = 0usize;
    for (edge, value) in graph.edges_mut().zip(averages) {
        missing += usize::from(value.is_none());
        edge.set_scalar(attr, value);
    }
    tracing::debug!(attribute = attr.name(), missing, "averaged node attribute onto edges");
}
