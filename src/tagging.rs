//! Area-of-analysis tagging.
//!
//! A node is in the area of analysis when its point lies inside the
//! area-of-analysis polygon. An edge is in when at least one endpoint is,
//! so segments crossing the boundary are kept.

use crate::model::StreetGraph;
use crate::region::RegionPolygons;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaggingSummary {
    pub nodes_inside: usize,
    pub edges_inside: usize,
}

pub fn tag_area_of_analysis(graph: &mut StreetGraph, region: &RegionPolygons) -> TaggingSummary {
    let mut summary = TaggingSummary::default();
    for node in graph.nodes_mut() {
        node.in_area_of_analysis = region.in_area_of_analysis(&node.point);
        summary.nodes_inside += usize::from(node.in_area_of_analysis);
    }

    let flags: Vec<bool> = (0..graph.edge_count())
        .map(|e| {
            let (u, v) = graph.endpoints(e);
            graph.node_at(u).in_area_of_analysis || graph.node_at(v).in_area_of_analysis
        })
        .collect();
    for (edge, inside) in graph.edges_mut().zip(flags) {
        edge.in_area_of_analysis = inside;
        summary.edges_inside += usize::from(inside);
    }

    tracing::debug!(?summary, "tagged area of analysis");
    summary
}
