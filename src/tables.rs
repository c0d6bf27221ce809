//! The pipeline's output: one node table and one edge table in geodesic
//! coordinates, ready for a presentation layer.

use geo::{LineString, Point};
use serde::{Deserialize, Serialize};

use crate::model::{NodeAttribute, NodeId, PropertyMap, StreetGraph, Value};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub osmid: NodeId,
    pub geometry: Point<f64>,
    pub grocery: bool,
    pub euclidean_to_grocery: Option<f64>,
    pub demographics: PropertyMap,
    pub nearest_grocery_time: Option<f64>,
    pub pagerank: Option<f64>,
    pub in_area_of_analysis: bool,
    /// Inside the query scope but outside the area of analysis.
    pub buffer: bool,
    pub properties: PropertyMap,
}

impl NodeRecord {
    pub fn scalar(&self, attr: &NodeAttribute) -> Option<f64> {
        match attr {
            NodeAttribute::NearestGroceryTime => self.nearest_grocery_time,
            NodeAttribute::Pagerank => self.pagerank,
            NodeAttribute::EuclideanToGrocery => self.euclidean_to_grocery,
            NodeAttribute::Demographic(field) => self.demographics.get(field).and_then(Value::as_float),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub u: NodeId,
    pub v: NodeId,
    pub key: u32,
    pub travel_time: f64,
    pub length: f64,
    /// Source geometry, or the straight segment between the endpoints.
    pub geometry: LineString<f64>,
    pub nearest_grocery_time: Option<f64>,
    pub pagerank: Option<f64>,
    pub in_area_of_analysis: bool,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTables {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl EnrichedTables {
    /// Flatten the graph. Rows keep arena order.
    pub fn from_graph(graph: &StreetGraph) -> Self {
        let nodes = graph
            .nodes()
            .iter()
            .map(|n| NodeRecord {
                osmid: n.id,
                geometry: n.point,
                grocery: n.grocery,
                euclidean_to_grocery: n.euclidean_to_grocery,
                demographics: n.demographics.clone(),
                nearest_grocery_time: n.nearest_grocery_time,
                pagerank: n.pagerank,
                in_area_of_analysis: n.in_area_of_analysis,
                buffer: !n.in_area_of_analysis,
                properties: n.properties.clone(),
            })
            .collect();

        let edges = graph
            .edges()
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let (u, v) = graph.endpoints(i);
                let geometry = e.geometry.clone().unwrap_or_else(|| {
                    LineString::from(vec![graph.node_at(u).point.0, graph.node_at(v).point.0])
                });
                EdgeRecord {
                    u: e.id.u,
                    v: e.id.v,
                    key: e.id.key,
                    travel_time: e.travel_time,
                    length: e.length,
                    geometry,
                    nearest_grocery_time: e.nearest_grocery_time,
                    pagerank: e.pagerank,
                    in_area_of_analysis: e.in_area_of_analysis,
                    properties: e.properties.clone(),
                }
            })
            .collect();

        Self { nodes, edges }
    }

    /// Rows flagged in the area of analysis only.
    pub fn area_of_analysis(&self) -> Self {
        Self {
            nodes: self.nodes.iter().filter(|n| n.in_area_of_analysis).cloned().collect(),
            edges: self.edges.iter().filter(|e| e.in_area_of_analysis).cloned().collect(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.osmid == id)
    }

    /// `(min, max)` of a node attribute over non-missing values.
    pub fn value_range(&self, attr: &NodeAttribute) -> Result<(f64, f64)> {
        range_of(self.nodes.iter().filter_map(|n| n.scalar(attr)), attr)
    }

    /// `(min, max)` of an edge attribute over non-missing values.
    pub fn edge_value_range(&self, attr: &NodeAttribute) -> Result<(f64, f64)> {
        let values = self.edges.iter().filter_map(|e| match attr {
            NodeAttribute::NearestGroceryTime => e.nearest_grocery_time,
            NodeAttribute::Pagerank => e.pagerank,
            other => e.properties.get(other.name()).and_then(Value::as_float),
        });
        range_of(values, attr)
    }
}

fn range_of(values: impl Iterator<Item = f64>, attr: &NodeAttribute) -> Result<(f64, f64)> {
    values
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .ok_or_else(|| Error::EmptyResult(format!("no valid values for {attr}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StreetNode;
    use pretty_assertions::assert_eq;

    fn graph() -> StreetGraph {
        let mut g = StreetGraph::new();
        for i in 0..3u64 {
            let mut n = StreetNode::new(NodeId(i), Point::new(i as f64, 0.0));
            n.in_area_of_analysis = i < 2;
            n.nearest_grocery_time = (i > 0).then_some(i as f64 * 15.0);
            n.demographics.insert("RPL_THEMES".into(), Value::Null);
            g.add_node(n).unwrap();
        }
        g.add_edge(NodeId(0), NodeId(1), 3.0, 30.0).unwrap().in_area_of_analysis = true;
        g.add_edge(NodeId(1), NodeId(2), 3.0, 30.0).unwrap();
        g
    }

    #[test]
    fn test_from_graph_flags_buffer_and_fills_geometry() {
        let tables = EnrichedTables::from_graph(&graph());
        let buffer: Vec<bool> = tables.nodes.iter().map(|n| n.buffer).collect();
        assert_eq!(buffer, vec![false, false, true]);
        assert_eq!(
            tables.edges[1].geometry,
            LineString::from(vec![(1.0, 0.0), (2.0, 0.0)])
        );
    }

    #[test]
    fn test_area_of_analysis_drops_buffer_rows() {
        let tables = EnrichedTables::from_graph(&graph()).area_of_analysis();
        assert_eq!(tables.nodes.len(), 2);
        assert_eq!(tables.edges.len(), 1);
    }

    #[test]
    fn test_value_range_skips_missing() {
        let tables = EnrichedTables::from_graph(&graph());
        assert_eq!(tables.value_range(&NodeAttribute::NearestGroceryTime).unwrap(), (15.0, 30.0));
    }

    #[test]
    fn test_value_range_without_values_is_empty_result() {
        let tables = EnrichedTables::from_graph(&graph());
        let err = tables.value_range(&NodeAttribute::from("RPL_THEMES")).unwrap_err();
        assert!(matches!(err, Error::EmptyResult(_)));
        assert!(matches!(
            tables.edge_value_range(&NodeAttribute::Pagerank),
            Err(Error::EmptyResult(_))
        ));
    }
}
