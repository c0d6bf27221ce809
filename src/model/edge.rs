//! Street-network edge (a directed road segment).

use geo::LineString;
use serde::{Deserialize, Serialize};
use super::{NodeAttribute, NodeId, PropertyMap, Value};

/// Multigraph edge identifier. `key` distinguishes parallel `u → v` edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId {
    pub u: NodeId,
    pub v: NodeId,
    pub key: u32,
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.u, self.v, self.key)
    }
}

/// A directed road segment. One-way streets produce a single edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetEdge {
    pub id: EdgeId,
    /// Traversal time in seconds, never negative.
    pub travel_time: f64,
    /// Segment length in meters.
    pub length: f64,
    pub geometry: Option<LineString<f64>>,
    /// Mean of the endpoint values; missing if either endpoint is missing.
    pub nearest_grocery_time: Option<f64>,
    pub pagerank: Option<f64>,
    pub in_area_of_analysis: bool,
    pub properties: PropertyMap,
}

impl StreetEdge {
    pub fn new(id: EdgeId, travel_time: f64, length: f64) -> Self {
        Self {
            id,
            travel_time,
            length,
            geometry: None,
            nearest_grocery_time: None,
            pagerank: None,
            in_area_of_analysis: false,
            properties: PropertyMap::new(),
        }
    }

    pub fn u(&self) -> NodeId { self.id.u }
    pub fn v(&self) -> NodeId { self.id.v }

    /// Store an aggregated node attribute on this edge.
    pub fn set_scalar(&mut self, attr: &NodeAttribute, value: Option<f64>) {
        match attr {
            NodeAttribute::NearestGroceryTime => self.nearest_grocery_time = value,
            NodeAttribute::Pagerank => self.pagerank = value,
            other => {
                self.properties.insert(other.name().to_string(), Value::from(value));
            }
        }
    }

    pub fn scalar(&self, attr: &NodeAttribute) -> Option<f64> {
        match attr {
            NodeAttribute::NearestGroceryTime => self.nearest_grocery_time,
            NodeAttribute::Pagerank => self.pagerank,
            other => self.properties.get(other.name()).and_then(Value::as_float),
        }
    }
}
