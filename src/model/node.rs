//! Street-network node (an intersection or way endpoint).

use geo::Point;
use serde::{Deserialize, Serialize};
use super::{PropertyMap, Value};

/// Road-network node identifier (the upstream OSM id). Immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in the street graph, with every enrichment slot the pipeline fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetNode {
    pub id: NodeId,
    /// Geodesic (lon, lat) location.
    pub point: Point<f64>,
    /// Nearest network access point of a grocery store.
    pub grocery: bool,
    /// Planar distance (meters, equal-area) to the nearest grocery feature.
    pub euclidean_to_grocery: Option<f64>,
    /// Tract attributes joined by containment; all `Null` outside every tract.
    pub demographics: PropertyMap,
    /// Travel time (seconds) to the nearest grocery-flagged node.
    pub nearest_grocery_time: Option<f64>,
    pub pagerank: Option<f64>,
    pub in_area_of_analysis: bool,
    /// Road-network attributes from the source (e.g. `street_count`).
    pub properties: PropertyMap,
}

impl StreetNode {
    pub fn new(id: NodeId, point: Point<f64>) -> Self {
        Self {
            id,
            point,
            grocery: false,
            euclidean_to_grocery: None,
            demographics: PropertyMap::new(),
            nearest_grocery_time: None,
            pagerank: None,
            in_area_of_analysis: false,
            properties: PropertyMap::new(),
        }
    }

    pub fn lon(&self) -> f64 { self.point.x() }
    pub fn lat(&self) -> f64 { self.point.y() }

    /// Numeric value of a named node attribute, `None` when missing.
    pub fn scalar(&self, attr: &NodeAttribute) -> Option<f64> {
        match attr {
            NodeAttribute::NearestGroceryTime => self.nearest_grocery_time,
            NodeAttribute::Pagerank => self.pagerank,
            NodeAttribute::EuclideanToGrocery => self.euclidean_to_grocery,
            NodeAttribute::Demographic(field) => {
                self.demographics.get(field).and_then(Value::as_float)
            }
        }
    }
}

/// Scalar node attributes that can be projected onto edges or ranged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeAttribute {
    NearestGroceryTime,
    Pagerank,
    EuclideanToGrocery,
    /// A joined tract field, e.g. `RPL_THEMES` or `density`.
    Demographic(String),
}

impl NodeAttribute {
    pub fn name(&self) -> &str {
        match self {
            NodeAttribute::NearestGroceryTime => "nearest_grocery_time",
            NodeAttribute::Pagerank => "pagerank",
            NodeAttribute::EuclideanToGrocery => "euclidean_to_grocery",
            NodeAttribute::Demographic(field) => field,
        }
    }
}

impl From<&str> for NodeAttribute {
    fn from(name: &str) -> Self {
        match name {
            "nearest_grocery_time" => NodeAttribute::NearestGroceryTime,
            "pagerank" => NodeAttribute::Pagerank,
            "euclidean_to_grocery" | "euclidean" => NodeAttribute::EuclideanToGrocery,
            other => NodeAttribute::Demographic(other.to_string()),
        }
    }
}

impl std::fmt::Display for NodeAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
