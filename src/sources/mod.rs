//! # Source Provider Trait
//!
//! This is THE contract between the pipeline and its external data
//! collaborators. Every acquisition the enrichment needs is defined here.
//!
//! ## Implementations
//!
//! | Provider | Module | Description |
//! |----------|--------|-------------|
//! | `MemorySources` | `memory` | In-memory fixtures for testing/embedding |
//! | `SviDataset` | `svi` | On-disk, state-partitioned vulnerability tracts |
//!
//! Providers return raw records. The fetchers in `fetch` reduce them to what
//! the joins need and memoize the result per query polygon.

pub mod memory;
pub mod svi;
pub mod fetch;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use geo::{Geometry, LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::model::PropertyMap;
use crate::Result;

pub use memory::MemorySources;
pub use svi::SviDataset;
pub use fetch::{CachedSources, GroceryFeature};

// ============================================================================
// Source identity
// ============================================================================

/// Which collaborator an error or fetch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Geocoder,
    PointsOfInterest,
    RoadNetwork,
    Vulnerability,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Geocoder => "geocoder",
            SourceKind::PointsOfInterest => "points-of-interest",
            SourceKind::RoadNetwork => "road-network",
            SourceKind::Vulnerability => "vulnerability",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Raw records
// ============================================================================

/// `key = value` tag selector for point-of-interest queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagFilter {
    pub key: String,
    pub value: String,
}

impl TagFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        tags.get(&self.key).is_some_and(|v| *v == self.value)
    }
}

impl Default for TagFilter {
    fn default() -> Self {
        Self::new("shop", "supermarket")
    }
}

/// A point or polygon feature from a point-of-interest query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiFeature {
    pub id: u64,
    /// Geodesic geometry.
    pub geometry: Geometry<f64>,
    pub tags: BTreeMap<String, String>,
}

/// Road-network node as delivered by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    pub id: u64,
    pub lon: f64,
    pub lat: f64,
    pub properties: PropertyMap,
}

/// Road segment as delivered by the source. Two-way unless `oneway`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEdge {
    pub u: u64,
    pub v: u64,
    pub length_m: f64,
    pub highway: Option<String>,
    pub maxspeed_kph: Option<f64>,
    /// Seconds; derived from length and speed when absent.
    pub travel_time: Option<f64>,
    pub oneway: bool,
    pub geometry: Option<LineString<f64>>,
    pub properties: PropertyMap,
}

impl RawEdge {
    pub fn new(u: u64, v: u64, length_m: f64) -> Self {
        Self {
            u,
            v,
            length_m,
            highway: None,
            maxspeed_kph: None,
            travel_time: None,
            oneway: false,
            geometry: None,
            properties: PropertyMap::new(),
        }
    }

    pub fn highway(mut self, highway: impl Into<String>) -> Self {
        self.highway = Some(highway.into());
        self
    }

    pub fn maxspeed(mut self, kph: f64) -> Self {
        self.maxspeed_kph = Some(kph);
        self
    }

    pub fn travel_time(mut self, seconds: f64) -> Self {
        self.travel_time = Some(seconds);
        self
    }

    pub fn oneway(mut self) -> Self {
        self.oneway = true;
        self
    }
}

/// Routable road network covering a query polygon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadNetwork {
    pub nodes: Vec<RawNode>,
    pub edges: Vec<RawEdge>,
}

/// A census tract with its vulnerability attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tract {
    pub geoid: String,
    /// Geodesic geometry.
    pub geometry: MultiPolygon<f64>,
    pub attributes: PropertyMap,
}

// ============================================================================
// SourceProvider Trait
// ============================================================================

/// The acquisition contract.
///
/// Implementations report upstream failures as
/// `Error::SourceUnavailable` with their `SourceKind`. They do not retry.
#[async_trait]
pub trait SourceProvider: Send + Sync + 'static {
    /// Resolve a free-text place name to a geodesic center point.
    async fn geocode(&self, place: &str) -> Result<Point<f64>>;

    /// Point/polygon features matching `tags` within `scope`.
    async fn features(&self, scope: &Polygon<f64>, tags: &TagFilter) -> Result<Vec<PoiFeature>>;

    /// Drivable road network within `scope`.
    async fn road_network(&self, scope: &Polygon<f64>) -> Result<RoadNetwork>;

    /// Tracts from the partitions covering `scope`. May include tracts that
    /// do not intersect `scope`; the fetcher filters.
    async fn tracts(&self, scope: &Polygon<f64>) -> Result<Vec<Tract>>;
}
