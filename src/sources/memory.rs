//! In-memory source provider.
//!
//! This is the reference implementation of `SourceProvider`. It serves
//! fixed fixture data, counts calls per source, and can be told to fail a
//! source to exercise error propagation.
//!
//! Use this provider for:
//! - Holding upstream data fixed in tests
//! - Embedding the pipeline over data acquired elsewhere

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use geo::{Intersects, Point, Polygon};
use parking_lot::RwLock;

use super::{PoiFeature, RawEdge, RawNode, RoadNetwork, SourceKind, SourceProvider, SviDataset, TagFilter, Tract};
use crate::{Error, Result};

// ============================================================================
// MemorySources
// ============================================================================

/// Fixture-backed provider.
#[derive(Default)]
pub struct MemorySources {
    places: HashMap<String, Point<f64>>,
    features: Vec<PoiFeature>,
    network: RoadNetwork,
    tracts: Vec<Tract>,
    svi: Option<SviDataset>,
    failures: RwLock<HashMap<SourceKind, String>>,
    calls: CallCounts,
}

#[derive(Default)]
struct CallCounts {
    geocoder: AtomicU64,
    features: AtomicU64,
    network: AtomicU64,
    tracts: AtomicU64,
}

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, name: impl Into<String>, lat: f64, lon: f64) -> Self {
        self.places.insert(name.into(), Point::new(lon, lat));
        self
    }

    pub fn with_feature(mut self, feature: PoiFeature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn with_node(mut self, node: RawNode) -> Self {
        self.network.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: RawEdge) -> Self {
        self.network.edges.push(edge);
        self
    }

    pub fn with_network(mut self, network: RoadNetwork) -> Self {
        self.network = network;
        self
    }

    pub fn with_tract(mut self, tract: Tract) -> Self {
        self.tracts.push(tract);
        self
    }

    /// Serve tracts from an on-disk dataset instead of in-memory fixtures.
    pub fn with_svi_dataset(mut self, dataset: SviDataset) -> Self {
        self.svi = Some(dataset);
        self
    }

    /// Make every subsequent call to `kind` fail with `message`.
    pub fn fail(&self, kind: SourceKind, message: impl Into<String>) {
        self.failures.write().insert(kind, message.into());
    }

    /// Clear an injected failure.
    pub fn recover(&self, kind: SourceKind) {
        self.failures.write().remove(&kind);
    }

    /// Number of calls made to `kind` so far.
    pub fn calls(&self, kind: SourceKind) -> u64 {
        self.counter(kind).load(Ordering::Relaxed)
    }

    fn counter(&self, kind: SourceKind) -> &AtomicU64 {
        match kind {
            SourceKind::Geocoder => &self.calls.geocoder,
            SourceKind::PointsOfInterest => &self.calls.features,
            SourceKind::RoadNetwork => &self.calls.network,
            SourceKind::Vulnerability => &self.calls.tracts,
        }
    }

    fn enter(&self, kind: SourceKind) -> Result<()> {
        self.counter(kind).fetch_add(1, Ordering::Relaxed);
        match self.failures.read().get(&kind) {
            Some(message) => Err(Error::SourceUnavailable { source_kind: kind, message: message.clone() }),
            None => Ok(()),
        }
    }
}

// ============================================================================
// SourceProvider impl
// ============================================================================

#[async_trait]
impl SourceProvider for MemorySources {
    async fn geocode(&self, place: &str) -> Result<Point<f64>> {
        self.enter(SourceKind::Geocoder)?;
        self.places.get(place).copied().ok_or_else(|| Error::SourceUnavailable {
            source_kind: SourceKind::Geocoder,
            message: format!("no geocoding result for {place:?}"),
        })
    }

    async fn features(&self, scope: &Polygon<f64>, tags: &TagFilter) -> Result<Vec<PoiFeature>> {
        self.enter(SourceKind::PointsOfInterest)?;
        Ok(self
            .features
            .iter()
            .filter(|f| tags.matches(&f.tags) && f.geometry.intersects(scope))
            .cloned()
            .collect())
    }

    async fn road_network(&self, scope: &Polygon<f64>) -> Result<RoadNetwork> {
        self.enter(SourceKind::RoadNetwork)?;
        let nodes: Vec<RawNode> = self
            .network
            .nodes
            .iter()
            .filter(|n| scope.intersects(&Point::new(n.lon, n.lat)))
            .cloned()
            .collect();
        let kept: std::collections::HashSet<u64> = nodes.iter().map(|n| n.id).collect();
        let edges = self
            .network
            .edges
            .iter()
            .filter(|e| kept.contains(&e.u) && kept.contains(&e.v))
            .cloned()
            .collect();
        Ok(RoadNetwork { nodes, edges })
    }

    async fn tracts(&self, scope: &Polygon<f64>) -> Result<Vec<Tract>> {
        self.enter(SourceKind::Vulnerability)?;
        match &self.svi {
            Some(dataset) => dataset.read(scope),
            None => Ok(self.tracts.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Geometry};
    use std::collections::BTreeMap;

    fn scope() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)]
    }

    fn supermarket(id: u64, x: f64, y: f64) -> PoiFeature {
        let mut tags = BTreeMap::new();
        tags.insert("shop".to_string(), "supermarket".to_string());
        PoiFeature { id, geometry: Geometry::Point(Point::new(x, y)), tags }
    }

    #[tokio::test]
    async fn test_features_filtered_by_scope_and_tag() {
        let mut bakery = supermarket(3, 0.5, 0.5);
        bakery.tags.insert("shop".into(), "bakery".into());
        let sources = MemorySources::new()
            .with_feature(supermarket(1, 0.5, 0.5))
            .with_feature(supermarket(2, 5.0, 5.0))
            .with_feature(bakery);
        let found = sources.features(&scope(), &TagFilter::default()).await.unwrap();
        assert_eq!(found.iter().map(|f| f.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(sources.calls(SourceKind::PointsOfInterest), 1);
    }

    #[tokio::test]
    async fn test_road_network_drops_edges_leaving_scope() {
        let node = |id, lon, lat| RawNode { id, lon, lat, properties: Default::default() };
        let sources = MemorySources::new()
            .with_node(node(1, 0.2, 0.2))
            .with_node(node(2, 0.4, 0.4))
            .with_node(node(3, 3.0, 3.0))
            .with_edge(RawEdge::new(1, 2, 100.0))
            .with_edge(RawEdge::new(2, 3, 100.0));
        let net = sources.road_network(&scope()).await.unwrap();
        assert_eq!(net.nodes.len(), 2);
        assert_eq!(net.edges.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_source_unavailable() {
        let sources = MemorySources::new().with_place("Somewhere", 0.5, 0.5);
        sources.fail(SourceKind::Geocoder, "timeout");
        let err = sources.geocode("Somewhere").await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { source_kind: SourceKind::Geocoder, .. }));
        sources.recover(SourceKind::Geocoder);
        assert_eq!(sources.geocode("Somewhere").await.unwrap(), Point::new(0.5, 0.5));
        assert_eq!(sources.calls(SourceKind::Geocoder), 2);
    }
}
