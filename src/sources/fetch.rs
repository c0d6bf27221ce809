//! Memoized fetchers over a `SourceProvider`.
//!
//! Each fetcher is parameterized solely by the query polygon and memoized on
//! its canonical WKT for the lifetime of the `CachedSources`:
//!
//! - `fetch_groceries`: features matching the grocery tag, reduced to id +
//!   geometry and flagged `grocery = true`
//! - `fetch_graph`: routable directed multigraph weighted by travel time
//! - `read_svi`: tracts intersecting the polygon, plus derived `density`
//!
//! Upstream errors propagate unchanged. A successful fetch with no groceries
//! or no tracts is `Error::EmptyResult`; a road network with no nodes counts
//! as no road network found and is `Error::SourceUnavailable`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use geo::{Geometry, Intersects, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};

use super::{RawEdge, RoadNetwork, SourceKind, SourceProvider, TagFilter, Tract};
use crate::cache::Memo;
use crate::model::{NodeId, StreetGraph, StreetNode, Value};
use crate::{Error, Result};

/// Speed assumed when no edge in the network carries one, km/h.
pub const FALLBACK_SPEED_KPH: f64 = 40.0;

/// A grocery store reduced to what the nearest-node join needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryFeature {
    pub id: u64,
    /// Geodesic point or polygon.
    pub geometry: Geometry<f64>,
    pub grocery: bool,
}

/// The three source fetchers plus geocoding, each memoized in-process.
pub struct CachedSources<P: SourceProvider> {
    provider: Arc<P>,
    grocery_tags: TagFilter,
    places: Memo<Point<f64>>,
    groceries: Memo<Vec<GroceryFeature>>,
    graphs: Memo<StreetGraph>,
    tracts: Memo<Vec<Tract>>,
}

impl<P: SourceProvider> CachedSources<P> {
    pub fn new(provider: Arc<P>, grocery_tags: TagFilter) -> Self {
        Self {
            provider,
            grocery_tags,
            places: Memo::new("geocode"),
            groceries: Memo::new("fetch_groceries"),
            graphs: Memo::new("fetch_graph"),
            tracts: Memo::new("read_svi"),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub async fn geocode(&self, place: &str) -> Result<Point<f64>> {
        let point = self
            .places
            .get_or_try_fetch(place, || self.provider.geocode(place))
            .await?;
        Ok(*point)
    }

    pub async fn fetch_groceries(&self, scope: &Polygon<f64>) -> Result<Arc<Vec<GroceryFeature>>> {
        self.groceries
            .get_or_try_fetch(scope, || async {
                let started = Instant::now();
                let features = self.provider.features(scope, &self.grocery_tags).await?;
                if features.is_empty() {
                    return Err(Error::EmptyResult(format!(
                        "no {}={} features in query scope",
                        self.grocery_tags.key, self.grocery_tags.value
                    )));
                }
                let groceries: Vec<GroceryFeature> = features
                    .into_iter()
                    .map(|f| GroceryFeature { id: f.id, geometry: f.geometry, grocery: true })
                    .collect();
                tracing::info!(
                    stage = "fetch_groceries",
                    count = groceries.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "fetched grocery features"
                );
                Ok(groceries)
            })
            .await
    }

    pub async fn fetch_graph(&self, scope: &Polygon<f64>) -> Result<Arc<StreetGraph>> {
        self.graphs
            .get_or_try_fetch(scope, || async {
                let started = Instant::now();
                let network = self.provider.road_network(scope).await?;
                let graph = build_graph(network)?;
                tracing::info!(
                    stage = "fetch_graph",
                    nodes = graph.node_count(),
                    edges = graph.edge_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "fetched road network"
                );
                Ok(graph)
            })
            .await
    }

    pub async fn read_svi(&self, scope: &Polygon<f64>) -> Result<Arc<Vec<Tract>>> {
        self.tracts
            .get_or_try_fetch(scope, || async {
                let started = Instant::now();
                let mut tracts: Vec<Tract> = self
                    .provider
                    .tracts(scope)
                    .await?
                    .into_iter()
                    .filter(|t| t.geometry.intersects(scope))
                    .collect();
                if tracts.is_empty() {
                    return Err(Error::EmptyResult("no vulnerability tracts intersect query scope".into()));
                }
                for tract in &mut tracts {
                    let density = density(tract);
                    tract.attributes.insert("density".into(), Value::from(density));
                }
                tracing::info!(
                    stage = "read_svi",
                    count = tracts.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "read vulnerability tracts"
                );
                Ok(tracts)
            })
            .await
    }

    /// Drop all memoized fetches.
    pub fn clear(&self) {
        self.places.clear();
        self.groceries.clear();
        self.graphs.clear();
        self.tracts.clear();
    }
}

/// Population per square mile; missing when either input is missing or the
/// area is not positive.
fn density(tract: &Tract) -> Option<f64> {
    let pop = tract.attributes.get("E_TOTPOP").and_then(Value::as_float)?;
    let area = tract.attributes.get("AREA_SQMI").and_then(Value::as_float)?;
    (area > 0.0).then(|| pop / area)
}

// ============================================================================
// Road network → StreetGraph
// ============================================================================

/// Build the routable multigraph: impute speeds, derive travel times, and
/// expand two-way segments into both directions.
pub fn build_graph(network: RoadNetwork) -> Result<StreetGraph> {
    if network.nodes.is_empty() {
        return Err(Error::SourceUnavailable {
            source_kind: SourceKind::RoadNetwork,
            message: "no road network found in query scope".into(),
        });
    }

    let mut graph = StreetGraph::new();
    for raw in network.nodes {
        let mut node = StreetNode::new(NodeId(raw.id), Point::new(raw.lon, raw.lat));
        node.properties = raw.properties;
        graph.add_node(node)?;
    }

    let speeds = SpeedTable::from_edges(&network.edges);
    let mut dangling = 0usize;
    for raw in network.edges {
        if graph.index_of(NodeId(raw.u)).is_none() || graph.index_of(NodeId(raw.v)).is_none() {
            dangling += 1;
            continue;
        }
        if !raw.length_m.is_finite() || raw.length_m < 0.0 {
            return Err(Error::InvalidData(format!(
                "edge ({}, {}) has invalid length {}",
                raw.u, raw.v, raw.length_m
            )));
        }
        let speed_kph = speeds.speed_for(&raw);
        let travel_time = raw
            .travel_time
            .unwrap_or_else(|| raw.length_m / (speed_kph * 1000.0 / 3600.0));

        insert_segment(&mut graph, &raw, raw.u, raw.v, travel_time, speed_kph, raw.geometry.clone())?;
        if !raw.oneway {
            let reversed = raw.geometry.as_ref().map(|g| {
                let mut coords = g.0.clone();
                coords.reverse();
                LineString::new(coords)
            });
            insert_segment(&mut graph, &raw, raw.v, raw.u, travel_time, speed_kph, reversed)?;
        }
    }
    if dangling > 0 {
        tracing::debug!(dangling, "skipped edges with endpoints outside the network");
    }

    Ok(graph)
}

fn insert_segment(
    graph: &mut StreetGraph,
    raw: &RawEdge,
    u: u64,
    v: u64,
    travel_time: f64,
    speed_kph: f64,
    geometry: Option<LineString<f64>>,
) -> Result<()> {
    let edge = graph.add_edge(NodeId(u), NodeId(v), travel_time, raw.length_m)?;
    edge.geometry = geometry;
    edge.properties = raw.properties.clone();
    edge.properties.insert("speed_kph".into(), Value::from(speed_kph));
    edge.properties.insert("oneway".into(), Value::Bool(raw.oneway));
    if let Some(highway) = &raw.highway {
        edge.properties.insert("highway".into(), Value::from(highway.as_str()));
    }
    Ok(())
}

/// Speed imputation: posted speed, else the mean posted speed of the
/// edge's highway class, else the mean over all posted speeds, else
/// [`FALLBACK_SPEED_KPH`].
struct SpeedTable {
    by_highway: HashMap<String, f64>,
    overall: Option<f64>,
}

impl SpeedTable {
    fn from_edges(edges: &[RawEdge]) -> Self {
        let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
        let (mut total, mut count) = (0.0, 0usize);
        for edge in edges {
            let Some(speed) = edge.maxspeed_kph.filter(|s| s.is_finite() && *s > 0.0) else {
                continue;
            };
            total += speed;
            count += 1;
            if let Some(highway) = &edge.highway {
                let entry = sums.entry(highway.clone()).or_insert((0.0, 0));
                entry.0 += speed;
                entry.1 += 1;
            }
        }
        Self {
            by_highway: sums.into_iter().map(|(k, (s, n))| (k, s / n as f64)).collect(),
            overall: (count > 0).then(|| total / count as f64),
        }
    }

    fn speed_for(&self, edge: &RawEdge) -> f64 {
        edge.maxspeed_kph
            .filter(|s| s.is_finite() && *s > 0.0)
            .or_else(|| edge.highway.as_ref().and_then(|h| self.by_highway.get(h).copied()))
            .or(self.overall)
            .unwrap_or(FALLBACK_SPEED_KPH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{props, EdgeId, PropertyMap};
    use crate::sources::{MemorySources, PoiFeature, RawNode, SourceKind};
    use geo::{polygon, MultiPolygon};
    use std::collections::BTreeMap;

    fn scope() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)]
    }

    fn node(id: u64, lon: f64, lat: f64) -> RawNode {
        RawNode { id, lon, lat, properties: PropertyMap::new() }
    }

    #[test]
    fn test_build_graph_imputes_speeds_and_expands_two_way() {
        let network = RoadNetwork {
            nodes: vec![node(1, 0.1, 0.1), node(2, 0.2, 0.2), node(3, 0.3, 0.3)],
            edges: vec![
                RawEdge::new(1, 2, 1000.0).highway("residential").maxspeed(36.0),
                // residential mean = 36 km/h = 10 m/s
                RawEdge::new(2, 3, 500.0).highway("residential").oneway(),
                // unknown class falls back to the overall mean
                RawEdge::new(3, 1, 200.0).highway("service").oneway(),
                RawEdge::new(1, 3, 50.0).travel_time(9.0).oneway(),
            ],
        };
        let g = build_graph(network).unwrap();
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 5);

        let tt = |u, v, key| g.edge(EdgeId { u: NodeId(u), v: NodeId(v), key }).unwrap().travel_time;
        assert!((tt(1, 2, 0) - 100.0).abs() < 1e-9);
        assert!((tt(2, 1, 0) - 100.0).abs() < 1e-9);
        assert!((tt(2, 3, 0) - 50.0).abs() < 1e-9);
        assert!((tt(3, 1, 0) - 20.0).abs() < 1e-9);
        assert_eq!(tt(1, 3, 0), 9.0);
        assert!(g.edge(EdgeId { u: NodeId(3), v: NodeId(2), key: 0 }).is_none());
    }

    #[test]
    fn test_build_graph_without_any_speed_uses_fallback() {
        let network = RoadNetwork {
            nodes: vec![node(1, 0.1, 0.1), node(2, 0.2, 0.2)],
            edges: vec![RawEdge::new(1, 2, 1000.0).oneway()],
        };
        let g = build_graph(network).unwrap();
        assert!((g.edges()[0].travel_time - 1000.0 / (FALLBACK_SPEED_KPH / 3.6)).abs() < 1e-9);
    }

    #[test]
    fn test_empty_network_is_source_unavailable() {
        let err = build_graph(RoadNetwork::default()).unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { source_kind: SourceKind::RoadNetwork, .. }));
    }

    #[tokio::test]
    async fn test_fetchers_are_memoized_per_polygon() {
        let mut tags = BTreeMap::new();
        tags.insert("shop".to_string(), "supermarket".to_string());
        let provider = Arc::new(
            MemorySources::new()
                .with_feature(PoiFeature { id: 9, geometry: Geometry::Point(Point::new(0.5, 0.5)), tags })
                .with_node(node(1, 0.5, 0.5)),
        );
        let sources = CachedSources::new(provider.clone(), TagFilter::default());

        for _ in 0..3 {
            let g = sources.fetch_groceries(&scope()).await.unwrap();
            assert!(g[0].grocery);
            sources.fetch_graph(&scope()).await.unwrap();
        }
        assert_eq!(provider.calls(SourceKind::PointsOfInterest), 1);
        assert_eq!(provider.calls(SourceKind::RoadNetwork), 1);
    }

    #[tokio::test]
    async fn test_no_groceries_is_empty_result() {
        let sources = CachedSources::new(Arc::new(MemorySources::new()), TagFilter::default());
        assert!(matches!(sources.fetch_groceries(&scope()).await, Err(Error::EmptyResult(_))));
    }

    #[tokio::test]
    async fn test_read_svi_filters_and_derives_density() {
        let inside = polygon![(x: 0.2, y: 0.2), (x: 0.4, y: 0.2), (x: 0.4, y: 0.4), (x: 0.2, y: 0.4)];
        let outside = polygon![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 6.0, y: 6.0), (x: 5.0, y: 6.0)];
        let provider = MemorySources::new()
            .with_tract(Tract {
                geoid: "A".into(),
                geometry: MultiPolygon::new(vec![inside]),
                attributes: props([("E_TOTPOP", Value::Int(500)), ("AREA_SQMI", Value::Float(2.0))]),
            })
            .with_tract(Tract {
                geoid: "B".into(),
                geometry: MultiPolygon::new(vec![outside]),
                attributes: PropertyMap::new(),
            });
        let sources = CachedSources::new(Arc::new(provider), TagFilter::default());
        let tracts = sources.read_svi(&scope()).await.unwrap();
        assert_eq!(tracts.len(), 1);
        assert_eq!(tracts[0].attributes["density"], Value::Float(250.0));
    }
}
