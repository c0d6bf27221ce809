//! Spatial joins onto the street graph's nodes.
//!
//! Both joins run in the CONUS Albers equal-area projection so that
//! distances and nearest-neighbor choices are metric. Projected geometry is
//! scratch space: nodes keep their geodesic points, so nothing is reprojected
//! back and no coordinate drift is introduced.
//!
//! - **Grocery join**: every node is matched to its nearest grocery feature.
//!   Each grocery then keeps only its single closest matched node, which is
//!   flagged `grocery = true`. All other nodes are `false`. The node→feature
//!   distance is stored as `euclidean_to_grocery`.
//! - **Tract join**: every node inherits the attributes of the tract that
//!   intersects it. Nodes outside every tract get `Null` for every field.

use std::collections::BTreeSet;

use geo::{BoundingRect, Closest, ClosestPoint, Distance, Euclidean, Geometry, Intersects, Point};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;

use crate::crs::{project, AlbersEqualArea};
use crate::model::{PropertyMap, StreetGraph, Value};
use crate::sources::{GroceryFeature, Tract};
use crate::{Error, Result};

/// Tract identifier field added to every node's demographics.
pub const GEOID_FIELD: &str = "GEOID";

type EnvelopeItem = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Outcome counts of the grocery join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroceryJoinSummary {
    pub groceries: usize,
    /// Nodes flagged `grocery = true`.
    pub flagged_nodes: usize,
    /// Groceries that were nobody's nearest feature and so flag no node.
    pub unassigned_groceries: usize,
}

/// Outcome counts of the tract join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TractJoinSummary {
    pub matched_nodes: usize,
    pub unmatched_nodes: usize,
}

// ============================================================================
// Grocery join
// ============================================================================

pub fn join_groceries(graph: &mut StreetGraph, groceries: &[GroceryFeature]) -> Result<GroceryJoinSummary> {
    if groceries.is_empty() {
        return Err(Error::EmptyResult("grocery join needs at least one grocery feature".into()));
    }
    if graph.is_empty() {
        return Err(Error::EmptyResult("grocery join needs at least one road-network node".into()));
    }

    let proj = AlbersEqualArea::conus();
    let features: Vec<Geometry<f64>> = groceries.iter().map(|g| project(&g.geometry, &proj)).collect();
    let tree = envelope_tree(&features);

    // node index → (grocery index, distance)
    let nearest: Vec<Option<(usize, f64)>> = graph
        .nodes()
        .iter()
        .map(|n| nearest_feature(&tree, &features, project(&n.point, &proj)))
        .collect();

    // grocery index → (node index, distance); first node wins ties
    let mut closest_node: Vec<Option<(usize, f64)>> = vec![None; groceries.len()];
    for (node_idx, hit) in nearest.iter().enumerate() {
        let Some((g, d)) = *hit else { continue };
        match closest_node[g] {
            Some((_, best)) if best <= d => {}
            _ => closest_node[g] = Some((node_idx, d)),
        }
    }

    let mut flags = vec![false; graph.node_count()];
    for (node_idx, _) in closest_node.iter().flatten() {
        flags[*node_idx] = true;
    }

    for ((node, hit), flag) in graph.nodes_mut().zip(&nearest).zip(&flags) {
        node.grocery = *flag;
        node.euclidean_to_grocery = hit.map(|(_, d)| d);
    }

    let summary = GroceryJoinSummary {
        groceries: groceries.len(),
        flagged_nodes: flags.iter().filter(|f| **f).count(),
        unassigned_groceries: closest_node.iter().filter(|c| c.is_none()).count(),
    };
    tracing::debug!(?summary, "grocery join complete");
    Ok(summary)
}

fn envelope_tree(geoms: &[Geometry<f64>]) -> RTree<EnvelopeItem> {
    let items = geoms
        .iter()
        .enumerate()
        .filter_map(|(i, g)| {
            let rect = g.bounding_rect()?;
            let (min, max) = (rect.min(), rect.max());
            Some(GeomWithData::new(Rectangle::from_corners([min.x, min.y], [max.x, max.y]), i))
        })
        .collect();
    RTree::bulk_load(items)
}

/// Nearest feature by true distance. Envelope distance is a lower bound, so
/// candidates are scanned until it exceeds the best exact distance.
fn nearest_feature(
    tree: &RTree<EnvelopeItem>,
    features: &[Geometry<f64>],
    point: Point<f64>,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (item, envelope_d2) in tree.nearest_neighbor_iter_with_distance_2(&[point.x(), point.y()]) {
        if let Some((_, d)) = best {
            if envelope_d2 > d * d {
                break;
            }
        }
        let Some(d) = distance_to(&features[item.data], point) else { continue };
        match best {
            Some((i, bd)) if bd < d || (bd == d && i < item.data) => {}
            _ => best = Some((item.data, d)),
        }
    }
    best
}

fn distance_to(geom: &Geometry<f64>, point: Point<f64>) -> Option<f64> {
    if let Geometry::Point(p) = geom {
        return Some(Euclidean.distance(*p, point));
    }
    if geom.intersects(&point) {
        return Some(0.0);
    }
    match geom.closest_point(&point) {
        Closest::SinglePoint(c) | Closest::Intersection(c) => Some(Euclidean.distance(c, point)),
        Closest::Indeterminate => None,
    }
}

// ============================================================================
// Tract join
// ============================================================================

pub fn join_tracts(graph: &mut StreetGraph, tracts: &[Tract]) -> Result<TractJoinSummary> {
    if tracts.is_empty() {
        return Err(Error::EmptyResult("tract join needs at least one tract".into()));
    }

    let mut fields: BTreeSet<String> = tracts
        .iter()
        .flat_map(|t| t.attributes.keys().cloned())
        .collect();
    fields.insert(GEOID_FIELD.to_string());

    let proj = AlbersEqualArea::conus();
    let polygons: Vec<Geometry<f64>> = tracts
        .iter()
        .map(|t| Geometry::MultiPolygon(project(&t.geometry, &proj)))
        .collect();
    let tree = envelope_tree(&polygons);

    let mut summary = TractJoinSummary::default();
    for node in graph.nodes_mut() {
        let point = project(&node.point, &proj);
        // Lowest dataset index wins when tracts overlap
        let hit = tree
            .locate_all_at_point(&[point.x(), point.y()])
            .map(|item| item.data)
            .filter(|&i| polygons[i].intersects(&point))
            .min();

        node.demographics = match hit {
            Some(i) => {
                summary.matched_nodes += 1;
                tract_fields(&tracts[i], &fields)
            }
            None => {
                summary.unmatched_nodes += 1;
                fields.iter().map(|f| (f.clone(), Value::Null)).collect()
            }
        };
    }

    tracing::debug!(?summary, "tract join complete");
    Ok(summary)
}

fn tract_fields(tract: &Tract, fields: &BTreeSet<String>) -> PropertyMap {
    fields
        .iter()
        .map(|f| {
            let value = if f == GEOID_FIELD {
                Value::from(tract.geoid.as_str())
            } else {
                tract.attributes.get(f).cloned().unwrap_or(Value::Null)
            };
            (f.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{props, NodeId, StreetNode};
    use geo::{polygon, MultiPolygon};

    /// Nodes spaced ~111 m apart along a meridian near Kansas.
    fn line_graph(n: u64) -> StreetGraph {
        let mut g = StreetGraph::new();
        for i in 0..n {
            g.add_node(StreetNode::new(NodeId(i), Point::new(-96.0, 38.0 + i as f64 * 0.001))).unwrap();
        }
        g
    }

    fn grocery(id: u64, lon: f64, lat: f64) -> GroceryFeature {
        GroceryFeature { id, geometry: Geometry::Point(Point::new(lon, lat)), grocery: true }
    }

    #[test]
    fn test_each_grocery_flags_its_single_nearest_node() {
        let mut g = line_graph(5);
        // Near node 0 and between nodes 3 and 4 (closer to 4)
        let groceries = [grocery(100, -96.0001, 38.0), grocery(200, -96.0, 38.0038)];
        let summary = join_groceries(&mut g, &groceries).unwrap();

        let flags: Vec<bool> = g.nodes().iter().map(|n| n.grocery).collect();
        assert_eq!(flags, vec![true, false, false, false, true]);
        assert_eq!(summary.flagged_nodes, 2);
        assert_eq!(summary.unassigned_groceries, 0);

        // ~8.8 m east of node 0
        let d0 = g.nodes()[0].euclidean_to_grocery.unwrap();
        assert!((d0 - 8.8).abs() < 0.5, "{d0}");
        assert!(g.nodes().iter().all(|n| n.euclidean_to_grocery.is_some()));
    }

    #[test]
    fn test_two_groceries_sharing_a_nearest_node_flag_it_once() {
        let mut g = line_graph(3);
        let groceries = [grocery(1, -96.0001, 38.0), grocery(2, -96.0002, 38.0)];
        let summary = join_groceries(&mut g, &groceries).unwrap();
        assert_eq!(summary.flagged_nodes, 1);
        assert!(g.nodes()[0].grocery);
    }

    #[test]
    fn test_polygon_grocery_measures_to_nearest_edge() {
        let mut g = line_graph(1);
        let footprint = polygon![
            (x: -95.9990, y: 37.9995), (x: -95.9980, y: 37.9995),
            (x: -95.9980, y: 38.0005), (x: -95.9990, y: 38.0005),
        ];
        let groceries = [GroceryFeature { id: 1, geometry: Geometry::Polygon(footprint), grocery: true }];
        join_groceries(&mut g, &groceries).unwrap();
        // 0.001° of longitude at 38°N ≈ 87.8 m
        let d = g.nodes()[0].euclidean_to_grocery.unwrap();
        assert!((d - 87.8).abs() < 2.0, "{d}");
    }

    #[test]
    fn test_empty_groceries_is_empty_result() {
        let mut g = line_graph(2);
        assert!(matches!(join_groceries(&mut g, &[]), Err(Error::EmptyResult(_))));
    }

    #[test]
    fn test_node_outside_every_tract_gets_null_fields() {
        let mut g = line_graph(3);
        let tract_poly = polygon![
            (x: -96.01, y: 37.99), (x: -95.99, y: 37.99),
            (x: -95.99, y: 38.0015), (x: -96.01, y: 38.0015),
        ];
        let tract = Tract {
            geoid: "20001".into(),
            geometry: MultiPolygon::new(vec![tract_poly]),
            attributes: props([("RPL_THEMES", Value::Float(0.75)), ("E_TOTPOP", Value::Int(0))]),
        };
        let summary = join_tracts(&mut g, &[tract]).unwrap();
        assert_eq!(summary, TractJoinSummary { matched_nodes: 2, unmatched_nodes: 1 });

        let inside = &g.nodes()[0].demographics;
        assert_eq!(inside["RPL_THEMES"], Value::Float(0.75));
        assert_eq!(inside["E_TOTPOP"], Value::Int(0));
        assert_eq!(inside[GEOID_FIELD], Value::from("20001"));

        let outside = &g.nodes()[2].demographics;
        assert_eq!(outside.len(), 3);
        assert!(outside.values().all(Value::is_null));
    }
}
