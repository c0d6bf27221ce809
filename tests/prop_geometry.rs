//! Property tests for region construction and reprojection.

use accessgraph::crs::{project, unproject, AlbersEqualArea, LocalAzimuthal, Projection};
use accessgraph::region::{Region, DEFAULT_CIRCLE_SEGMENTS};
use geo::{Area, Contains, Coord, Intersects, Point};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_query_scope_covers_area_of_analysis(
        lat in -60.0f64..60.0,
        lon in -170.0f64..170.0,
        radius in 10.0f64..50_000.0,
        buffer_share in 0.0f64..2.0,
    ) {
        let buffer = radius * buffer_share;
        let region = Region::new(lat, lon, radius, buffer).unwrap();
        let polys = region.polygons(DEFAULT_CIRCLE_SEGMENTS).unwrap();

        prop_assert!(polys.query_scope.unsigned_area() >= polys.area_of_analysis.unsigned_area());
        for c in polys.area_of_analysis.exterior().coords() {
            prop_assert!(polys.query_scope.intersects(&Point::from(*c)));
        }
        if buffer_share > 0.01 {
            prop_assert!(polys.query_scope.contains(&polys.area_of_analysis));
        }
        prop_assert!(polys.in_area_of_analysis(&region.center));
    }

    #[test]
    fn test_albers_round_trip_within_tolerance(
        lon in -124.0f64..-67.0,
        lat in 25.0f64..49.0,
    ) {
        let proj = AlbersEqualArea::conus();
        let p = Point::new(lon, lat);
        let back = unproject(&project(&p, &proj), &proj);
        prop_assert!((back.x() - lon).abs() < 1e-6, "{back:?}");
        prop_assert!((back.y() - lat).abs() < 1e-6, "{back:?}");
    }

    #[test]
    fn test_azimuthal_preserves_distance_from_center(
        lat in -60.0f64..60.0,
        lon in -170.0f64..170.0,
        dx in -20_000.0f64..20_000.0,
        dy in -20_000.0f64..20_000.0,
    ) {
        let proj = LocalAzimuthal::centered_on(lon, lat);
        let there = proj.inverse(Coord { x: dx, y: dy });
        let again = proj.forward(there);
        prop_assert!((again.x - dx).abs() < 1e-6 && (again.y - dy).abs() < 1e-6, "{again:?}");
    }
}
