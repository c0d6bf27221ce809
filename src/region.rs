//! Region construction: a geocoded center plus radius and buffer become the
//! inner area-of-analysis circle and the outer query-scope circle.

use geo::{Contains, Coord, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::crs::{LocalAzimuthal, Projection};
use crate::{Error, Result};

/// Vertices per circle when none is configured.
pub const DEFAULT_CIRCLE_SEGMENTS: usize = 64;

/// A circular study region around a center point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Geodesic (lon, lat) center.
    pub center: Point<f64>,
    pub radius_m: f64,
    pub buffer_m: f64,
}

/// The two polygons derived from a [`Region`], both in geodesic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPolygons {
    /// Radius only. Used for final tagging.
    pub area_of_analysis: Polygon<f64>,
    /// Radius + buffer. Used for every source fetch.
    pub query_scope: Polygon<f64>,
}

impl Region {
    /// Validate a center and its circle sizes. The radius must be positive;
    /// the buffer may be zero.
    pub fn new(lat: f64, lon: f64, radius_m: f64, buffer_m: f64) -> Result<Self> {
        if !(lat.is_finite() && (-90.0..=90.0).contains(&lat)) {
            return Err(Error::InvalidRegion(format!("latitude {lat} out of range")));
        }
        if !(lon.is_finite() && (-180.0..=180.0).contains(&lon)) {
            return Err(Error::InvalidRegion(format!("longitude {lon} out of range")));
        }
        if !(radius_m.is_finite() && radius_m > 0.0) {
            return Err(Error::InvalidRegion(format!("radius must be positive, got {radius_m}")));
        }
        if !(buffer_m.is_finite() && buffer_m >= 0.0) {
            return Err(Error::InvalidRegion(format!("buffer must be non-negative, got {buffer_m}")));
        }
        Ok(Self { center: Point::new(lon, lat), radius_m, buffer_m })
    }

    pub fn lat(&self) -> f64 { self.center.y() }
    pub fn lon(&self) -> f64 { self.center.x() }

    /// Build both circles with the given vertex count.
    pub fn polygons(&self, segments: usize) -> Result<RegionPolygons> {
        if segments < 3 {
            return Err(Error::InvalidRegion(format!("circle needs at least 3 segments, got {segments}")));
        }
        let proj = LocalAzimuthal::centered_on(self.lon(), self.lat());
        Ok(RegionPolygons {
            area_of_analysis: circle(&proj, self.radius_m, segments)?,
            query_scope: circle(&proj, self.radius_m + self.buffer_m, segments)?,
        })
    }
}

/// Buffer the projection center by `radius_m` and reproject to geodesic.
///
/// Geodesic polygons are planar in (lon, lat), so a circle that straddles
/// the antimeridian has no single-ring representation and is rejected.
fn circle(proj: &LocalAzimuthal, radius_m: f64, segments: usize) -> Result<Polygon<f64>> {
    let step = std::f64::consts::TAU / segments as f64;
    let ring: Vec<Coord<f64>> = (0..segments)
        .map(|i| {
            let (sin, cos) = (i as f64 * step).sin_cos();
            proj.inverse(Coord { x: radius_m * cos, y: radius_m * sin })
        })
        .collect();
    let wraps = ring
        .iter()
        .zip(ring.iter().cycle().skip(1))
        .any(|(a, b)| (a.x - b.x).abs() > 180.0);
    if wraps {
        return Err(Error::InvalidRegion(format!(
            "circle of {radius_m} m crosses the antimeridian"
        )));
    }
    // LineString -> Polygon closes the ring
    Ok(Polygon::new(LineString::from(ring), vec![]))
}

impl RegionPolygons {
    /// Strict interior test against the area of analysis.
    pub fn in_area_of_analysis(&self, point: &Point<f64>) -> bool {
        self.area_of_analysis.contains(point)
    }
}
