//! Coordinate reference systems.
//!
//! Storage and output use geodesic longitude/latitude (EPSG:4326). Distance,
//! nearest-neighbor and containment math runs in the CONUS Albers equal-area
//! projection (EPSG:5070). Region circles are drawn in a local azimuthal
//! equidistant projection centered on the query point, where distances from
//! the center are exact.

use geo::{Coord, MapCoords};
use serde::{Deserialize, Serialize};

pub const GEODESIC_EPSG: u32 = 4326;
pub const EQUAL_AREA_EPSG: u32 = 5070;

/// Mean earth radius (IUGG), meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A planar projection of geodesic coordinates (degrees → meters).
pub trait Projection {
    /// Geodesic `(lon, lat)` degrees to projected `(x, y)` meters.
    fn forward(&self, c: Coord<f64>) -> Coord<f64>;
    /// Projected `(x, y)` meters back to geodesic `(lon, lat)` degrees.
    fn inverse(&self, c: Coord<f64>) -> Coord<f64>;
}

/// Reproject any geometry from geodesic coordinates into `proj`.
pub fn project<G, P>(geom: &G, proj: &P) -> G::Output
where
    G: MapCoords<f64, f64>,
    P: Projection,
{
    geom.map_coords(|c| proj.forward(c))
}

/// Reproject any geometry from `proj` back to geodesic coordinates.
pub fn unproject<G, P>(geom: &G, proj: &P) -> G::Output
where
    G: MapCoords<f64, f64>,
    P: Projection,
{
    geom.map_coords(|c| proj.inverse(c))
}

// ============================================================================
// Ellipsoid
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    pub semi_major: f64,
    pub inverse_flattening: f64,
}

impl Ellipsoid {
    pub const GRS80: Ellipsoid = Ellipsoid {
        semi_major: 6_378_137.0,
        inverse_flattening: 298.257_222_101,
    };

    pub fn eccentricity_squared(&self) -> f64 {
        let f = 1.0 / self.inverse_flattening;
        2.0 * f - f * f
    }
}

// ============================================================================
// Albers equal-area conic (ellipsoidal)
// ============================================================================

const MAX_INVERSE_ITERATIONS: usize = 25;
const INVERSE_TOLERANCE: f64 = 1e-14;

/// Albers conic equal-area projection on an ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlbersEqualArea {
    a: f64,
    e: f64,
    e2: f64,
    lon0: f64,
    n: f64,
    c: f64,
    rho0: f64,
}

impl AlbersEqualArea {
    /// NAD83 / Conus Albers (EPSG:5070).
    pub fn conus() -> Self {
        Self::new(Ellipsoid::GRS80, 23.0, -96.0, 29.5, 45.5)
    }

    /// Build from origin latitude/longitude and the two standard parallels (degrees).
    pub fn new(ellipsoid: Ellipsoid, lat0: f64, lon0: f64, lat1: f64, lat2: f64) -> Self {
        let a = ellipsoid.semi_major;
        let e2 = ellipsoid.eccentricity_squared();
        let e = e2.sqrt();

        let m = |phi: f64| phi.cos() / (1.0 - e2 * phi.sin().powi(2)).sqrt();
        let (phi0, phi1, phi2) = (lat0.to_radians(), lat1.to_radians(), lat2.to_radians());
        let (m1, m2) = (m(phi1), m(phi2));
        let (q0, q1, q2) = (q(phi0.sin(), e, e2), q(phi1.sin(), e, e2), q(phi2.sin(), e, e2));

        let n = if (phi1 - phi2).abs() < 1e-12 {
            phi1.sin()
        } else {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        };
        let c = m1 * m1 + n * q1;
        let rho0 = a * (c - n * q0).sqrt() / n;

        Self { a, e, e2, lon0: lon0.to_radians(), n, c, rho0 }
    }
}

/// Authalic `q` as a function of `sin φ`.
fn q(sin_phi: f64, e: f64, e2: f64) -> f64 {
    let one_minus = 1.0 - e2 * sin_phi * sin_phi;
    (1.0 - e2)
        * (sin_phi / one_minus
            - (1.0 / (2.0 * e)) * ((1.0 - e * sin_phi) / (1.0 + e * sin_phi)).ln())
}

impl Projection for AlbersEqualArea {
    fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        let phi = c.y.to_radians();
        let lambda = c.x.to_radians();
        let rho = self.a * (self.c - self.n * q(phi.sin(), self.e, self.e2)).sqrt() / self.n;
        let theta = self.n * (lambda - self.lon0);
        Coord {
            x: rho * theta.sin(),
            y: self.rho0 - rho * theta.cos(),
        }
    }

    fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        let dy = self.rho0 - c.y;
        let rho = (c.x * c.x + dy * dy).sqrt();
        let theta = if self.n >= 0.0 { c.x.atan2(dy) } else { (-c.x).atan2(-dy) };
        let q_val = (self.c - (rho * self.n / self.a).powi(2)) / self.n;

        let mut phi = (q_val / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..MAX_INVERSE_ITERATIONS {
            let sin_phi = phi.sin();
            let one_minus = 1.0 - self.e2 * sin_phi * sin_phi;
            let delta = one_minus.powi(2) / (2.0 * phi.cos())
                * (q_val / (1.0 - self.e2) - sin_phi / one_minus
                    + (1.0 / (2.0 * self.e))
                        * ((1.0 - self.e * sin_phi) / (1.0 + self.e * sin_phi)).ln());
            phi += delta;
            if delta.abs() < INVERSE_TOLERANCE {
                break;
            }
        }

        Coord {
            x: (self.lon0 + theta / self.n).to_degrees(),
            y: phi.to_degrees(),
        }
    }
}

// ============================================================================
// Local azimuthal equidistant (spherical)
// ============================================================================

/// Azimuthal equidistant projection centered on a point. Distances and
/// bearings from the center are true, so a planar circle of radius `r`
/// is the geodesic circle of radius `r`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalAzimuthal {
    lon0: f64,
    lat0: f64,
    radius: f64,
}

impl LocalAzimuthal {
    pub fn centered_on(lon: f64, lat: f64) -> Self {
        Self { lon0: lon.to_radians(), lat0: lat.to_radians(), radius: EARTH_RADIUS_M }
    }
}

impl Projection for LocalAzimuthal {
    fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        let (phi, dlambda) = (c.y.to_radians(), c.x.to_radians() - self.lon0);
        // Haversine form stays accurate at short range
        let hav = ((phi - self.lat0) / 2.0).sin().powi(2)
            + self.lat0.cos() * phi.cos() * (dlambda / 2.0).sin().powi(2);
        let angle = 2.0 * hav.sqrt().clamp(0.0, 1.0).asin();
        let k = if angle.abs() < 1e-15 { 1.0 } else { angle / angle.sin() };
        Coord {
            x: self.radius * k * phi.cos() * dlambda.sin(),
            y: self.radius * k
                * (self.lat0.cos() * phi.sin() - self.lat0.sin() * phi.cos() * dlambda.cos()),
        }
    }

    fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        let rho = (c.x * c.x + c.y * c.y).sqrt();
        if rho < 1e-9 {
            return Coord { x: self.lon0.to_degrees(), y: self.lat0.to_degrees() };
        }
        let angle = rho / self.radius;
        let (sin_c, cos_c) = angle.sin_cos();
        let phi = (cos_c * self.lat0.sin() + c.y * sin_c * self.lat0.cos() / rho)
            .clamp(-1.0, 1.0)
            .asin();
        let lambda = self.lon0
            + (c.x * sin_c).atan2(rho * self.lat0.cos() * cos_c - c.y * self.lat0.sin() * sin_c);
        Coord { x: normalize_lon(lambda).to_degrees(), y: phi.to_degrees() }
    }
}

/// Wrap a longitude in radians into `[-π, π)`.
fn normalize_lon(lambda: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    (lambda + PI).rem_euclid(TAU) - PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    #[test]
    fn test_albers_origin_maps_to_zero() {
        let p = AlbersEqualArea::conus().forward(Coord { x: -96.0, y: 23.0 });
        assert!(p.x.abs() < 1e-6 && p.y.abs() < 1e-6, "{p:?}");
    }

    #[test]
    fn test_albers_symmetric_about_central_meridian() {
        let proj = AlbersEqualArea::conus();
        let east = proj.forward(Coord { x: -90.0, y: 40.0 });
        let west = proj.forward(Coord { x: -102.0, y: 40.0 });
        assert!((east.x + west.x).abs() < 1e-6);
        assert!((east.y - west.y).abs() < 1e-6);
        assert!(east.x > 0.0);
    }

    #[test]
    fn test_albers_round_trip() {
        let proj = AlbersEqualArea::conus();
        for &(lon, lat) in &[(-122.42, 37.77), (-73.99, 40.73), (-87.63, 41.88), (-80.19, 25.76)] {
            let back = proj.inverse(proj.forward(Coord { x: lon, y: lat }));
            assert!((back.x - lon).abs() < 1e-9, "lon {lon} -> {}", back.x);
            assert!((back.y - lat).abs() < 1e-9, "lat {lat} -> {}", back.y);
        }
    }

    #[test]
    fn test_albers_preserves_area() {
        // One-degree cell at 40°N: ~9.40e9 m² on the sphere
        let cell = polygon![
            (x: -96.0, y: 40.0), (x: -95.0, y: 40.0),
            (x: -95.0, y: 41.0), (x: -96.0, y: 41.0), (x: -96.0, y: 40.0),
        ];
        let area = project(&cell, &AlbersEqualArea::conus()).unsigned_area();
        let expected = EARTH_RADIUS_M.powi(2)
            * 1f64.to_radians()
            * (41f64.to_radians().sin() - 40f64.to_radians().sin());
        assert!((area - expected).abs() / expected < 0.01, "area {area} vs {expected}");
    }

    #[test]
    fn test_azimuthal_distance_from_center_is_true() {
        let proj = LocalAzimuthal::centered_on(-87.63, 41.88);
        let p = proj.inverse(Coord { x: 0.0, y: 1000.0 });
        // 1 km north ≈ 0.008993 degrees of latitude
        assert!((p.y - 41.88 - 1000.0 / EARTH_RADIUS_M * 180.0 / std::f64::consts::PI).abs() < 1e-9);
        assert!((p.x + 87.63).abs() < 1e-9);
        let fwd = proj.forward(p);
        assert!((fwd.y - 1000.0).abs() < 1e-6 && fwd.x.abs() < 1e-6);
    }

    #[test]
    fn test_azimuthal_inverse_wraps_longitude() {
        let proj = LocalAzimuthal::centered_on(179.99, 0.0);
        // 5 km east of 179.99°E lands just past the antimeridian
        let p = proj.inverse(Coord { x: 5_000.0, y: 0.0 });
        assert!((-180.0..180.0).contains(&p.x), "{p:?}");
        assert!((p.x - (179.99 + 5_000.0 / EARTH_RADIUS_M * 180.0 / std::f64::consts::PI - 360.0)).abs() < 1e-9);
        let back = proj.forward(p);
        assert!((back.x - 5_000.0).abs() < 1e-6 && back.y.abs() < 1e-6, "{back:?}");
    }
}
