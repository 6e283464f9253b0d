//! Geodesy primitives for panorama navigation
//!
//! All distances are great-circle kilometres on a spherical earth, all
//! angles are compass degrees (0° = north, increasing clockwise).
//!
//! Distance thresholds in [`crate::NavigatorConfig`] are written in decimal
//! degrees; [`degrees_to_km`] / [`km_to_degrees`] are the single place where
//! the two units meet.

use geo::{HaversineBearing, HaversineDistance, Point};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Earth radius used by the haversine formula (km).
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Sphere radius `geo`'s haversine works on (m).
const GEO_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// Length of one degree of arc on the great circle (km).
pub const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * PI / 180.0;

// ============================================================================
// DISTANCE / BEARING
// ============================================================================

/// Great-circle distance between two WGS84 points in kilometres.
///
/// Symmetric, and exactly zero for identical inputs. Non-finite inputs
/// propagate as NaN.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let from = Point::new(lon1, lat1);
    let to = Point::new(lon2, lat2);
    // Central angle from geo, then onto our sphere
    from.haversine_distance(&to) / GEO_MEAN_RADIUS_M * EARTH_RADIUS_KM
}

/// Initial (forward azimuth) bearing from the first point to the second.
///
/// # Returns
/// Compass degrees in `[0, 360)`. Identical points yield `0.0` (north).
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let from = Point::new(lon1, lat1);
    normalize_angle(from.haversine_bearing(Point::new(lon2, lat2)))
}

/// Wraps any angle into `[0, 360)`.
#[inline]
pub fn normalize_angle(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Smallest unsigned difference between two headings, in `[0, 180]`.
#[inline]
pub fn angle_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % 360.0;
    d.min(360.0 - d)
}

/// Converts a decimal-degree arc length to kilometres.
#[inline]
pub fn degrees_to_km(deg: f64) -> f64 {
    deg * KM_PER_DEGREE
}

/// Converts kilometres to a decimal-degree arc length.
#[inline]
pub fn km_to_degrees(km: f64) -> f64 {
    km / KM_PER_DEGREE
}

/// True when the pair is a usable WGS84 coordinate.
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

// ============================================================================
// CARDINAL BUCKETS
// ============================================================================

/// One of eight 45°-wide compass sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinal {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Cardinal {
    /// Buckets a bearing. North covers `(337.5, 360]` and `[0, 22.5)`.
    pub fn from_bearing(bearing: f64) -> Self {
        let b = normalize_angle(bearing);
        if !(22.5..=337.5).contains(&b) {
            Cardinal::N
        } else if b < 67.5 {
            Cardinal::NE
        } else if b < 112.5 {
            Cardinal::E
        } else if b < 157.5 {
            Cardinal::SE
        } else if b < 202.5 {
            Cardinal::S
        } else if b < 247.5 {
            Cardinal::SW
        } else if b < 292.5 {
            Cardinal::W
        } else {
            Cardinal::NW
        }
    }

    /// Centre heading of the sector.
    pub fn degrees(&self) -> f64 {
        match self {
            Cardinal::N => 0.0,
            Cardinal::NE => 45.0,
            Cardinal::E => 90.0,
            Cardinal::SE => 135.0,
            Cardinal::S => 180.0,
            Cardinal::SW => 225.0,
            Cardinal::W => 270.0,
            Cardinal::NW => 315.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Cardinal::N => "N",
            Cardinal::NE => "NE",
            Cardinal::E => "E",
            Cardinal::SE => "SE",
            Cardinal::S => "S",
            Cardinal::SW => "SW",
            Cardinal::W => "W",
            Cardinal::NW => "NW",
        }
    }
}

impl std::fmt::Display for Cardinal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_haversine_known_distance() {
        // One millidegree of longitude on the equator
        let d = haversine_km(0.0, 0.0, 0.0, 0.001);
        assert_relative_eq!(d, degrees_to_km(0.001), epsilon = 1e-6);

        // Paris -> London is roughly 344 km
        let paris_london = haversine_km(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((paris_london - 343.5).abs() < 2.0, "got {}", paris_london);
    }

    #[test]
    fn test_haversine_uses_6371_km_sphere() {
        let one_degree = 6371.0 * PI / 180.0;
        assert_relative_eq!(haversine_km(0.0, 0.0, 0.0, 1.0), one_degree, epsilon = 1e-9);
        assert_relative_eq!(haversine_km(0.0, 0.0, 1.0, 0.0), one_degree, epsilon = 1e-9);
        assert_relative_eq!(KM_PER_DEGREE, one_degree, epsilon = 1e-12);
    }

    #[test]
    fn test_bearing_cardinal_points() {
        assert_relative_eq!(bearing_deg(0.0, 0.0, 0.001, 0.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_deg(0.0, 0.0, 0.0, 0.001), 90.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_deg(0.0, 0.0, -0.001, 0.0), 180.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_deg(0.0, 0.0, 0.0, -0.001), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_angle_diff_wraps() {
        assert_relative_eq!(angle_diff(350.0, 10.0), 20.0);
        assert_relative_eq!(angle_diff(10.0, 350.0), 20.0);
        assert_relative_eq!(angle_diff(0.0, 180.0), 180.0);
        assert_relative_eq!(angle_diff(-90.0, 270.0), 0.0);
        assert_relative_eq!(angle_diff(720.0, 90.0), 90.0);
    }

    #[test]
    fn test_normalize_angle() {
        assert_relative_eq!(normalize_angle(-90.0), 270.0);
        assert_relative_eq!(normalize_angle(360.0), 0.0);
        assert_relative_eq!(normalize_angle(725.0), 5.0);
        assert!(normalize_angle(-1e-18) < 360.0);
    }

    #[test]
    fn test_cardinal_buckets() {
        assert_eq!(Cardinal::from_bearing(0.0), Cardinal::N);
        assert_eq!(Cardinal::from_bearing(22.4), Cardinal::N);
        assert_eq!(Cardinal::from_bearing(22.5), Cardinal::NE);
        assert_eq!(Cardinal::from_bearing(90.0), Cardinal::E);
        assert_eq!(Cardinal::from_bearing(200.0), Cardinal::S);
        assert_eq!(Cardinal::from_bearing(337.5), Cardinal::NW);
        assert_eq!(Cardinal::from_bearing(337.6), Cardinal::N);
        assert_eq!(Cardinal::from_bearing(359.99), Cardinal::N);
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(is_valid_coordinate(45.0, 7.0));
        assert!(is_valid_coordinate(-90.0, 180.0));
        assert!(!is_valid_coordinate(90.1, 0.0));
        assert!(!is_valid_coordinate(0.0, -180.5));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
        assert!(!is_valid_coordinate(0.0, f64::INFINITY));
    }

    proptest! {
        #[test]
        fn prop_distance_symmetric(
            lat1 in -89.0f64..89.0, lon1 in -179.0f64..179.0,
            lat2 in -89.0f64..89.0, lon2 in -179.0f64..179.0,
        ) {
            let ab = haversine_km(lat1, lon1, lat2, lon2);
            let ba = haversine_km(lat2, lon2, lat1, lon1);
            prop_assert!((ab - ba).abs() <= 1e-9 * ab.max(1.0));
            prop_assert_eq!(haversine_km(lat1, lon1, lat1, lon1), 0.0);
        }

        #[test]
        fn prop_bearing_in_range(
            lat1 in -89.0f64..89.0, lon1 in -179.0f64..179.0,
            lat2 in -89.0f64..89.0, lon2 in -179.0f64..179.0,
        ) {
            let b = bearing_deg(lat1, lon1, lat2, lon2);
            prop_assert!((0.0..360.0).contains(&b), "bearing {} out of range", b);
        }

        #[test]
        fn prop_angle_diff_bounded(a in -1000.0f64..1000.0, b in -1000.0f64..1000.0) {
            let d = angle_diff(a, b);
            prop_assert!((0.0..=180.0).contains(&d));
        }
    }
}
