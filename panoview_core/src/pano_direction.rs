//! Directional scoring: which neighbour lies "ahead", "left", ...
//!
//! Three scores are blended from two ingredients, proximity and angular
//! alignment:
//! - **confidence** `= 0.6 * distance + 0.4 * alignment` (vs viewing angle)
//! - **directional** `= 0.7 * angle + 0.2 * distance + 0.1 * confidence` (vs target)
//!
//! where every component is clamped to `[0, 1]`. Weights come from
//! [`NavigatorConfig`].

use crate::navigator::{NavError, NavigatorConfig};
use crate::pano_geo::{angle_diff, bearing_deg, normalize_angle, Cardinal};
use crate::pano_space::Panorama;
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

// ============================================================================
// DIRECTION REQUEST
// ============================================================================

/// A requested travel direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
    /// Arbitrary compass bearing in degrees
    Bearing(f64),
}

impl Direction {
    /// Compass heading in `[0, 360)`.
    pub fn degrees(&self) -> f64 {
        match self {
            Direction::North => 0.0,
            Direction::East => 90.0,
            Direction::South => 180.0,
            Direction::West => 270.0,
            Direction::Bearing(deg) => normalize_angle(*deg),
        }
    }
}

impl From<f64> for Direction {
    fn from(deg: f64) -> Self {
        Direction::Bearing(deg)
    }
}

impl std::str::FromStr for Direction {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "north" | "n" => Ok(Direction::North),
            "east" | "e" => Ok(Direction::East),
            "south" | "s" => Ok(Direction::South),
            "west" | "w" => Ok(Direction::West),
            other => match other.parse::<f64>() {
                Ok(deg) if deg.is_finite() => Ok(Direction::Bearing(deg)),
                _ => Err(NavError::InvalidDirection(s.to_string())),
            },
        }
    }
}

// ============================================================================
// CANDIDATE DESCRIPTION
// ============================================================================

/// A neighbouring panorama as seen from an origin, recomputed per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanoramaDirection {
    pub panorama: Panorama,

    /// Great-circle distance from the origin (km)
    pub distance_km: f64,

    /// Initial bearing from the origin, `[0, 360)`
    pub bearing_deg: f64,

    pub cardinal: Cardinal,

    /// Within the half-angle of the viewing direction
    pub in_view_angle: bool,

    /// Proximity/alignment blend in `[0, 1]`
    pub confidence: f64,
}

/// `max(0, 1 - distance / radius)`
#[inline]
pub fn distance_score(distance_km: f64, radius_km: f64) -> f64 {
    (1.0 - distance_km / radius_km).max(0.0)
}

/// `max(0, 1 - angle_diff / 180)`
#[inline]
pub fn alignment_score(bearing: f64, target: f64) -> f64 {
    (1.0 - angle_diff(bearing, target) / 180.0).max(0.0)
}

/// Describes `candidate` relative to an origin and a viewing angle.
///
/// # Arguments
/// * `origin` - `(latitude, longitude)` of the viewer
/// * `candidate` - The neighbour
/// * `distance_km` - Precomputed origin→candidate distance
/// * `viewing_angle` - Viewer heading in degrees
/// * `radius_km` - Distance at which proximity scores reach zero
pub fn describe_candidate(
    origin: (f64, f64),
    candidate: &Panorama,
    distance_km: f64,
    viewing_angle: f64,
    radius_km: f64,
    config: &NavigatorConfig,
) -> PanoramaDirection {
    let bearing = bearing_deg(origin.0, origin.1, candidate.latitude, candidate.longitude);
    let confidence = config.confidence_distance_weight * distance_score(distance_km, radius_km)
        + config.confidence_alignment_weight * alignment_score(bearing, viewing_angle);

    PanoramaDirection {
        panorama: candidate.clone(),
        distance_km,
        bearing_deg: bearing,
        cardinal: Cardinal::from_bearing(bearing),
        in_view_angle: angle_diff(bearing, viewing_angle) <= config.view_half_angle_deg,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

/// True when `a` should be listed before `b`.
///
/// Confidences within `tie_band` of each other count as a tie and the
/// closer panorama wins.
fn precedes(a: &PanoramaDirection, b: &PanoramaDirection, tie_band: f64) -> bool {
    if (a.confidence - b.confidence).abs() <= tie_band {
        a.distance_km < b.distance_km
    } else {
        a.confidence > b.confidence
    }
}

/// Orders candidates best-first.
///
/// The banded comparison is not transitive, so it cannot feed
/// `sort_by`; a stable insertion sort applies it pairwise instead.
pub fn rank_candidates(candidates: &mut [PanoramaDirection], tie_band: f64) {
    for i in 1..candidates.len() {
        let mut j = i;
        while j > 0 && precedes(&candidates[j], &candidates[j - 1], tie_band) {
            candidates.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Directional score of a candidate toward `target`.
pub fn directional_score(
    candidate: &PanoramaDirection,
    target: f64,
    radius_km: f64,
    config: &NavigatorConfig,
) -> f64 {
    config.directional_angle_weight * alignment_score(candidate.bearing_deg, target)
        + config.directional_distance_weight * distance_score(candidate.distance_km, radius_km)
        + config.directional_confidence_weight * candidate.confidence
}

/// Best candidate within `tolerance` degrees of `target`.
///
/// # Returns
/// The highest directional score (first one on ties), or `None` when no
/// candidate's bearing is within tolerance.
pub fn find_best_directional<'a>(
    candidates: &'a [PanoramaDirection],
    target: f64,
    tolerance: f64,
    radius_km: f64,
    config: &NavigatorConfig,
) -> Option<&'a PanoramaDirection> {
    let target = normalize_angle(target);
    let mut best: Option<(&PanoramaDirection, f64)> = None;

    for c in candidates {
        if angle_diff(c.bearing_deg, target) > tolerance {
            continue;
        }
        let score = directional_score(c, target, radius_km, config);
        match best {
            Some((_, s)) if score <= s => {}
            _ => best = Some((c, score)),
        }
    }

    best.map(|(c, _)| c)
}

// ============================================================================
// CLICK → BEARING
// ============================================================================

/// World bearing of a click on the unit viewing sphere.
///
/// Only the horizontal `(x, z)` plane matters (`y` is up). The angle
/// `atan2(z, x)` is rotated by the camera heading and wrapped to `[0, 360)`.
/// A click straight up or down falls back to the camera heading.
pub fn click_bearing(click: &Vector3<f64>, camera_orientation_deg: f64) -> f64 {
    let horizontal = Vector2::new(click.x, click.z);
    let local = match horizontal.try_normalize(1e-12) {
        Some(h) => h.y.atan2(h.x).to_degrees(),
        None => 0.0,
    };
    normalize_angle(local + camera_orientation_deg)
}
