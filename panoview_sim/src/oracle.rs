//! Ground truth oracle for scenario runs.
//!
//! The Oracle fabricates panorama sets with a known shape:
//! - Street walks (a bending line of captures)
//! - Plazas (dense blobs) with distant outliers
//! - Compass rings around a hub
//! - City grids, scattered singletons
//! - Dirty feeds (NaN, out-of-range, duplicate ids mixed in)
//!
//! All randomness flows from one seed, so a failing layout is reproducible
//! from its seed number.

use nalgebra::Vector2;
use panoview_core::{Panorama, PanoramaId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde_json::json;

/// The Oracle - deterministic panorama layout generator.
pub struct Oracle {
    /// Master seed (for logging)
    seed: u64,

    rng: ChaCha8Rng,

    /// Next panorama id to hand out
    next_id: PanoramaId,

    /// Capture-position noise in degrees (None = exact positions)
    jitter: Option<Normal<f64>>,
}

impl Oracle {
    /// Creates a new Oracle with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 1,
            jitter: Normal::new(0.0, 0.00002).ok(), // ~2 m GPS noise
        }
    }

    /// Sets the capture noise standard deviation in degrees.
    ///
    /// A non-finite or negative value disables noise.
    pub fn set_jitter(&mut self, std_dev_deg: f64) {
        self.jitter = Normal::new(0.0, std_dev_deg).ok();
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn noise(&mut self) -> Vector2<f64> {
        match &self.jitter {
            Some(normal) => Vector2::new(normal.sample(&mut self.rng), normal.sample(&mut self.rng)),
            None => Vector2::zeros(),
        }
    }

    /// Emits one panorama at `(lat, lon)` plus capture noise.
    fn capture(&mut self, lat: f64, lon: f64) -> Panorama {
        let id = self.next_id;
        self.next_id += 1;
        let n = self.noise();
        let mut lon = lon + n.y;
        if lon > 180.0 {
            lon -= 360.0;
        } else if lon < -180.0 {
            lon += 360.0;
        }
        Panorama::new(id, (lat + n.x).clamp(-90.0, 90.0), lon)
            .with_field("title", json!(format!("Panorama {}", id)))
    }

    /// A street of `count` captures `spacing_deg` apart, starting at
    /// `origin` heading `heading_deg` and drifting by up to `max_turn_deg`
    /// per step.
    pub fn street_walk(
        &mut self,
        origin: (f64, f64),
        count: usize,
        spacing_deg: f64,
        heading_deg: f64,
        max_turn_deg: f64,
    ) -> Vec<Panorama> {
        let mut out = Vec::with_capacity(count);
        let (mut lat, mut lon) = origin;
        let mut heading = heading_deg;

        for _ in 0..count {
            out.push(self.capture(lat, lon));
            if max_turn_deg > 0.0 {
                heading += self.rng.gen_range(-max_turn_deg..=max_turn_deg);
            }
            let step = Vector2::new(heading.to_radians().cos(), heading.to_radians().sin()) * spacing_deg;
            lat += step.x;
            lon += step.y / lat.to_radians().cos().max(0.01);
        }
        out
    }

    /// `count` captures uniformly inside a square of half-width `radius_deg`.
    pub fn plaza(&mut self, center: (f64, f64), count: usize, radius_deg: f64) -> Vec<Panorama> {
        (0..count)
            .map(|_| {
                let dlat = self.rng.gen_range(-radius_deg..=radius_deg);
                let dlon = self.rng.gen_range(-radius_deg..=radius_deg);
                self.capture(center.0 + dlat, center.1 + dlon)
            })
            .collect()
    }

    /// A hub capture followed by `count` captures evenly spaced on a ring.
    pub fn compass_ring(&mut self, center: (f64, f64), count: usize, radius_deg: f64) -> Vec<Panorama> {
        let mut out = vec![self.capture(center.0, center.1)];
        for k in 0..count {
            let theta = (k as f64 * 360.0 / count.max(1) as f64).to_radians();
            out.push(self.capture(
                center.0 + radius_deg * theta.cos(),
                center.1 + radius_deg * theta.sin(),
            ));
        }
        out
    }

    /// A `rows` x `cols` block grid.
    pub fn city_grid(&mut self, origin: (f64, f64), rows: usize, cols: usize, spacing_deg: f64) -> Vec<Panorama> {
        let mut out = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                out.push(self.capture(
                    origin.0 + r as f64 * spacing_deg,
                    origin.1 + c as f64 * spacing_deg,
                ));
            }
        }
        out
    }

    /// `count` captures scattered over a box at least `min_gap_deg` apart
    /// on the latitude axis, so none has a neighbour.
    pub fn scattered(&mut self, origin: (f64, f64), count: usize, min_gap_deg: f64) -> Vec<Panorama> {
        (0..count)
            .map(|i| {
                let lon_offset = self.rng.gen_range(-min_gap_deg..=min_gap_deg);
                self.capture(origin.0 + i as f64 * min_gap_deg, origin.1 + lon_offset)
            })
            .collect()
    }

    /// Corrupts a copy of `panoramas`: roughly `fraction` of records get
    /// NaN or out-of-range coordinates, and the same share is re-emitted
    /// with a duplicate id.
    pub fn corrupt(&mut self, panoramas: &[Panorama], fraction: f64) -> Vec<Panorama> {
        let mut out = Vec::with_capacity(panoramas.len() * 2);
        for pano in panoramas {
            let mut p = pano.clone();
            if self.rng.gen_bool(fraction.clamp(0.0, 1.0)) {
                match self.rng.gen_range(0..3) {
                    0 => p.latitude = f64::NAN,
                    1 => p.latitude = 91.0 + self.rng.gen_range(0.0..10.0),
                    _ => p.longitude = -181.0 - self.rng.gen_range(0.0..10.0),
                }
            }
            out.push(p);
            if self.rng.gen_bool(fraction.clamp(0.0, 1.0)) {
                let mut dup = pano.clone();
                dup.latitude += 0.0005;
                out.push(dup);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_ids_are_sequential() {
        let mut oracle = Oracle::new(42);
        let a = oracle.plaza((45.0, 7.0), 3, 0.001);
        let b = oracle.plaza((45.0, 7.0), 2, 0.001);
        let ids: Vec<i64> = a.iter().chain(b.iter()).map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_oracle_deterministic_layouts() {
        let mut o1 = Oracle::new(7);
        let mut o2 = Oracle::new(7);
        assert_eq!(
            o1.street_walk((45.0, 7.0), 20, 0.0005, 30.0, 20.0),
            o2.street_walk((45.0, 7.0), 20, 0.0005, 30.0, 20.0)
        );

        let mut o3 = Oracle::new(8);
        let mut o1 = Oracle::new(7);
        assert_ne!(
            o1.street_walk((45.0, 7.0), 20, 0.0005, 30.0, 20.0),
            o3.street_walk((45.0, 7.0), 20, 0.0005, 30.0, 20.0)
        );
    }

    #[test]
    fn test_oracle_ring_shape() {
        let mut oracle = Oracle::new(1);
        oracle.set_jitter(0.0);
        let ring = oracle.compass_ring((0.0, 0.0), 4, 0.002);
        assert_eq!(ring.len(), 5);
        assert_eq!((ring[0].latitude, ring[0].longitude), (0.0, 0.0));
        assert!((ring[1].latitude - 0.002).abs() < 1e-12);
        assert!((ring[2].longitude - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_oracle_corrupt_injects_bad_rows() {
        let mut oracle = Oracle::new(3);
        let clean = oracle.city_grid((45.0, 7.0), 10, 10, 0.0005);
        let dirty = oracle.corrupt(&clean, 0.3);
        assert!(dirty.len() > clean.len());
        assert!(dirty.iter().any(|p| !p.has_valid_position()));
    }
}
