//! The "SPACE" layer - Grid Spatial Index + Distance Memo
//!
//! Panoramas are bucketed into a fixed lat/lon grid (default 0.001°).
//! Radius queries run in two phases:
//! 1. Coarse pass: enumerate the grid cells that can intersect the radius
//! 2. Exact pass: keep only candidates whose haversine distance fits
//!
//! Both structures are built once per panorama set and never patched in
//! place; a new set means a new index and a new cache.

use crate::pano_geo::{haversine_km, is_valid_coordinate, km_to_degrees};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// Panorama identity as issued by the backing data source.
pub type PanoramaId = i64;

// ============================================================================
// PANORAMA RECORD
// ============================================================================

/// A geo-tagged 360° panorama.
///
/// Only `id`, `latitude` and `longitude` matter to navigation; everything
/// else the data source sends (title, image URL, hotspots, ...) rides along
/// untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panorama {
    pub id: PanoramaId,

    /// WGS84 latitude in decimal degrees
    pub latitude: f64,

    /// WGS84 longitude in decimal degrees
    pub longitude: f64,

    /// Opaque fields owned by the data source
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Panorama {
    pub fn new(id: PanoramaId, latitude: f64, longitude: f64) -> Self {
        Self {
            id,
            latitude,
            longitude,
            extra: serde_json::Map::new(),
        }
    }

    /// Attaches an opaque field.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Whether this panorama can take part in spatial indexing.
    #[inline]
    pub fn has_valid_position(&self) -> bool {
        is_valid_coordinate(self.latitude, self.longitude)
    }
}

// ============================================================================
// DISTANCE CACHE
// ============================================================================

type QuantizedCoord = (i64, i64);

/// Memo of haversine distances keyed by quantised coordinate pairs.
///
/// Keys are rounded to `precision` decimal places and stored in sorted order,
/// so `(a, b)` and `(b, a)` share one entry. Interior mutability lets
/// read-only navigator queries populate it.
#[derive(Debug)]
pub struct DistanceCache {
    scale: f64,
    entries: Mutex<HashMap<(QuantizedCoord, QuantizedCoord), f64>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DistanceCache {
    /// Creates an empty cache quantising to `precision` decimal places.
    pub fn new(precision: u32) -> Self {
        Self {
            scale: 10f64.powi(precision as i32),
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn quantize(&self, lat: f64, lon: f64) -> QuantizedCoord {
        ((lat * self.scale).round() as i64, (lon * self.scale).round() as i64)
    }

    /// Great-circle distance in km, memoised.
    ///
    /// Non-finite coordinates bypass the memo (they would all collapse onto
    /// one quantised key) and yield NaN.
    pub fn distance_km(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        if !(lat1.is_finite() && lon1.is_finite() && lat2.is_finite() && lon2.is_finite()) {
            return f64::NAN;
        }

        let a = self.quantize(lat1, lon1);
        let b = self.quantize(lat2, lon2);
        let key = if a <= b { (a, b) } else { (b, a) };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(d) = entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *d;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Compute from the sorted key so both argument orders agree bit-for-bit
        let (p, q) = key;
        let d = haversine_km(
            p.0 as f64 / self.scale,
            p.1 as f64 / self.scale,
            q.0 as f64 / self.scale,
            q.1 as f64 / self.scale,
        );
        entries.insert(key, d);
        d
    }

    /// Distance between two panoramas.
    pub fn between(&self, a: &Panorama, b: &Panorama) -> f64 {
        self.distance_km(a.latitude, a.longitude, b.latitude, b.longitude)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `(hits, misses)`.
    pub fn counters(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}

// ============================================================================
// GRID INDEX
// ============================================================================

/// Discretised grid cell: `floor(coordinate / grid_size)` on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridKey {
    pub lat_cell: i64,
    pub lon_cell: i64,
}

/// Grid bucketing of a panorama slice.
///
/// Cells hold indices into the slice passed to [`SpatialIndex::build`], in
/// slice order. Panoramas with invalid coordinates are left out and counted
/// in `rejected`.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    grid_size_deg: f64,

    /// Number of longitude cells around the globe (for antimeridian wrap)
    lon_cells: i64,

    cells: HashMap<GridKey, Vec<usize>>,

    indexed: usize,
    rejected: usize,
}

impl SpatialIndex {
    /// Builds the index for `panoramas`.
    ///
    /// # Arguments
    /// * `panoramas` - The authoritative panorama set
    /// * `grid_size_deg` - Cell edge in decimal degrees (must be > 0)
    pub fn build(panoramas: &[Panorama], grid_size_deg: f64) -> Self {
        let mut index = Self {
            grid_size_deg,
            lon_cells: ((360.0 / grid_size_deg).round() as i64).max(1),
            cells: HashMap::new(),
            indexed: 0,
            rejected: 0,
        };

        for (i, pano) in panoramas.iter().enumerate() {
            if !pano.has_valid_position() {
                warn!(
                    "Panorama {} has invalid coordinates ({}, {}); left out of spatial index",
                    pano.id, pano.latitude, pano.longitude
                );
                index.rejected += 1;
                continue;
            }
            let key = index.key_for(pano.latitude, pano.longitude);
            index.cells.entry(key).or_default().push(i);
            index.indexed += 1;
        }

        index
    }

    /// Grid cell for a coordinate. Longitude cells wrap at the antimeridian.
    pub fn key_for(&self, lat: f64, lon: f64) -> GridKey {
        GridKey {
            lat_cell: (lat / self.grid_size_deg).floor() as i64,
            lon_cell: self.wrap_lon_cell((lon / self.grid_size_deg).floor() as i64),
        }
    }

    fn wrap_lon_cell(&self, cell: i64) -> i64 {
        let half = self.lon_cells / 2;
        (cell + half).rem_euclid(self.lon_cells) - half
    }

    /// Members of one cell.
    pub fn cell(&self, key: &GridKey) -> &[usize] {
        self.cells.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Coarse pre-filter: every indexed panorama whose cell may lie within
    /// `radius_km` of the query point. Superset of the true answer.
    pub fn candidates(&self, lat: f64, lon: f64, radius_km: f64) -> Vec<usize> {
        if !is_valid_coordinate(lat, lon) || !(radius_km >= 0.0) {
            return Vec::new();
        }

        let radius_deg = km_to_degrees(radius_km);
        // One cell of slack absorbs rounding at cell edges
        let lat_span = ((radius_deg / self.grid_size_deg).ceil() as i64).saturating_add(1);

        // Longitude degrees shrink with cos(latitude); size the span for the
        // most poleward latitude the radius can reach.
        let edge_lat = (lat.abs() + radius_deg).min(90.0);
        let cos_edge = edge_lat.to_radians().cos();
        let lon_span = if cos_edge > 1e-9 {
            ((radius_deg / (self.grid_size_deg * cos_edge)).ceil() as i64).saturating_add(1)
        } else {
            i64::MAX
        };

        if lon_span >= self.lon_cells / 2 || radius_deg >= 90.0 {
            return self.all_sorted();
        }

        // Probing more cells than are occupied costs more than a full scan
        let probes = lat_span
            .saturating_mul(2)
            .saturating_add(1)
            .saturating_mul(lon_span.saturating_mul(2).saturating_add(1));
        if probes > self.cells.len() as i64 {
            return self.all_sorted();
        }

        let center = self.key_for(lat, lon);
        let mut out = Vec::new();
        for dlat in -lat_span..=lat_span {
            for dlon in -lon_span..=lon_span {
                let key = GridKey {
                    lat_cell: center.lat_cell + dlat,
                    lon_cell: self.wrap_lon_cell(center.lon_cell + dlon),
                };
                if let Some(members) = self.cells.get(&key) {
                    out.extend_from_slice(members);
                }
            }
        }
        out
    }

    /// Every indexed panorama, cells visited in key order.
    fn all_sorted(&self) -> Vec<usize> {
        let mut keys: Vec<&GridKey> = self.cells.keys().collect();
        keys.sort();
        keys.into_iter()
            .flat_map(|k| self.cells[k].iter().copied())
            .collect()
    }

    /// Exact radius query.
    ///
    /// # Arguments
    /// * `panoramas` - The slice this index was built from
    /// * `cache` - Distance memo for this panorama set
    /// * `lat`, `lon` - Query point
    /// * `radius_km` - Inclusive great-circle radius
    ///
    /// # Returns
    /// `(index, distance_km)` pairs in grid-scan order.
    pub fn query_radius(
        &self,
        panoramas: &[Panorama],
        cache: &DistanceCache,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Vec<(usize, f64)> {
        self.candidates(lat, lon, radius_km)
            .into_iter()
            .filter_map(|i| {
                let p = &panoramas[i];
                let d = cache.distance_km(lat, lon, p.latitude, p.longitude);
                (d <= radius_km).then_some((i, d))
            })
            .collect()
    }

    /// Sorted copy of all cells, for comparing two builds.
    pub fn snapshot(&self) -> Vec<(GridKey, Vec<usize>)> {
        let mut cells: Vec<(GridKey, Vec<usize>)> = self
            .cells
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        cells.sort_by_key(|(k, _)| *k);
        cells
    }

    pub fn grid_size_deg(&self) -> f64 {
        self.grid_size_deg
    }

    /// Get statistics about the spatial index
    pub fn stats(&self) -> SpatialStats {
        let total_cells = self.cells.len();
        SpatialStats {
            indexed: self.indexed,
            rejected: self.rejected,
            total_cells,
            avg_per_cell: if total_cells > 0 {
                self.indexed as f64 / total_cells as f64
            } else {
                0.0
            },
            grid_size_deg: self.grid_size_deg,
        }
    }
}

/// Statistics about the spatial index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialStats {
    pub indexed: usize,
    pub rejected: usize,
    pub total_cells: usize,
    pub avg_per_cell: f64,
    pub grid_size_deg: f64,
}
