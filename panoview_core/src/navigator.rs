//! The Spatial Navigator - Panorama-to-Panorama Wayfinding
//!
//! Owns one immutable snapshot per panorama set:
//! 1. Spatial Index (grid cells + distance memo)
//! 2. Clusters (density groups + trailing noise)
//! 3. Canonical Sequence (greedy walk chained across clusters)
//!
//! Queries read the snapshot; `set_panoramas` swaps in a freshly built one.
//! The latest [`NavigationContext`] is published on a `tokio::sync::watch`
//! channel so viewers can read it synchronously or await changes.

use crate::pano_cluster::{cluster_panoramas, Cluster, ClusterKind, ClusterParams};
use crate::pano_direction::{
    click_bearing, describe_candidate, find_best_directional, rank_candidates, Direction,
    PanoramaDirection,
};
use crate::pano_geo::{degrees_to_km, normalize_angle};
use crate::pano_sequence::{build_sequence, Sequence, SequenceParams};
use crate::pano_space::{DistanceCache, Panorama, PanoramaId, SpatialIndex};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the SpatialNavigator
///
/// Distance thresholds are decimal degrees of arc and are converted to
/// kilometres with [`degrees_to_km`] wherever they meet haversine distances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Grid cell edge (default: 0.001° ≈ 111 m)
    pub grid_size_deg: f64,

    /// Decimal places kept in distance-memo keys (default: 6)
    pub distance_precision: u32,

    /// Neighbourhood radius for clustering (default: 0.01° ≈ 1.1 km)
    pub cluster_distance_deg: f64,

    /// Neighbours needed for a point to be dense (default: 2)
    pub min_cluster_neighbors: usize,

    /// Navigation search radius (default: 0.1° ≈ 11 km)
    pub max_search_radius_deg: f64,

    /// Size of `NavigationContext::nearest` (default: 8)
    pub nearest_limit: usize,

    /// Tolerance for ahead/behind/left/right (default: 60°)
    pub directional_tolerance_deg: f64,

    /// Tolerance for compass lookups (default: 45°)
    pub compass_tolerance_deg: f64,

    /// Half-width of the "in view" cone (default: 90°)
    pub view_half_angle_deg: f64,

    /// Confidence gap treated as a tie in ranking (default: 0.1)
    pub confidence_tie_band: f64,

    /// Minimum ahead/behind confidence for next/prev (default: 0.5)
    pub next_confidence_threshold: f64,

    /// Minimum ahead confidence for click navigation (default: 0.3)
    pub click_confidence_threshold: f64,

    /// Search radius multiplier for the click fallback (default: 0.5)
    pub click_radius_factor: f64,

    /// Sequence step weight of closeness (default: 0.7)
    pub path_distance_weight: f64,

    /// Sequence step weight of keeping the heading (default: 0.3)
    pub path_direction_weight: f64,

    /// Confidence weight of closeness (default: 0.6)
    pub confidence_distance_weight: f64,

    /// Confidence weight of alignment with the view (default: 0.4)
    pub confidence_alignment_weight: f64,

    /// Directional score weight of angle to target (default: 0.7)
    pub directional_angle_weight: f64,

    /// Directional score weight of closeness (default: 0.2)
    pub directional_distance_weight: f64,

    /// Directional score weight of confidence (default: 0.1)
    pub directional_confidence_weight: f64,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            grid_size_deg: 0.001,
            distance_precision: 6,
            cluster_distance_deg: 0.01,
            min_cluster_neighbors: 2,
            max_search_radius_deg: 0.1,
            nearest_limit: 8,
            directional_tolerance_deg: 60.0,
            compass_tolerance_deg: 45.0,
            view_half_angle_deg: 90.0,
            confidence_tie_band: 0.1,
            next_confidence_threshold: 0.5,
            click_confidence_threshold: 0.3,
            click_radius_factor: 0.5,
            path_distance_weight: 0.7,
            path_direction_weight: 0.3,
            confidence_distance_weight: 0.6,
            confidence_alignment_weight: 0.4,
            directional_angle_weight: 0.7,
            directional_distance_weight: 0.2,
            directional_confidence_weight: 0.1,
        }
    }
}

impl NavigatorConfig {
    pub fn cluster_distance_km(&self) -> f64 {
        degrees_to_km(self.cluster_distance_deg)
    }

    pub fn max_search_radius_km(&self) -> f64 {
        degrees_to_km(self.max_search_radius_deg)
    }

    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams {
            radius_km: self.cluster_distance_km(),
            min_neighbors: self.min_cluster_neighbors,
        }
    }

    pub fn sequence_params(&self) -> SequenceParams {
        SequenceParams {
            search_radius_km: self.max_search_radius_km(),
            distance_weight: self.path_distance_weight,
            direction_weight: self.path_direction_weight,
        }
    }

    /// Rejects configurations that would make queries meaningless.
    pub fn validate(&self) -> Result<(), NavError> {
        let positive = [
            ("grid_size_deg", self.grid_size_deg),
            ("cluster_distance_deg", self.cluster_distance_deg),
            ("max_search_radius_deg", self.max_search_radius_deg),
            ("click_radius_factor", self.click_radius_factor),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(NavError::InvalidConfig(format!("{} must be > 0, got {}", name, value)));
            }
        }
        if self.grid_size_deg > 1.0 {
            return Err(NavError::InvalidConfig(format!(
                "grid_size_deg must be <= 1.0, got {}",
                self.grid_size_deg
            )));
        }

        let angles = [
            ("directional_tolerance_deg", self.directional_tolerance_deg),
            ("compass_tolerance_deg", self.compass_tolerance_deg),
            ("view_half_angle_deg", self.view_half_angle_deg),
        ];
        for (name, value) in angles {
            if !(value.is_finite() && (0.0..=180.0).contains(&value)) {
                return Err(NavError::InvalidConfig(format!(
                    "{} must be within [0, 180], got {}",
                    name, value
                )));
            }
        }

        if self.distance_precision > 12 {
            return Err(NavError::InvalidConfig(format!(
                "distance_precision must be <= 12, got {}",
                self.distance_precision
            )));
        }

        let weights = [
            self.confidence_tie_band,
            self.next_confidence_threshold,
            self.click_confidence_threshold,
            self.path_distance_weight,
            self.path_direction_weight,
            self.confidence_distance_weight,
            self.confidence_alignment_weight,
            self.directional_angle_weight,
            self.directional_distance_weight,
            self.directional_confidence_weight,
        ];
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(NavError::InvalidConfig(
                "weights and thresholds must be finite and non-negative".to_string(),
            ));
        }

        Ok(())
    }
}

/// Errors raised at the navigator's edges (configuration, parsing).
///
/// Navigation queries themselves never fail; they return `None` or empty.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavError {
    #[error("Invalid navigator config: {0}")]
    InvalidConfig(String),

    #[error("Invalid direction: {0:?} (expected north/east/south/west or degrees)")]
    InvalidDirection(String),
}

// ============================================================================
// NAVIGATION CONTEXT (Output)
// ============================================================================

/// Where the viewer can go from the current panorama.
///
/// Rebuilt from scratch by every `update_navigation_context` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationContext {
    pub current: Panorama,

    /// Best-ranked neighbours (at most `nearest_limit`)
    pub nearest: Vec<PanoramaDirection>,

    pub ahead: Option<PanoramaDirection>,
    pub behind: Option<PanoramaDirection>,
    pub left: Option<PanoramaDirection>,
    pub right: Option<PanoramaDirection>,

    /// Viewing angle the context was computed for, `[0, 360)`
    pub viewing_angle_deg: f64,
}

/// Receiving end of the context channel.
pub type ContextReceiver = watch::Receiver<Option<Arc<NavigationContext>>>;

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Everything derived from one panorama set.
#[derive(Debug)]
struct NavigationSnapshot {
    panoramas: Vec<Panorama>,
    by_id: HashMap<PanoramaId, usize>,
    index: SpatialIndex,
    cache: DistanceCache,
    clusters: Vec<Cluster>,
    sequence: Sequence,
    duplicates: usize,
}

impl NavigationSnapshot {
    fn build(input: Vec<Panorama>, config: &NavigatorConfig) -> Self {
        let mut by_id = HashMap::with_capacity(input.len());
        let mut panoramas = Vec::with_capacity(input.len());
        let mut duplicates = 0;

        for pano in input {
            if by_id.contains_key(&pano.id) {
                warn!("Duplicate panorama id {}; keeping the first occurrence", pano.id);
                duplicates += 1;
                continue;
            }
            by_id.insert(pano.id, panoramas.len());
            panoramas.push(pano);
        }

        let index = SpatialIndex::build(&panoramas, config.grid_size_deg);
        let cache = DistanceCache::new(config.distance_precision);
        let clusters = cluster_panoramas(&panoramas, &index, &cache, config.cluster_params());
        let sequence = build_sequence(&clusters, &panoramas, &cache, &config.sequence_params());

        Self {
            panoramas,
            by_id,
            index,
            cache,
            clusters,
            sequence,
            duplicates,
        }
    }

    fn get(&self, id: PanoramaId) -> Option<&Panorama> {
        self.by_id.get(&id).map(|&i| &self.panoramas[i])
    }
}

/// Counters describing the current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigatorStats {
    pub panoramas: usize,
    pub indexed: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub cells: usize,
    pub clusters: usize,
    pub noise: usize,
    pub sequence_len: usize,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

// ============================================================================
// SPATIAL NAVIGATOR
// ============================================================================

/// Navigation over a geo-tagged panorama set.
///
/// `set_panoramas` needs `&mut self`; every query takes `&self`, so a host
/// sharing the navigator across threads wraps it in an `RwLock`.
#[derive(Debug)]
pub struct SpatialNavigator {
    config: NavigatorConfig,
    snapshot: NavigationSnapshot,
    context_tx: watch::Sender<Option<Arc<NavigationContext>>>,
}

impl SpatialNavigator {
    /// Create a new, empty navigator.
    pub fn new(config: NavigatorConfig) -> Result<Self, NavError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    /// Create a navigator with default configuration.
    ///
    /// The default configuration always validates, so this cannot fail.
    pub fn with_defaults() -> Self {
        Self::from_valid_config(NavigatorConfig::default())
    }

    fn from_valid_config(config: NavigatorConfig) -> Self {
        let snapshot = NavigationSnapshot::build(Vec::new(), &config);
        let (context_tx, _) = watch::channel(None);
        Self {
            config,
            snapshot,
            context_tx,
        }
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    /// Replaces the panorama set and rebuilds index, clusters and sequence.
    ///
    /// Duplicate ids keep their first occurrence. Panoramas with invalid
    /// coordinates stay addressable by id but are left out of the index and
    /// end up in the noise cluster. The published context is reset to
    /// `None`, since it may point at panoramas that no longer exist.
    pub fn set_panoramas<I>(&mut self, panoramas: I)
    where
        I: IntoIterator<Item = Panorama>,
    {
        self.snapshot = NavigationSnapshot::build(panoramas.into_iter().collect(), &self.config);
        self.context_tx.send_replace(None);

        let stats = self.stats();
        debug!(
            "Navigator rebuilt: {} panoramas ({} indexed, {} rejected, {} duplicate) in {} cells, {} clusters",
            stats.panoramas, stats.indexed, stats.rejected, stats.duplicates, stats.cells, stats.clusters
        );
    }

    /// All panoramas within `radius_km` of a point, in no particular order.
    pub fn get_nearby(&self, lat: f64, lon: f64, radius_km: f64) -> Vec<Panorama> {
        let snap = &self.snapshot;
        snap.index
            .query_radius(&snap.panoramas, &snap.cache, lat, lon, radius_km)
            .into_iter()
            .map(|(i, _)| snap.panoramas[i].clone())
            .collect()
    }

    /// Candidates around an origin, described against `viewing_angle`.
    fn candidates_around(
        &self,
        origin: (f64, f64),
        exclude: Option<usize>,
        viewing_angle: f64,
        query_radius_km: f64,
    ) -> Vec<PanoramaDirection> {
        let snap = &self.snapshot;
        // Scores always scale by the navigation radius, whatever the query radius
        let score_radius_km = self.config.max_search_radius_km();
        snap.index
            .query_radius(&snap.panoramas, &snap.cache, origin.0, origin.1, query_radius_km)
            .into_iter()
            .filter(|(i, _)| Some(*i) != exclude)
            .map(|(i, d)| {
                describe_candidate(origin, &snap.panoramas[i], d, viewing_angle, score_radius_km, &self.config)
            })
            .collect()
    }

    /// Recomputes and publishes the context for `current_id`.
    ///
    /// An unknown id publishes (and returns) `None`.
    pub fn update_navigation_context(
        &self,
        current_id: PanoramaId,
        viewing_angle_deg: f64,
    ) -> Option<Arc<NavigationContext>> {
        let snap = &self.snapshot;
        let Some(&current_idx) = snap.by_id.get(&current_id) else {
            trace!("No panorama {}; clearing navigation context", current_id);
            self.context_tx.send_replace(None);
            return None;
        };

        let current = &snap.panoramas[current_idx];
        let viewing = if viewing_angle_deg.is_finite() {
            normalize_angle(viewing_angle_deg)
        } else {
            0.0
        };
        let radius_km = self.config.max_search_radius_km();
        let tolerance = self.config.directional_tolerance_deg;

        let mut candidates = self.candidates_around(
            (current.latitude, current.longitude),
            Some(current_idx),
            viewing,
            radius_km,
        );
        rank_candidates(&mut candidates, self.config.confidence_tie_band);

        let pick = |target: f64| {
            find_best_directional(&candidates, target, tolerance, radius_km, &self.config).cloned()
        };
        let ahead = pick(viewing);
        let behind = pick(viewing + 180.0);
        let left = pick(viewing - 90.0);
        let right = pick(viewing + 90.0);

        candidates.truncate(self.config.nearest_limit);

        trace!(
            "Context for {} @ {:.1}°: {} nearest, ahead={:?}, behind={:?}",
            current_id,
            viewing,
            candidates.len(),
            ahead.as_ref().map(|d| d.panorama.id),
            behind.as_ref().map(|d| d.panorama.id)
        );

        let context = Arc::new(NavigationContext {
            current: current.clone(),
            nearest: candidates,
            ahead,
            behind,
            left,
            right,
            viewing_angle_deg: viewing,
        });
        self.context_tx.send_replace(Some(context.clone()));
        Some(context)
    }

    /// Best of `candidates` within `tolerance_deg` of `target_angle_deg`.
    pub fn find_best_directional_panorama(
        &self,
        candidates: &[PanoramaDirection],
        target_angle_deg: f64,
        tolerance_deg: f64,
    ) -> Option<PanoramaDirection> {
        find_best_directional(
            candidates,
            target_angle_deg,
            tolerance_deg,
            self.config.max_search_radius_km(),
            &self.config,
        )
        .cloned()
    }

    /// Published context, if it belongs to `id`.
    fn context_for(&self, id: PanoramaId) -> Option<Arc<NavigationContext>> {
        self.context().filter(|ctx| ctx.current.id == id)
    }

    /// Confident `ahead` from the current context, else the next panorama
    /// in the canonical sequence.
    pub fn get_next_panorama(&self, current_id: PanoramaId) -> Option<Panorama> {
        let threshold = self.config.next_confidence_threshold;
        if let Some(ahead) = self
            .context_for(current_id)
            .and_then(|ctx| ctx.ahead.clone())
            .filter(|d| d.confidence > threshold && d.panorama.id != current_id)
        {
            return Some(ahead.panorama);
        }

        let next = self.snapshot.sequence.next_after(current_id)?;
        self.snapshot.get(next).cloned()
    }

    /// Confident `behind` from the current context, else the previous
    /// panorama in the canonical sequence.
    pub fn get_prev_panorama(&self, current_id: PanoramaId) -> Option<Panorama> {
        let threshold = self.config.next_confidence_threshold;
        if let Some(behind) = self
            .context_for(current_id)
            .and_then(|ctx| ctx.behind.clone())
            .filter(|d| d.confidence > threshold && d.panorama.id != current_id)
        {
            return Some(behind.panorama);
        }

        let prev = self.snapshot.sequence.prev_before(current_id)?;
        self.snapshot.get(prev).cloned()
    }

    /// Best panorama within `max_distance_km` whose bearing from the origin
    /// is within the compass tolerance of `direction`.
    ///
    /// `max_distance_km` only filters candidates; ranking uses the same
    /// directional score as the context, scaled by the navigation radius.
    ///
    /// Panoramas sitting exactly on the origin have no bearing and are
    /// skipped.
    pub fn get_panorama_in_direction(
        &self,
        from_lat: f64,
        from_lon: f64,
        direction: impl Into<Direction>,
        max_distance_km: f64,
    ) -> Option<Panorama> {
        let target = direction.into().degrees();
        if !target.is_finite() || !(max_distance_km > 0.0) {
            return None;
        }

        let candidates: Vec<PanoramaDirection> = self
            .candidates_around((from_lat, from_lon), None, target, max_distance_km)
            .into_iter()
            .filter(|c| c.distance_km > 0.0)
            .collect();

        find_best_directional(
            &candidates,
            target,
            self.config.compass_tolerance_deg,
            self.config.max_search_radius_km(),
            &self.config,
        )
        .map(|c| c.panorama.clone())
    }

    /// Panorama the user clicked toward.
    ///
    /// # Arguments
    /// * `current_id` - Panorama being viewed
    /// * `click_position` - Click on the unit viewing sphere (y up)
    /// * `camera_orientation_deg` - Camera heading at click time
    ///
    /// Refreshes the context with the click bearing as viewing angle; a
    /// confident `ahead` wins, otherwise a compass lookup over a reduced
    /// radius decides.
    pub fn find_next_panorama_from_click(
        &self,
        current_id: PanoramaId,
        click_position: Vector3<f64>,
        camera_orientation_deg: f64,
    ) -> Option<Panorama> {
        let bearing = click_bearing(&click_position, camera_orientation_deg);
        let context = self.update_navigation_context(current_id, bearing)?;

        if let Some(ahead) = &context.ahead {
            if ahead.confidence > self.config.click_confidence_threshold {
                return Some(ahead.panorama.clone());
            }
        }

        self.get_panorama_in_direction(
            context.current.latitude,
            context.current.longitude,
            Direction::Bearing(bearing),
            self.config.max_search_radius_km() * self.config.click_radius_factor,
        )
    }

    /// Latest published context.
    pub fn context(&self) -> Option<Arc<NavigationContext>> {
        self.context_tx.borrow().clone()
    }

    /// Subscribes to context updates.
    pub fn subscribe(&self) -> ContextReceiver {
        self.context_tx.subscribe()
    }

    pub fn panorama(&self, id: PanoramaId) -> Option<&Panorama> {
        self.snapshot.get(id)
    }

    /// Panorama set of the last build (duplicates removed, input order).
    pub fn panoramas(&self) -> &[Panorama] {
        &self.snapshot.panoramas
    }

    pub fn sequence(&self) -> &Sequence {
        &self.snapshot.sequence
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.snapshot.index
    }

    /// Clusters of the last build as panorama ids.
    pub fn clusters(&self) -> Vec<(ClusterKind, Vec<PanoramaId>)> {
        let snap = &self.snapshot;
        snap.clusters
            .iter()
            .map(|c| (c.kind, c.members.iter().map(|&i| snap.panoramas[i].id).collect()))
            .collect()
    }

    pub fn stats(&self) -> NavigatorStats {
        let snap = &self.snapshot;
        let index = snap.index.stats();
        let (cache_hits, cache_misses) = snap.cache.counters();
        NavigatorStats {
            panoramas: snap.panoramas.len(),
            indexed: index.indexed,
            rejected: index.rejected,
            duplicates: snap.duplicates,
            cells: index.total_cells,
            clusters: snap.clusters.len(),
            noise: snap
                .clusters
                .iter()
                .filter(|c| c.is_noise())
                .map(Cluster::len)
                .sum(),
            sequence_len: snap.sequence.len(),
            cache_entries: snap.cache.len(),
            cache_hits,
            cache_misses,
        }
    }
}

impl Default for SpatialNavigator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pano_geo::KM_PER_DEGREE;

    fn plus_layout() -> Vec<Panorama> {
        vec![
            Panorama::new(1, 0.0, 0.0),
            Panorama::new(2, 0.001, 0.0),  // north
            Panorama::new(3, 0.0, 0.001),  // east
            Panorama::new(4, -0.001, 0.0), // south
            Panorama::new(5, 0.0, -0.001), // west
        ]
    }

    #[test]
    fn test_navigator_creation() {
        let nav = SpatialNavigator::with_defaults();
        assert!(nav.sequence().is_empty());
        assert!(nav.context().is_none());
        assert_eq!(nav.stats().panoramas, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = NavigatorConfig {
            grid_size_deg: 0.0,
            ..Default::default()
        };
        assert!(matches!(SpatialNavigator::new(bad), Err(NavError::InvalidConfig(_))));

        let bad = NavigatorConfig {
            directional_tolerance_deg: 270.0,
            ..Default::default()
        };
        assert!(SpatialNavigator::new(bad).is_err());
        assert!(SpatialNavigator::new(NavigatorConfig::default()).is_ok());
    }

    #[test]
    fn test_config_deserializes_partial() {
        let config: NavigatorConfig =
            serde_json::from_str(r#"{ "grid_size_deg": 0.002, "nearest_limit": 4 }"#).unwrap();
        assert_eq!(config.grid_size_deg, 0.002);
        assert_eq!(config.nearest_limit, 4);
        assert_eq!(config.min_cluster_neighbors, 2);
    }

    #[test]
    fn test_context_directions() {
        let mut nav = SpatialNavigator::with_defaults();
        nav.set_panoramas(plus_layout());

        let ctx = nav.update_navigation_context(1, 0.0).unwrap();
        assert_eq!(ctx.current.id, 1);
        assert_eq!(ctx.nearest.len(), 4);
        assert_eq!(ctx.ahead.as_ref().unwrap().panorama.id, 2);
        assert_eq!(ctx.behind.as_ref().unwrap().panorama.id, 4);
        assert_eq!(ctx.left.as_ref().unwrap().panorama.id, 5);
        assert_eq!(ctx.right.as_ref().unwrap().panorama.id, 3);
        // Best-ranked neighbour is the one we look at
        assert_eq!(ctx.nearest[0].panorama.id, 2);

        let ctx = nav.update_navigation_context(1, 90.0).unwrap();
        assert_eq!(ctx.ahead.as_ref().unwrap().panorama.id, 3);
        assert_eq!(ctx.left.as_ref().unwrap().panorama.id, 2);
    }

    #[test]
    fn test_context_unknown_id_clears() {
        let mut nav = SpatialNavigator::with_defaults();
        nav.set_panoramas(plus_layout());
        nav.update_navigation_context(1, 0.0);
        assert!(nav.context().is_some());

        assert!(nav.update_navigation_context(99, 0.0).is_none());
        assert!(nav.context().is_none());
    }

    #[test]
    fn test_subscribers_notified_on_every_update() {
        let mut nav = SpatialNavigator::with_defaults();
        nav.set_panoramas(plus_layout());
        let mut rx = nav.subscribe();
        assert!(!rx.has_changed().unwrap());

        nav.update_navigation_context(1, 0.0);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().current.id, 1);

        // Same query again still notifies
        nav.update_navigation_context(1, 0.0);
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_set_panoramas_resets_context() {
        let mut nav = SpatialNavigator::with_defaults();
        nav.set_panoramas(plus_layout());
        nav.update_navigation_context(1, 0.0);
        nav.set_panoramas(plus_layout());
        assert!(nav.context().is_none());
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let mut nav = SpatialNavigator::with_defaults();
        nav.set_panoramas(vec![
            Panorama::new(1, 0.0, 0.0),
            Panorama::new(1, 5.0, 5.0),
            Panorama::new(2, 0.0, 0.001),
        ]);
        assert_eq!(nav.panoramas().len(), 2);
        assert_eq!(nav.panorama(1).unwrap().latitude, 0.0);
        assert_eq!(nav.stats().duplicates, 1);
        assert_eq!(nav.sequence().len(), 2);
    }

    #[test]
    fn test_next_prefers_confident_ahead() {
        let mut nav = SpatialNavigator::with_defaults();
        nav.set_panoramas(plus_layout());
        nav.update_navigation_context(1, 90.0);
        assert_eq!(nav.get_next_panorama(1).unwrap().id, 3);
        assert_eq!(nav.get_prev_panorama(1).unwrap().id, 5);
    }

    #[test]
    fn test_next_ignores_context_of_other_panorama() {
        let mut nav = SpatialNavigator::with_defaults();
        nav.set_panoramas(plus_layout());
        nav.update_navigation_context(2, 0.0);

        let seq = nav.sequence().clone();
        let expected = seq.next_after(1).unwrap();
        assert_eq!(nav.get_next_panorama(1).unwrap().id, expected);
    }

    #[test]
    fn test_with_defaults_matches_new_default() {
        let a = SpatialNavigator::with_defaults();
        let b = SpatialNavigator::new(NavigatorConfig::default()).unwrap();
        assert_eq!(a.config(), b.config());
        assert!(a.context().is_none() && b.context().is_none());
    }

    #[test]
    fn test_direction_lookup_scores_against_search_radius() {
        // #2 due east 1.5 km out, #3 just off east and very close. Scaled by
        // the 0.1° navigation radius the aligned one wins; scaled by the
        // 5 km lookup radius the close one would.
        let near_lat = 0.1 * 80f64.to_radians().cos() / KM_PER_DEGREE;
        let near_lon = 0.1 * 80f64.to_radians().sin() / KM_PER_DEGREE;
        let mut nav = SpatialNavigator::with_defaults();
        nav.set_panoramas(vec![
            Panorama::new(1, 0.0, 0.0),
            Panorama::new(2, 0.0, 1.5 / KM_PER_DEGREE),
            Panorama::new(3, near_lat, near_lon),
        ]);

        let east = nav.get_panorama_in_direction(0.0, 0.0, Direction::East, 5.0);
        assert_eq!(east.map(|p| p.id), Some(2));

        // The lookup radius still filters
        let east = nav.get_panorama_in_direction(0.0, 0.0, Direction::East, 1.0);
        assert_eq!(east.map(|p| p.id), Some(3));
    }

    #[test]
    fn test_invalid_coordinates_addressable_but_unindexed() {
        let mut nav = SpatialNavigator::with_defaults();
        nav.set_panoramas(vec![
            Panorama::new(1, 0.0, 0.0),
            Panorama::new(2, f64::NAN, 0.0),
            Panorama::new(3, 0.0, 0.001),
        ]);
        assert!(nav.panorama(2).is_some());
        assert_eq!(nav.stats().rejected, 1);
        assert_eq!(nav.sequence().len(), 3);

        let ctx = nav.update_navigation_context(2, 0.0).unwrap();
        assert!(ctx.nearest.is_empty());
        assert!(ctx.ahead.is_none());
    }
}
