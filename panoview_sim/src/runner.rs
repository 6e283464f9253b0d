//! Scenario runner - builds a layout, feeds it to a navigator and checks
//! the navigation invariants against the layout's known shape.

use crate::oracle::Oracle;
use crate::scenarios::ScenarioId;

use panoview_core::pano_geo::haversine_km;
use panoview_core::{
    ClusterKind, Direction, NavError, NavigatorConfig, Panorama, PanoramaDirection, PanoramaId, SpatialNavigator,
};
use panoview_env::ingest;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Panoramas whose context gets recomputed and checked per run.
const MAX_CONTEXT_CHECKS: usize = 64;

/// Distances this close to a query radius are not compared (cache keys are
/// quantised).
const RADIUS_SLACK_KM: f64 = 1e-3;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioMetrics {
    /// Records produced by the layout (before ingestion)
    pub records: usize,

    /// Records dropped at ingestion
    pub rejected: usize,

    /// Panoramas held by the navigator
    pub panoramas: usize,

    pub clusters: usize,
    pub noise: usize,
    pub sequence_len: usize,

    /// Contexts recomputed and checked
    pub contexts_checked: u64,

    /// Sequence steps walked
    pub walk_steps: u64,

    /// Radius queries compared against a brute-force scan
    pub nearby_queries: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl ScenarioMetrics {
    /// Copies the navigator's build counters.
    fn absorb(&mut self, navigator: &SpatialNavigator) {
        let stats = navigator.stats();
        self.panoramas = stats.panoramas;
        self.clusters = stats.clusters;
        self.noise = stats.noise;
        self.sequence_len = stats.sequence_len;
        self.cache_hits = stats.cache_hits;
        self.cache_misses = stats.cache_misses;
    }
}

/// A generated panorama set plus what the scenario knows about it.
#[derive(Debug, Default)]
struct Layout {
    records: Vec<Panorama>,

    /// Ids expected to end up in the noise cluster
    outliers: Vec<PanoramaId>,

    /// Id of the hub panorama (compass ring)
    hub: Option<PanoramaId>,

    /// Expected number of dense clusters
    dense_clusters: Option<usize>,
}

/// Runs navigation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Panoramas per layout (approximate for grid and plaza layouts)
    count: usize,

    config: NavigatorConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            count: 40,
            config: NavigatorConfig::default(),
        }
    }

    /// Sets the layout size.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.max(4);
        self
    }

    /// Sets the navigator configuration.
    pub fn with_config(mut self, config: NavigatorConfig) -> Result<Self, NavError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_detailed(scenario).0
    }

    /// Runs a scenario and also hands back the navigator it built.
    pub fn run_detailed(&self, scenario: ScenarioId) -> (ScenarioResult, SpatialNavigator) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut metrics = ScenarioMetrics::default();
        let mut navigator = match SpatialNavigator::new(self.config.clone()) {
            Ok(nav) => nav,
            Err(e) => {
                let result = self.finish(scenario, Err(e.to_string()), metrics);
                return (result, SpatialNavigator::with_defaults());
            }
        };

        let mut oracle = Oracle::new(self.seed.wrapping_mul(0x9e3779b97f4a7c15));
        let layout = self.layout(scenario, &mut oracle);
        metrics.records = layout.records.len();

        let (accepted, report) = ingest(layout.records.clone());
        metrics.rejected = report.rejected.len();
        if metrics.records != report.accepted + metrics.rejected {
            let reason = format!(
                "ingestion lost records: {} in, {} accepted, {} rejected",
                metrics.records, report.accepted, metrics.rejected
            );
            return (self.finish(scenario, Err(reason), metrics), navigator);
        }
        navigator.set_panoramas(accepted);

        let outcome = self
            .check_invariants(&navigator, &mut metrics)
            .and_then(|_| self.check_scenario(scenario, &layout, &navigator, &mut metrics));

        metrics.absorb(&navigator);
        debug!("  metrics: {:?}", metrics);

        (self.finish(scenario, outcome, metrics), navigator)
    }

    /// Checks the layout-independent invariants on an already fed navigator.
    pub fn verify(&self, navigator: &SpatialNavigator) -> Result<ScenarioMetrics, String> {
        let mut metrics = ScenarioMetrics::default();
        self.check_invariants(navigator, &mut metrics)?;

        metrics.absorb(navigator);
        metrics.records = metrics.panoramas;
        Ok(metrics)
    }

    fn finish(&self, scenario: ScenarioId, outcome: Result<(), String>, metrics: ScenarioMetrics) -> ScenarioResult {
        if let Err(reason) = &outcome {
            warn!("{} (seed={}) failed: {}", scenario.name(), self.seed, reason);
        }
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: outcome.is_ok(),
            failure_reason: outcome.err(),
            metrics,
        }
    }

    // ========================================================================
    // LAYOUTS
    // ========================================================================

    fn layout(&self, scenario: ScenarioId, oracle: &mut Oracle) -> Layout {
        let n = self.count;
        match scenario {
            ScenarioId::StreetWalk => Layout {
                records: oracle.street_walk((45.07, 7.68), n, 0.0005, 30.0, 20.0),
                dense_clusters: Some(1),
                ..Layout::default()
            },
            ScenarioId::PlazaCluster => {
                let per_plaza = (n / 3).max(4);
                let mut records = Vec::new();
                for k in 0..3 {
                    records.extend(oracle.plaza((45.0 + 0.5 * k as f64, 7.0), per_plaza, 0.001));
                }
                let outliers = oracle.scattered((10.0, 20.0), (n / 8).max(2), 0.05);
                let outlier_ids = outliers.iter().map(|p| p.id).collect();
                records.extend(outliers);
                Layout {
                    records,
                    outliers: outlier_ids,
                    dense_clusters: Some(3),
                    ..Layout::default()
                }
            }
            ScenarioId::CompassRing => {
                oracle.set_jitter(0.0);
                let records = oracle.compass_ring((0.5, 10.0), 8, 0.002);
                Layout {
                    hub: records.first().map(|p| p.id),
                    records,
                    dense_clusters: Some(1),
                    ..Layout::default()
                }
            }
            ScenarioId::ScatteredNoise => {
                let records = oracle.scattered((-33.9, 151.2), n, 0.05);
                Layout {
                    outliers: records.iter().map(|p| p.id).collect(),
                    records,
                    dense_clusters: Some(0),
                    ..Layout::default()
                }
            }
            ScenarioId::CityGrid => {
                let side = ((n as f64).sqrt().ceil() as usize).max(3);
                Layout {
                    records: oracle.city_grid((40.75, -73.99), side, side, 0.0005),
                    dense_clusters: Some(1),
                    ..Layout::default()
                }
            }
            ScenarioId::DirtyFeed => {
                let clean = oracle.street_walk((51.5, -0.12), n, 0.0005, 90.0, 15.0);
                Layout {
                    records: oracle.corrupt(&clean, 0.3),
                    ..Layout::default()
                }
            }
            ScenarioId::Antimeridian => {
                // Centre the street on 180°
                let half_span = (n - 1) as f64 / 2.0 * 0.0005 / 10f64.to_radians().cos();
                Layout {
                    records: oracle.street_walk((10.0, 180.0 - half_span), n, 0.0005, 90.0, 0.0),
                    dense_clusters: Some(1),
                    ..Layout::default()
                }
            }
        }
    }

    // ========================================================================
    // CHECKS
    // ========================================================================

    /// Checks that hold for every panorama set.
    fn check_invariants(&self, nav: &SpatialNavigator, metrics: &mut ScenarioMetrics) -> Result<(), String> {
        let ids: BTreeSet<PanoramaId> = nav.panoramas().iter().map(|p| p.id).collect();

        // Clusters partition the set, noise last
        let clusters = nav.clusters();
        let mut seen = BTreeSet::new();
        for (pos, (kind, members)) in clusters.iter().enumerate() {
            if *kind == ClusterKind::Noise && pos + 1 != clusters.len() {
                return Err(format!("noise cluster at position {} of {}", pos, clusters.len()));
            }
            for id in members {
                if !seen.insert(*id) {
                    return Err(format!("panorama {} is in two clusters", id));
                }
            }
        }
        if seen != ids {
            return Err(format!("clusters cover {} of {} panoramas", seen.len(), ids.len()));
        }

        // Sequence is a permutation
        let mut order = nav.sequence().ids().to_vec();
        order.sort_unstable();
        if !order.iter().copied().eq(ids.iter().copied()) {
            return Err("sequence is not a permutation of the panorama set".to_string());
        }

        // Rebuilding from the same input reproduces everything
        let mut twin = SpatialNavigator::new(nav.config().clone()).map_err(|e| e.to_string())?;
        twin.set_panoramas(nav.panoramas().to_vec());
        if twin.sequence().ids() != nav.sequence().ids() || twin.clusters() != clusters {
            return Err("rebuild from identical input diverged".to_string());
        }

        self.check_walk(nav, metrics)?;

        for pair in nav.panoramas().windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let ab = haversine_km(a.latitude, a.longitude, b.latitude, b.longitude);
            let ba = haversine_km(b.latitude, b.longitude, a.latitude, a.longitude);
            if (ab - ba).abs() > 1e-9 {
                return Err(format!("distance {} <-> {} asymmetric: {} vs {}", a.id, b.id, ab, ba));
            }
        }

        let radius_km = nav.config().max_search_radius_km();
        let disjoint_cones = 2.0 * nav.config().directional_tolerance_deg < 180.0;

        for (k, pano) in nav.panoramas().iter().take(MAX_CONTEXT_CHECKS).enumerate() {
            let angle = (k as f64 * 37.0) % 360.0;
            let ctx = nav
                .update_navigation_context(pano.id, angle)
                .ok_or_else(|| format!("no context for known panorama {}", pano.id))?;
            metrics.contexts_checked += 1;

            if ctx.nearest.len() > nav.config().nearest_limit {
                return Err(format!("{} nearest entries for {}", ctx.nearest.len(), pano.id));
            }
            for d in &ctx.nearest {
                if d.panorama.id == pano.id {
                    return Err(format!("panorama {} listed as its own neighbour", pano.id));
                }
                if !(0.0..=1.0).contains(&d.confidence) || !(0.0..360.0).contains(&d.bearing_deg) {
                    return Err(format!(
                        "neighbour {} of {} out of range: confidence={} bearing={}",
                        d.panorama.id, pano.id, d.confidence, d.bearing_deg
                    ));
                }
                if d.distance_km > radius_km {
                    return Err(format!("neighbour {} beyond search radius", d.panorama.id));
                }
            }
            if let (Some(ahead), Some(behind)) = (&ctx.ahead, &ctx.behind) {
                if disjoint_cones && ahead.panorama.id == behind.panorama.id {
                    return Err(format!("{} is both ahead and behind of {}", ahead.panorama.id, pano.id));
                }
            }

            if nav.sequence().len() > 1 {
                for (label, step) in [
                    ("next", nav.get_next_panorama(pano.id)),
                    ("prev", nav.get_prev_panorama(pano.id)),
                ] {
                    match step {
                        Some(p) if p.id != pano.id => {}
                        other => {
                            return Err(format!(
                                "{} of {} was {:?}",
                                label,
                                pano.id,
                                other.map(|p| p.id)
                            ))
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Follows the sequence once around and back to the start.
    fn check_walk(&self, nav: &SpatialNavigator, metrics: &mut ScenarioMetrics) -> Result<(), String> {
        let sequence = nav.sequence();
        let Some(&start) = sequence.ids().first() else {
            return Ok(());
        };
        if sequence.len() == 1 {
            return match sequence.next_after(start) {
                None => Ok(()),
                Some(id) => Err(format!("singleton sequence steps to {}", id)),
            };
        }

        let mut visited = HashSet::with_capacity(sequence.len());
        let mut current = start;
        for _ in 0..sequence.len() {
            visited.insert(current);
            let next = sequence
                .next_after(current)
                .ok_or_else(|| format!("walk stuck at {}", current))?;
            if sequence.prev_before(next) != Some(current) {
                return Err(format!("prev of {} is not {}", next, current));
            }
            current = next;
            metrics.walk_steps += 1;
        }

        if current != start {
            return Err(format!("walk ended at {} instead of wrapping to {}", current, start));
        }
        if visited.len() != sequence.len() {
            return Err(format!("walk visited {} of {} panoramas", visited.len(), sequence.len()));
        }
        Ok(())
    }

    /// Checks specific to the layout's known shape.
    fn check_scenario(
        &self,
        scenario: ScenarioId,
        layout: &Layout,
        nav: &SpatialNavigator,
        metrics: &mut ScenarioMetrics,
    ) -> Result<(), String> {
        let clusters = nav.clusters();

        if let Some(expected) = layout.dense_clusters {
            let dense = clusters.iter().filter(|(kind, _)| *kind == ClusterKind::Dense).count();
            if dense != expected {
                return Err(format!("expected {} dense clusters, found {}", expected, dense));
            }
        }

        let noise: BTreeSet<PanoramaId> = clusters
            .iter()
            .filter(|(kind, _)| *kind == ClusterKind::Noise)
            .flat_map(|(_, members)| members.iter().copied())
            .collect();
        let expected_noise: BTreeSet<PanoramaId> = layout.outliers.iter().copied().collect();
        if scenario != ScenarioId::DirtyFeed && noise != expected_noise {
            return Err(format!("noise {:?} differs from outliers {:?}", noise, expected_noise));
        }

        match scenario {
            ScenarioId::CompassRing => self.check_compass(layout, nav),
            ScenarioId::CityGrid => self.check_nearby(nav, 0.3, metrics),
            ScenarioId::DirtyFeed => {
                if metrics.rejected == 0 {
                    return Err("corrupted feed produced no rejections".to_string());
                }
                let mut unique = HashSet::new();
                for p in nav.panoramas() {
                    if !p.has_valid_position() || !unique.insert(p.id) {
                        return Err(format!("panorama {} slipped through ingestion", p.id));
                    }
                }
                Ok(())
            }
            ScenarioId::Antimeridian => self.check_seam(layout, nav),
            ScenarioId::StreetWalk | ScenarioId::PlazaCluster | ScenarioId::ScatteredNoise => Ok(()),
        }
    }

    /// Hub sees its ring members on the four compass points.
    fn check_compass(&self, layout: &Layout, nav: &SpatialNavigator) -> Result<(), String> {
        let hub_id = layout.hub.ok_or("ring layout has no hub")?;
        let hub = nav.panorama(hub_id).ok_or("hub missing from navigator")?;
        let radius_km = nav.config().max_search_radius_km();

        let expected = [
            (Direction::North, hub_id + 1),
            (Direction::East, hub_id + 3),
            (Direction::South, hub_id + 5),
            (Direction::West, hub_id + 7),
        ];
        for (direction, want) in expected {
            let got = nav
                .get_panorama_in_direction(hub.latitude, hub.longitude, direction, radius_km)
                .map(|p| p.id);
            if got != Some(want) {
                return Err(format!("{:?} of hub gave {:?}, expected {}", direction, got, want));
            }
        }

        let ctx = nav
            .update_navigation_context(hub_id, 0.0)
            .ok_or("no context for hub")?;
        let pick = |d: &Option<PanoramaDirection>| d.as_ref().map(|d| d.panorama.id);
        let sides = [pick(&ctx.ahead), pick(&ctx.right), pick(&ctx.behind), pick(&ctx.left)];
        let want = [hub_id + 1, hub_id + 3, hub_id + 5, hub_id + 7].map(Some);
        if sides != want {
            return Err(format!("hub context ahead/right/behind/left = {:?}, expected {:?}", sides, want));
        }

        match nav.get_next_panorama(hub_id) {
            Some(p) if p.id == hub_id + 1 => Ok(()),
            other => Err(format!("next from hub facing north was {:?}", other.map(|p| p.id))),
        }
    }

    /// Radius queries agree with a brute-force scan.
    fn check_nearby(&self, nav: &SpatialNavigator, radius_km: f64, metrics: &mut ScenarioMetrics) -> Result<(), String> {
        let panoramas = nav.panoramas();
        for probe in panoramas.iter().step_by(7) {
            let found: BTreeSet<PanoramaId> = nav
                .get_nearby(probe.latitude, probe.longitude, radius_km)
                .iter()
                .map(|p| p.id)
                .collect();
            metrics.nearby_queries += 1;

            for p in panoramas {
                let d = haversine_km(probe.latitude, probe.longitude, p.latitude, p.longitude);
                if (d - radius_km).abs() < RADIUS_SLACK_KM {
                    continue;
                }
                if (d < radius_km) != found.contains(&p.id) {
                    return Err(format!(
                        "radius query at {} disagrees on {} ({:.4} km)",
                        probe.id, p.id, d
                    ));
                }
            }
        }
        Ok(())
    }

    /// Neighbours on opposite sides of 180° still find each other.
    fn check_seam(&self, layout: &Layout, nav: &SpatialNavigator) -> Result<(), String> {
        let crossing = layout
            .records
            .windows(2)
            .find(|w| w[0].longitude > 0.0 && w[1].longitude < 0.0)
            .ok_or("street never crossed the antimeridian")?;
        let (west, east) = (&crossing[0], &crossing[1]);

        let found = nav.get_nearby(west.latitude, west.longitude, 0.2);
        if !found.iter().any(|p| p.id == east.id) {
            return Err(format!("{} not found from {} across the seam", east.id, west.id));
        }

        match nav.get_panorama_in_direction(west.latitude, west.longitude, Direction::East, 0.2) {
            Some(p) if p.id == east.id => Ok(()),
            other => Err(format!("east of {} across the seam was {:?}", west.id, other.map(|p| p.id))),
        }
    }
}
