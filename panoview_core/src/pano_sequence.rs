//! Walkable visiting order for a clustered panorama set
//!
//! Each cluster is ordered by a greedy walk that prefers close points and
//! penalises turning; clusters are then chained by jumping to whichever
//! remaining cluster has the point nearest to the end of the walk so far.
//!
//! All max/min selections keep the first candidate on ties, and inputs are
//! plain slices, so the result is fully determined by input order.

use crate::pano_cluster::Cluster;
use crate::pano_geo::{angle_diff, bearing_deg};
use crate::pano_space::{DistanceCache, Panorama, PanoramaId};
use serde::Serialize;
use std::collections::HashMap;

/// Greedy-walk tuning
#[derive(Debug, Clone, Copy)]
pub struct SequenceParams {
    /// Distance at which the proximity score reaches zero (km)
    pub search_radius_km: f64,
    /// Weight of proximity in the path score
    pub distance_weight: f64,
    /// Weight of heading continuity in the path score
    pub direction_weight: f64,
}

impl Default for SequenceParams {
    fn default() -> Self {
        Self {
            search_radius_km: crate::pano_geo::degrees_to_km(0.1),
            distance_weight: 0.7,
            direction_weight: 0.3,
        }
    }
}

/// Finite distance or +inf, so unusable coordinates always lose.
#[inline]
fn usable(d: f64) -> f64 {
    if d.is_nan() {
        f64::INFINITY
    } else {
        d
    }
}

/// Northeast-most start key: `lat*1000 + lon*1000`.
fn start_key(p: &Panorama) -> f64 {
    let k = p.latitude * 1000.0 + p.longitude * 1000.0;
    if k.is_nan() {
        f64::NEG_INFINITY
    } else {
        k
    }
}

/// Orders one cluster's members into a walk.
///
/// Clusters of two or fewer members are returned unchanged.
pub fn order_cluster(
    members: &[usize],
    panoramas: &[Panorama],
    cache: &DistanceCache,
    params: &SequenceParams,
) -> Vec<usize> {
    if members.len() <= 2 {
        return members.to_vec();
    }

    let mut start_pos = 0;
    let mut best_key = start_key(&panoramas[members[0]]);
    for (pos, &m) in members.iter().enumerate().skip(1) {
        let k = start_key(&panoramas[m]);
        if k > best_key {
            best_key = k;
            start_pos = pos;
        }
    }

    let mut remaining: Vec<usize> = members.to_vec();
    let mut walk = vec![remaining.remove(start_pos)];

    while !remaining.is_empty() {
        let last = &panoramas[walk[walk.len() - 1]];
        let heading = (walk.len() >= 2).then(|| {
            let prev = &panoramas[walk[walk.len() - 2]];
            bearing_deg(prev.latitude, prev.longitude, last.latitude, last.longitude)
        });

        let mut best_pos = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (pos, &c) in remaining.iter().enumerate() {
            let cand = &panoramas[c];
            let d = usable(cache.between(last, cand));
            let distance_score = (1.0 - d / params.search_radius_km).max(0.0);
            let direction_score = match heading {
                Some(h) => {
                    let step = bearing_deg(last.latitude, last.longitude, cand.latitude, cand.longitude);
                    (1.0 - angle_diff(h, step) / 180.0).max(0.0)
                }
                None => 0.0,
            };
            let score = params.distance_weight * distance_score + params.direction_weight * direction_score;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        walk.push(remaining.remove(best_pos));
    }

    walk
}

/// Chains ordered clusters into one walk.
///
/// Starts with the first cluster as-is; each following cluster is the one
/// holding the panorama nearest to the current tail, appended rotated so it
/// begins at that panorama.
pub fn connect_clusters(
    mut ordered: Vec<Vec<usize>>,
    panoramas: &[Panorama],
    cache: &DistanceCache,
) -> Vec<usize> {
    if ordered.is_empty() {
        return Vec::new();
    }

    let mut result = ordered.remove(0);

    while !ordered.is_empty() {
        let mut best = (0usize, 0usize);
        if let Some(&tail) = result.last() {
            let tail = &panoramas[tail];
            let mut best_dist = f64::INFINITY;
            for (ci, cluster) in ordered.iter().enumerate() {
                for (pi, &p) in cluster.iter().enumerate() {
                    let d = usable(cache.between(tail, &panoramas[p]));
                    if d < best_dist {
                        best_dist = d;
                        best = (ci, pi);
                    }
                }
            }
        }

        let (ci, pi) = best;
        let cluster = ordered.remove(ci);
        result.extend_from_slice(&cluster[pi..]);
        result.extend_from_slice(&cluster[..pi]);
    }

    result
}

/// Full pipeline: order every cluster, then chain them.
pub fn build_sequence(
    clusters: &[Cluster],
    panoramas: &[Panorama],
    cache: &DistanceCache,
    params: &SequenceParams,
) -> Sequence {
    let ordered: Vec<Vec<usize>> = clusters
        .iter()
        .map(|c| order_cluster(&c.members, panoramas, cache, params))
        .collect();

    let walk = connect_clusters(ordered, panoramas, cache);
    Sequence::from_ids(walk.into_iter().map(|i| panoramas[i].id).collect())
}

// ============================================================================
// CANONICAL SEQUENCE
// ============================================================================

/// The canonical circular visiting order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sequence {
    order: Vec<PanoramaId>,
    #[serde(skip)]
    positions: HashMap<PanoramaId, usize>,
}

impl Sequence {
    pub fn from_ids(order: Vec<PanoramaId>) -> Self {
        let positions = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        Self { order, positions }
    }

    pub fn ids(&self) -> &[PanoramaId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn position_of(&self, id: PanoramaId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Id following `id`, wrapping at the end. `None` for unknown ids and
    /// for single-element sequences (the only successor would be itself).
    pub fn next_after(&self, id: PanoramaId) -> Option<PanoramaId> {
        let pos = self.position_of(id)?;
        if self.order.len() < 2 {
            return None;
        }
        Some(self.order[(pos + 1) % self.order.len()])
    }

    /// Id preceding `id`, wrapping at the start.
    pub fn prev_before(&self, id: PanoramaId) -> Option<PanoramaId> {
        let pos = self.position_of(id)?;
        let len = self.order.len();
        if len < 2 {
            return None;
        }
        Some(self.order[(pos + len - 1) % len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pano_cluster::{cluster_panoramas, ClusterKind, ClusterParams};
    use crate::pano_geo::degrees_to_km;
    use crate::pano_space::SpatialIndex;
    use proptest::prelude::*;

    fn sequence_of(panos: &[Panorama]) -> Sequence {
        let index = SpatialIndex::build(panos, 0.001);
        let cache = DistanceCache::new(6);
        let clusters = cluster_panoramas(
            panos,
            &index,
            &cache,
            ClusterParams {
                radius_km: degrees_to_km(0.01),
                min_neighbors: 2,
            },
        );
        build_sequence(&clusters, panos, &cache, &SequenceParams::default())
    }

    #[test]
    fn test_small_cluster_unchanged() {
        let panos = vec![Panorama::new(1, 0.0, 0.0), Panorama::new(2, 1.0, 1.0)];
        let cache = DistanceCache::new(6);
        let order = order_cluster(&[0, 1], &panos, &cache, &SequenceParams::default());
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn test_walk_starts_northeast_and_follows_street() {
        // Street running south-west from the northeast corner, shuffled
        let panos = vec![
            Panorama::new(10, 0.002, 0.002),
            Panorama::new(11, 0.000, 0.000),
            Panorama::new(12, 0.004, 0.004),
            Panorama::new(13, 0.001, 0.001),
            Panorama::new(14, 0.003, 0.003),
        ];
        let cache = DistanceCache::new(6);
        let order = order_cluster(&[0, 1, 2, 3, 4], &panos, &cache, &SequenceParams::default());
        let ids: Vec<i64> = order.iter().map(|i| panos[*i].id).collect();
        assert_eq!(ids, vec![12, 14, 10, 13, 11]);
    }

    #[test]
    fn test_start_tie_keeps_first() {
        // Same lat+lon sum for #1 and #2
        let panos = vec![
            Panorama::new(1, 0.002, 0.000),
            Panorama::new(2, 0.000, 0.002),
            Panorama::new(3, 0.000, 0.000),
        ];
        let cache = DistanceCache::new(6);
        let order = order_cluster(&[0, 1, 2], &panos, &cache, &SequenceParams::default());
        assert_eq!(order[0], 0);
    }

    #[test]
    fn test_connect_rotates_to_nearest() {
        let panos = vec![
            Panorama::new(1, 0.0, 0.0),
            Panorama::new(2, 0.0, 0.1),
            // far cluster: nearest to #2 is #4
            Panorama::new(3, 0.0, 0.5),
            Panorama::new(4, 0.0, 0.2),
            Panorama::new(5, 0.0, 0.3),
        ];
        let cache = DistanceCache::new(6);
        let walk = connect_clusters(vec![vec![0, 1], vec![2, 3, 4]], &panos, &cache);
        assert_eq!(walk, vec![0, 1, 3, 4, 2]);
    }

    #[test]
    fn test_dense_then_noise_sequence() {
        let panos = vec![
            Panorama::new(1, 45.000, 7.000),
            Panorama::new(2, 45.002, 7.001),
            Panorama::new(3, 45.005, 7.005),
            Panorama::new(4, 45.003, 7.000),
            Panorama::new(5, 45.000, 7.004),
            Panorama::new(6, 46.000, 7.000),
        ];
        let seq = sequence_of(&panos);
        assert_eq!(seq.len(), 6);
        // The dense walk starts at the northeast-most point
        assert_eq!(seq.ids()[0], 3);
        assert_eq!(seq.ids()[5], 6);
    }

    #[test]
    fn test_sequence_wraps() {
        let seq = Sequence::from_ids(vec![7, 8, 9]);
        assert_eq!(seq.next_after(9), Some(7));
        assert_eq!(seq.prev_before(7), Some(9));
        assert_eq!(seq.next_after(8), Some(9));
        assert_eq!(seq.next_after(42), None);

        let single = Sequence::from_ids(vec![1]);
        assert_eq!(single.next_after(1), None);
        assert_eq!(single.prev_before(1), None);
    }

    #[test]
    fn test_noise_only_input() {
        let panos = vec![
            Panorama::new(1, 0.0, 0.0),
            Panorama::new(2, 10.0, 10.0),
            Panorama::new(3, f64::NAN, 0.0),
        ];
        let index = SpatialIndex::build(&panos, 0.001);
        let cache = DistanceCache::new(6);
        let clusters = cluster_panoramas(
            &panos,
            &index,
            &cache,
            ClusterParams { radius_km: degrees_to_km(0.01), min_neighbors: 2 },
        );
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].kind, ClusterKind::Noise);

        let seq = build_sequence(&clusters, &panos, &cache, &SequenceParams::default());
        let mut ids = seq.ids().to_vec();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    proptest! {
        #[test]
        fn prop_sequence_is_permutation(
            coords in prop::collection::vec((44.9f64..45.1, 6.9f64..7.1), 0..50)
        ) {
            let panos: Vec<Panorama> = coords
                .iter()
                .enumerate()
                .map(|(i, (lat, lon))| Panorama::new(i as i64, *lat, *lon))
                .collect();
            let seq = sequence_of(&panos);

            let mut ids = seq.ids().to_vec();
            ids.sort();
            let expected: Vec<i64> = (0..panos.len() as i64).collect();
            prop_assert_eq!(ids, expected);
        }

        #[test]
        fn prop_sequence_deterministic(
            coords in prop::collection::vec((44.9f64..45.1, 6.9f64..7.1), 0..40)
        ) {
            let panos: Vec<Panorama> = coords
                .iter()
                .enumerate()
                .map(|(i, (lat, lon))| Panorama::new(i as i64, *lat, *lon))
                .collect();
            let first = sequence_of(&panos);
            let second = sequence_of(&panos);
            prop_assert_eq!(first.ids(), second.ids());
        }
    }
}
