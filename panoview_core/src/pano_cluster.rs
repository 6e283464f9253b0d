//! Density clustering of panoramas (DBSCAN-style)
//!
//! A panorama with at least `min_neighbors` other panoramas within
//! `radius_km` seeds a cluster, which then grows breadth-first through
//! the unvisited neighbours of every dense member. A point already found
//! sparse stays noise even if a later cluster reaches it. Whatever is left
//! over (sparse points and points with unusable coordinates) is gathered
//! into a single trailing noise cluster.
//!
//! The output always partitions the input: each index appears in exactly
//! one cluster.

use crate::pano_space::{DistanceCache, Panorama, SpatialIndex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterKind {
    /// Density-connected group
    Dense,
    /// Residual points that met no density requirement
    Noise,
}

/// A group of panoramas, as indices into the clustered slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub kind: ClusterKind,
    pub members: Vec<usize>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_noise(&self) -> bool {
        self.kind == ClusterKind::Noise
    }
}

/// Density parameters
#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    /// Neighbourhood radius in km
    pub radius_km: f64,
    /// Neighbours (excluding the point itself) required to be dense
    pub min_neighbors: usize,
}

/// Neighbours of `i` within the radius, excluding `i`.
fn region_query(
    i: usize,
    panoramas: &[Panorama],
    index: &SpatialIndex,
    cache: &DistanceCache,
    radius_km: f64,
) -> Vec<usize> {
    let p = &panoramas[i];
    index
        .query_radius(panoramas, cache, p.latitude, p.longitude, radius_km)
        .into_iter()
        .filter_map(|(j, _)| (j != i).then_some(j))
        .collect()
}

/// Clusters `panoramas` using the prebuilt `index`.
///
/// Dense clusters come out in discovery order (input order of their first
/// member); the noise cluster, if any, is last.
pub fn cluster_panoramas(
    panoramas: &[Panorama],
    index: &SpatialIndex,
    cache: &DistanceCache,
    params: ClusterParams,
) -> Vec<Cluster> {
    let n = panoramas.len();
    let mut visited = vec![false; n];
    let mut noise_candidates: Vec<usize> = Vec::new();
    let mut clusters: Vec<Cluster> = Vec::new();

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        if !panoramas[i].has_valid_position() {
            noise_candidates.push(i);
            continue;
        }

        let neighbors = region_query(i, panoramas, index, cache, params.radius_km);
        if neighbors.len() < params.min_neighbors {
            noise_candidates.push(i);
            continue;
        }

        let mut members = vec![i];
        let mut queue: VecDeque<usize> = neighbors.into_iter().filter(|j| !visited[*j]).collect();

        while let Some(j) = queue.pop_front() {
            // Already clustered, or already settled as noise
            if visited[j] {
                continue;
            }
            visited[j] = true;
            members.push(j);

            let next = region_query(j, panoramas, index, cache, params.radius_km);
            if next.len() >= params.min_neighbors {
                queue.extend(next.into_iter().filter(|k| !visited[*k]));
            }
        }

        clusters.push(Cluster {
            kind: ClusterKind::Dense,
            members,
        });
    }

    let noise = noise_candidates;

    debug!(
        "Clustered {} panoramas into {} dense clusters + {} noise",
        n,
        clusters.len(),
        noise.len()
    );

    if !noise.is_empty() {
        clusters.push(Cluster {
            kind: ClusterKind::Noise,
            members: noise,
        });
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pano_geo::degrees_to_km;
    use proptest::prelude::*;

    fn run(panos: &[Panorama]) -> Vec<Cluster> {
        let index = SpatialIndex::build(panos, 0.001);
        let cache = DistanceCache::new(6);
        cluster_panoramas(
            panos,
            &index,
            &cache,
            ClusterParams {
                radius_km: degrees_to_km(0.01),
                min_neighbors: 2,
            },
        )
    }

    fn assert_partition(clusters: &[Cluster], n: usize) {
        let mut seen = vec![0usize; n];
        for c in clusters {
            assert!(!c.is_empty());
            for &m in &c.members {
                seen[m] += 1;
            }
        }
        assert!(seen.iter().all(|&s| s == 1), "not a partition: {:?}", seen);
    }

    #[test]
    fn test_five_dense_plus_outlier() {
        let panos = vec![
            Panorama::new(1, 45.0000, 7.0000),
            Panorama::new(2, 45.0020, 7.0010),
            Panorama::new(3, 45.0050, 7.0050),
            Panorama::new(4, 45.0030, 7.0000),
            Panorama::new(5, 45.0000, 7.0040),
            Panorama::new(6, 46.0000, 7.0000),
        ];
        let clusters = run(&panos);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].kind, ClusterKind::Dense);
        assert_eq!(clusters[0].len(), 5);
        assert!(clusters[1].is_noise());
        assert_eq!(clusters[1].members, vec![5]);
        assert_partition(&clusters, panos.len());
    }

    #[test]
    fn test_chain_expands_through_neighbors() {
        // A line of points 0.004° apart: each interior point has two
        // neighbours, so the chain is one cluster end to end.
        let panos: Vec<Panorama> = (0..10)
            .map(|i| Panorama::new(i, 10.0, 20.0 + i as f64 * 0.004))
            .collect();
        let clusters = run(&panos);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 10);
        assert_eq!(clusters[0].kind, ClusterKind::Dense);
    }

    #[test]
    fn test_sparse_first_point_stays_noise() {
        // Endpoint seen first has one neighbour and is settled as noise; the
        // dense middle found afterwards does not pull it back in.
        let panos = vec![
            Panorama::new(1, 0.0, 0.000),
            Panorama::new(2, 0.0, 0.008),
            Panorama::new(3, 0.0, 0.012),
            Panorama::new(4, 0.0, 0.016),
        ];
        let clusters = run(&panos);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].kind, ClusterKind::Dense);
        assert_eq!(clusters[0].members, vec![1, 2, 3]);
        assert!(clusters[1].is_noise());
        assert_eq!(clusters[1].members, vec![0]);
        assert_partition(&clusters, panos.len());
    }

    #[test]
    fn test_sparse_point_reached_first_by_expansion_joins() {
        // Same line, dense middle listed first: the endpoint is still
        // unvisited when the cluster expands and joins it.
        let panos = vec![
            Panorama::new(2, 0.0, 0.008),
            Panorama::new(1, 0.0, 0.000),
            Panorama::new(3, 0.0, 0.012),
            Panorama::new(4, 0.0, 0.016),
        ];
        let clusters = run(&panos);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_invalid_coordinates_are_noise() {
        let panos = vec![
            Panorama::new(1, 0.0, 0.0),
            Panorama::new(2, f64::NAN, 0.0),
            Panorama::new(3, 0.0, 0.001),
            Panorama::new(4, 0.001, 0.0),
        ];
        let clusters = run(&panos);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].len(), 3);
        assert_eq!(clusters[1].members, vec![1]);
        assert_partition(&clusters, panos.len());
    }

    #[test]
    fn test_empty_input() {
        assert!(run(&[]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_clusters_partition_input(
            coords in prop::collection::vec((44.95f64..45.05, 6.95f64..7.05), 0..60)
        ) {
            let panos: Vec<Panorama> = coords
                .iter()
                .enumerate()
                .map(|(i, (lat, lon))| Panorama::new(i as i64, *lat, *lon))
                .collect();
            let clusters = run(&panos);

            let mut seen = vec![0usize; panos.len()];
            for c in &clusters {
                for &m in &c.members {
                    seen[m] += 1;
                }
            }
            prop_assert!(seen.iter().all(|&s| s == 1));
            prop_assert!(clusters.iter().filter(|c| c.is_noise()).count() <= 1);
        }
    }
}
