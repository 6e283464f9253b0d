//! PanoView Core - Geo-Spatial Navigation for 360° Panorama Sets
//!
//! Given geo-tagged panoramas, this library answers the questions a
//! panorama viewer asks while the user walks around:
//! 1. **What is nearby?** Grid spatial index + memoised haversine distances
//! 2. **In what order should they be visited?** Density clusters chained
//!    into one greedy, heading-aware walk
//! 3. **What lies ahead, behind, left, right?** Confidence-scored
//!    directional lookups, including click-to-navigate on the viewing sphere

pub mod pano_geo;
pub mod pano_space;
pub mod pano_cluster;
pub mod pano_sequence;
pub mod pano_direction;
pub mod navigator;

// Re-export key types for convenience
pub use navigator::{ContextReceiver, NavError, NavigationContext, NavigatorConfig, NavigatorStats, SpatialNavigator};
pub use pano_cluster::{Cluster, ClusterKind};
pub use pano_direction::{Direction, PanoramaDirection};
pub use pano_geo::Cardinal;
pub use pano_sequence::Sequence;
pub use pano_space::{GridKey, Panorama, PanoramaId, SpatialIndex};
