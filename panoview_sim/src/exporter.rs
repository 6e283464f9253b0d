//! JSON exporter for walk-through playback.
//!
//! Exports the panorama set, its clusters and a frame per sequence step
//! (the navigation context a viewer would see there).

use panoview_core::pano_geo::bearing_deg;
use panoview_core::{ClusterKind, NavigationContext, Panorama, PanoramaDirection, PanoramaId, SpatialNavigator};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// Position of a panorama.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanoramaPosition {
    pub id: PanoramaId,
    pub lat: f64,
    pub lon: f64,
}

impl From<&Panorama> for PanoramaPosition {
    fn from(p: &Panorama) -> Self {
        Self {
            id: p.id,
            lat: p.latitude,
            lon: p.longitude,
        }
    }
}

/// One cluster of the build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterFrame {
    pub noise: bool,
    pub members: Vec<PanoramaId>,
}

/// A neighbour as shown in a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighbourFrame {
    pub id: PanoramaId,
    pub distance_km: f64,
    pub bearing_deg: f64,
    pub confidence: f64,
}

impl From<&PanoramaDirection> for NeighbourFrame {
    fn from(d: &PanoramaDirection) -> Self {
        Self {
            id: d.panorama.id,
            distance_km: d.distance_km,
            bearing_deg: d.bearing_deg,
            confidence: d.confidence,
        }
    }
}

/// A single step of the walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkFrame {
    pub step: usize,
    pub current: PanoramaPosition,
    pub viewing_angle_deg: f64,
    pub nearest: Vec<NeighbourFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ahead: Option<NeighbourFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behind: Option<NeighbourFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<NeighbourFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<NeighbourFrame>,
}

impl WalkFrame {
    fn from_context(step: usize, ctx: &NavigationContext) -> Self {
        Self {
            step,
            current: PanoramaPosition::from(&ctx.current),
            viewing_angle_deg: ctx.viewing_angle_deg,
            nearest: ctx.nearest.iter().map(NeighbourFrame::from).collect(),
            ahead: ctx.ahead.as_ref().map(NeighbourFrame::from),
            behind: ctx.behind.as_ref().map(NeighbourFrame::from),
            left: ctx.left.as_ref().map(NeighbourFrame::from),
            right: ctx.right.as_ref().map(NeighbourFrame::from),
        }
    }
}

/// Complete scenario export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub panoramas: Vec<PanoramaPosition>,
    pub clusters: Vec<ClusterFrame>,
    pub sequence: Vec<PanoramaId>,

    /// One frame per sequence step
    pub frames: Vec<WalkFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            panoramas: Vec::new(),
            clusters: Vec::new(),
            sequence: Vec::new(),
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Records the navigator's build and walks its sequence once.
    ///
    /// Each frame faces the next panorama of the sequence, so `ahead` shows
    /// what a click straight forward would pick.
    pub fn capture(&mut self, navigator: &SpatialNavigator) {
        self.panoramas = navigator.panoramas().iter().map(PanoramaPosition::from).collect();
        self.clusters = navigator
            .clusters()
            .into_iter()
            .map(|(kind, members)| ClusterFrame {
                noise: kind == ClusterKind::Noise,
                members,
            })
            .collect();
        self.sequence = navigator.sequence().ids().to_vec();

        self.frames.clear();
        let sequence = self.sequence.clone();
        for (step, &id) in sequence.iter().enumerate() {
            let Some(current) = navigator.panorama(id) else {
                continue;
            };
            let facing = navigator
                .sequence()
                .next_after(id)
                .and_then(|next| navigator.panorama(next))
                .map(|next| bearing_deg(current.latitude, current.longitude, next.latitude, next.longitude))
                .unwrap_or(0.0);
            if let Some(ctx) = navigator.update_navigation_context(id, facing) {
                self.add_frame(WalkFrame::from_context(step, &ctx));
            }
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: WalkFrame) {
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_one_frame_per_step() {
        let mut navigator = SpatialNavigator::with_defaults();
        navigator.set_panoramas(vec![
            Panorama::new(1, 45.0000, 7.0),
            Panorama::new(2, 45.0005, 7.0),
            Panorama::new(3, 45.0010, 7.0),
        ]);

        let mut export = SimExport::new("street_walk", 42);
        export.capture(&navigator);
        export.finalize(true, None);

        assert_eq!(export.panoramas.len(), 3);
        assert_eq!(export.frames.len(), 3);
        assert_eq!(export.sequence.len(), 3);
        assert!(export.clusters.iter().all(|c| !c.noise));

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["scenario"], "street_walk");
        assert!(json.get("failure_reason").is_none());
    }
}
