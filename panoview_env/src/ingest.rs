//! Ingestion boundary: validate records before they reach the navigator.

use crate::error::SourceError;
use crate::source::PanoramaSource;
use panoview_core::{Panorama, PanoramaId, SpatialNavigator};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// Why a record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// NaN/infinite or outside WGS84 ranges
    InvalidCoordinates,
    /// Id already seen earlier in the same batch
    DuplicateId,
}

/// A dropped record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub id: PanoramaId,
    pub reason: RejectionReason,
}

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: Vec<Rejection>,
}

/// Splits `records` into navigable panoramas and rejections.
///
/// Input order is preserved; for duplicate ids the first record wins.
pub fn ingest(records: Vec<Panorama>) -> (Vec<Panorama>, IngestReport) {
    let mut seen: HashSet<PanoramaId> = HashSet::with_capacity(records.len());
    let mut accepted = Vec::with_capacity(records.len());
    let mut report = IngestReport::default();

    for pano in records {
        let reason = if !pano.has_valid_position() {
            Some(RejectionReason::InvalidCoordinates)
        } else if !seen.insert(pano.id) {
            Some(RejectionReason::DuplicateId)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                warn!(
                    "Rejecting panorama {} ({:?}) at ({}, {})",
                    pano.id, reason, pano.latitude, pano.longitude
                );
                report.rejected.push(Rejection { id: pano.id, reason });
            }
            None => accepted.push(pano),
        }
    }

    report.accepted = accepted.len();
    (accepted, report)
}

/// Loads `source`, validates the records and rebuilds `navigator`.
///
/// # Returns
/// * `Ok(report)` - The navigator now holds the accepted panoramas
/// * `Err(SourceError::Empty)` - The source had records but none were valid;
///   the navigator keeps its previous set
pub async fn feed<S>(source: &S, navigator: &mut SpatialNavigator) -> Result<IngestReport, SourceError>
where
    S: PanoramaSource + ?Sized,
{
    let records = source.load().await?;
    let total = records.len();
    let (accepted, report) = ingest(records);

    if accepted.is_empty() && total > 0 {
        return Err(SourceError::Empty(source.name().to_string()));
    }

    navigator.set_panoramas(accepted);
    info!(
        "Fed {} of {} panoramas from {} ({} rejected)",
        report.accepted,
        total,
        source.name(),
        report.rejected.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;

    #[test]
    fn test_ingest_filters_invalid_and_duplicates() {
        let (ok, report) = ingest(vec![
            Panorama::new(1, 10.0, 10.0),
            Panorama::new(2, f64::NAN, 10.0),
            Panorama::new(3, 10.0, 200.0),
            Panorama::new(1, 11.0, 11.0),
            Panorama::new(4, -90.0, -180.0),
        ]);

        let ids: Vec<i64> = ok.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(ok[0].latitude, 10.0);
        assert_eq!(report.accepted, 2);
        assert_eq!(
            report.rejected,
            vec![
                Rejection { id: 2, reason: RejectionReason::InvalidCoordinates },
                Rejection { id: 3, reason: RejectionReason::InvalidCoordinates },
                Rejection { id: 1, reason: RejectionReason::DuplicateId },
            ]
        );
    }

    #[tokio::test]
    async fn test_feed_rebuilds_navigator() {
        let source = StaticSource::new(
            "street",
            vec![
                Panorama::new(1, 0.0, 0.0),
                Panorama::new(2, 0.0, 0.001),
                Panorama::new(3, f64::NAN, 0.0),
            ],
        );
        let mut nav = SpatialNavigator::with_defaults();
        let report = feed(&source, &mut nav).await.unwrap();

        assert_eq!(report.accepted, 2);
        assert_eq!(nav.sequence().len(), 2);
        assert!(nav.panorama(3).is_none());
    }

    #[tokio::test]
    async fn test_feed_all_invalid_keeps_previous_set() {
        let mut nav = SpatialNavigator::with_defaults();
        nav.set_panoramas(vec![Panorama::new(1, 0.0, 0.0)]);

        let source = StaticSource::new("broken", vec![Panorama::new(9, 100.0, 0.0)]);
        let result = feed(&source, &mut nav).await;
        assert!(matches!(result, Err(SourceError::Empty(_))));
        assert!(nav.panorama(1).is_some());
    }

    #[tokio::test]
    async fn test_feed_through_trait_object() {
        let source: Box<dyn PanoramaSource> =
            Box::new(StaticSource::new("boxed", vec![Panorama::new(5, 1.0, 1.0)]));
        let mut nav = SpatialNavigator::with_defaults();
        feed(source.as_ref(), &mut nav).await.unwrap();
        assert!(nav.panorama(5).is_some());
    }
}
