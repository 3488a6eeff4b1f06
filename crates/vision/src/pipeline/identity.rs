//! Identity stitching: runs the tracker on the eligible subset and merges the
//! resulting track ids back into the full detection set.

use ml_core::{Detection, Tracker};

use crate::pipeline::{error::StageError, filter::FilteredDetections};

/// Attach track ids to the eligible entries of `filtered`.
///
/// Returns the number of detections that received an identity. On any tracker
/// failure or contract violation every id in the batch is cleared and the error
/// is returned; ineligible entries never carry an id either way.
pub fn stitch_identities(
    filtered: &mut FilteredDetections,
    tracker: &mut dyn Tracker,
) -> Result<usize, StageError> {
    filtered.detections.clear_track_ids();
    if !filtered.any_eligible() {
        return Ok(0);
    }

    let subset: Vec<Detection> = filtered
        .detections
        .iter()
        .zip(&filtered.eligible)
        .filter(|(_, eligible)| **eligible)
        .map(|(detection, _)| detection.clone())
        .collect();

    let tracked = tracker
        .update(&subset)
        .map_err(|err| StageError::Tracking(format!("{err:#}")))?;
    if tracked.len() != subset.len() {
        return Err(StageError::Tracking(format!(
            "tracker returned {} results for {} detections",
            tracked.len(),
            subset.len()
        )));
    }

    let mut ids = Vec::with_capacity(filtered.eligible.len());
    let mut next = 0;
    for eligible in &filtered.eligible {
        if !*eligible {
            ids.push(None);
            continue;
        }
        match tracked.get(next).and_then(|result| result.track_id) {
            Some(id) => ids.push(Some(id)),
            None => {
                return Err(StageError::Tracking(format!(
                    "tracker left result #{next} without an identity"
                )));
            }
        }
        next += 1;
    }

    for (detection, id) in filtered.detections.detections.iter_mut().zip(ids) {
        detection.track_id = id;
    }
    Ok(next)
}
