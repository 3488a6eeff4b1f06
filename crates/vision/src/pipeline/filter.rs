//! Detection filter: confidence gate, same-class NMS and the tracking
//! eligibility mask.

use ml_core::{ClassTaxonomy, DetectionSet, non_max_suppression};

/// Filtered detections together with a same-length eligibility mask.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredDetections {
    pub detections: DetectionSet,
    /// `eligible[i]` is true iff `detections[i]` belongs to a trackable class.
    pub eligible: Vec<bool>,
}

impl FilteredDetections {
    pub fn any_eligible(&self) -> bool {
        self.eligible.iter().any(|&flag| flag)
    }

    pub fn eligible_count(&self) -> usize {
        self.eligible.iter().filter(|&&flag| flag).count()
    }
}

/// Gate by confidence (strictly greater than `confidence_threshold`), suppress
/// overlapping same-class boxes, and mark which survivors may be tracked.
/// Relative order of survivors is preserved.
pub fn filter_detections(
    detections: DetectionSet,
    confidence_threshold: f32,
    nms_iou_threshold: f32,
    taxonomy: &ClassTaxonomy,
) -> FilteredDetections {
    if detections.is_empty() {
        return FilteredDetections::default();
    }

    let confident: Vec<_> = detections
        .into_iter()
        .filter(|detection| detection.confidence > confidence_threshold)
        .collect();
    let survivors = non_max_suppression(confident, nms_iou_threshold);
    let eligible = survivors
        .iter()
        .map(|detection| taxonomy.is_trackable(detection.class_id))
        .collect();

    FilteredDetections {
        detections: DetectionSet::new(survivors),
        eligible,
    }
}
