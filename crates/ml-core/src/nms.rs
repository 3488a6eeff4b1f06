//! Class-aware non-max suppression.

use std::cmp::Ordering;

use crate::detection::Detection;

/// Indices of the detections that survive suppression, in input order.
///
/// Candidates are visited by descending confidence; a candidate is dropped when
/// an already kept box of the same class overlaps it with IoU above
/// `iou_threshold`. The sort is stable, so among equal confidences the earlier
/// detection wins.
pub fn nms_keep_indices(detections: &[Detection], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .partial_cmp(&detections[a].confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<usize> = Vec::with_capacity(order.len());
    for index in order {
        let candidate = &detections[index];
        let suppressed = kept.iter().any(|&prev| {
            let other = &detections[prev];
            other.class_id == candidate.class_id
                && other.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(index);
        }
    }

    kept.sort_unstable();
    kept
}

/// Apply [`nms_keep_indices`] and return the surviving detections in input order.
pub fn non_max_suppression(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let keep = nms_keep_indices(&detections, iou_threshold);
    let mut keep = keep.into_iter().peekable();
    detections
        .into_iter()
        .enumerate()
        .filter_map(|(index, detection)| {
            if keep.peek() == Some(&index) {
                keep.next();
                Some(detection)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn det(x1: f32, conf: f32, class_id: usize) -> Detection {
        Detection::new(BoundingBox::new(x1, 0.0, x1 + 10.0, 10.0), conf, class_id)
    }

    #[test]
    fn keeps_the_more_confident_of_two_overlapping_boxes() {
        let out = non_max_suppression(vec![det(0.0, 0.5, 0), det(1.0, 0.9, 0)], 0.3);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].confidence, 0.9);
    }

    #[test]
    fn different_classes_never_suppress_each_other() {
        let out = non_max_suppression(vec![det(0.0, 0.5, 0), det(0.0, 0.9, 1)], 0.3);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn survivors_keep_input_order() {
        let input = vec![det(100.0, 0.4, 0), det(0.0, 0.8, 0), det(50.0, 0.6, 1)];
        let out = non_max_suppression(input.clone(), 0.3);
        assert_eq!(out, input);
    }

    #[test]
    fn equal_confidence_keeps_first_seen() {
        let keep = nms_keep_indices(&[det(0.0, 0.7, 0), det(1.0, 0.7, 0)], 0.3);
        assert_eq!(keep, vec![0]);
    }

    #[test]
    fn overlap_at_threshold_is_not_suppressed() {
        // IoU of these boxes is exactly 1/3.
        let a = Detection::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.9, 0);
        let b = Detection::new(BoundingBox::new(5.0, 0.0, 15.0, 10.0), 0.8, 0);
        let iou = a.bbox.iou(&b.bbox);
        assert_eq!(non_max_suppression(vec![a.clone(), b.clone()], iou).len(), 2);
        assert_eq!(non_max_suppression(vec![a, b], iou - 0.01).len(), 1);
    }
}
