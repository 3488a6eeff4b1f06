mod common;

use image::{Rgb, RgbImage};
use ml_core::{
    BoundingBox, ClassTaxonomy, Detection, DetectionSet, Detector, IouTracker, Tracker,
};
use video_ingest::Frame;
use vision::{
    ClassCounts, PipelineConfig, annotate, filter_detections, format_label, stitch_identities,
};

use common::{FixedDetector, detection};

/// Deterministic pseudo-random detections spread over a 200x200 area.
fn scattered_detections(count: usize, seed: u64) -> Vec<Detection> {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as f32 / (1u64 << 31) as f32
    };
    (0..count)
        .map(|_| {
            let x = next() * 160.0;
            let y = next() * 160.0;
            let w = 10.0 + next() * 40.0;
            let h = 10.0 + next() * 40.0;
            let confidence = next();
            let class_id = (next() * 5.0) as usize;
            Detection::new(BoundingBox::new(x, y, x + w, y + h), confidence, class_id)
        })
        .collect()
}

#[test]
fn filtered_detections_respect_confidence_and_overlap_bounds() {
    let config = PipelineConfig::default();
    let taxonomy = ClassTaxonomy::default();

    for seed in 1..=25 {
        let raw = DetectionSet::new(scattered_detections(40, seed));
        let filtered = filter_detections(
            raw,
            config.confidence_threshold,
            config.nms_iou_threshold,
            &taxonomy,
        );

        assert_eq!(filtered.eligible.len(), filtered.detections.len());
        let kept = &filtered.detections.detections;
        for (i, a) in kept.iter().enumerate() {
            assert!(a.confidence > config.confidence_threshold);
            assert_eq!(filtered.eligible[i], taxonomy.is_trackable(a.class_id));
            for b in &kept[i + 1..] {
                if a.class_id == b.class_id {
                    assert!(
                        a.bbox.iou(&b.bbox) <= config.nms_iou_threshold,
                        "seed {seed}: overlapping same-class survivors"
                    );
                }
            }
        }
    }
}

#[test]
fn stitched_ids_only_on_trackable_classes() {
    let taxonomy = ClassTaxonomy::default();
    let mut tracker = IouTracker::new(30, 0.3);

    for seed in 1..=10 {
        let raw = DetectionSet::new(scattered_detections(30, seed));
        let mut filtered = filter_detections(raw, 0.35, 0.3, &taxonomy);
        let expected = filtered.eligible_count();
        let tracked = stitch_identities(&mut filtered, &mut tracker).expect("stitch");
        assert_eq!(tracked, expected);
        for detection in filtered.detections.iter() {
            assert_eq!(
                detection.track_id.is_some(),
                taxonomy.is_trackable(detection.class_id)
            );
        }
    }
}

#[test]
fn confident_trackable_detection_is_labelled_with_its_identity() {
    let taxonomy = ClassTaxonomy::default();
    let frame = Frame::from_rgb_image(&RgbImage::from_pixel(320, 240, Rgb([0, 0, 0])));
    let detector = FixedDetector(vec![detection(50.0, 80.0, 0.9, 0)]);
    let mut tracker = IouTracker::for_frame_rate(30.0, 0.3);

    let detections = detector.detect(&frame).expect("detect");
    let mut filtered = filter_detections(detections, 0.35, 0.3, &taxonomy);
    stitch_identities(&mut filtered, &mut tracker).expect("stitch");

    let label = format_label(&filtered.detections.detections[0], &taxonomy);
    assert!(label.contains("Oddiy Harakat"), "{label}");
    assert!(label.contains("90%"), "{label}");
    assert!(label.ends_with("ID:1"), "{label}");
}

#[test]
fn nothing_detected_means_identical_frame_and_zero_counts() {
    let taxonomy = ClassTaxonomy::default();
    let canvas = RgbImage::from_fn(80, 60, |x, y| Rgb([x as u8, y as u8, 7]));
    let filtered = filter_detections(DetectionSet::empty(), 0.35, 0.3, &taxonomy);

    let annotated = annotate(&canvas, &filtered.detections, &taxonomy).expect("annotate");
    assert_eq!(annotated, canvas);

    let counts = ClassCounts::tally(&filtered.detections, &taxonomy);
    assert!(counts.iter().all(|count| count.count == 0));
    assert_eq!(counts.nonzero().count(), 0);
}

#[test]
fn tracker_batches_preserve_length() {
    let taxonomy = ClassTaxonomy::default();
    let mut tracker = IouTracker::new(5, 0.3);
    let raw = DetectionSet::new(scattered_detections(50, 99));
    let filtered = filter_detections(raw, 0.35, 0.3, &taxonomy);

    let subset: Vec<_> = filtered
        .detections
        .iter()
        .zip(&filtered.eligible)
        .filter(|(_, eligible)| **eligible)
        .map(|(d, _)| d.clone())
        .collect();
    let out = tracker.update(&subset).expect("update");
    assert_eq!(out.len(), subset.len());
}
