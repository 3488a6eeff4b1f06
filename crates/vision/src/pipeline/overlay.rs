//! Stats overlay: source label, running FPS and per-class counts.

use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use ml_core::{ClassTaxonomy, DetectionSet};

use crate::pipeline::annotation::{TEXT_SCALE, draw_text};

const MARGIN_X: i32 = 10;
const SOURCE_Y: i32 = 10;
const LINE_STEP: i32 = 30;
const SECTION_GAP: i32 = 10;
const CLASS_STEP: i32 = 25;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// Frame counters for one run of the generation loop.
#[derive(Debug, Clone)]
pub struct FrameCounters {
    pub frames_processed: u64,
    pub session_start: Instant,
}

impl Default for FrameCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCounters {
    pub fn new() -> Self {
        Self {
            frames_processed: 0,
            session_start: Instant::now(),
        }
    }

    /// Count one processed frame and return the average FPS so far.
    pub fn record_frame(&mut self) -> f64 {
        self.frames_processed += 1;
        average_fps(self.frames_processed, self.session_start.elapsed())
    }
}

/// `frames / elapsed`, or zero before any time has passed.
pub fn average_fps(frames: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { frames as f64 / secs } else { 0.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCount {
    pub class_id: usize,
    pub display_name: String,
    pub color: [u8; 3],
    pub count: usize,
}

/// Per-class counts keyed by display name, one entry for every taxonomy class
/// (zero if unseen). Ids outside the taxonomy are not counted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassCounts(Vec<ClassCount>);

impl ClassCounts {
    pub fn tally(detections: &DetectionSet, taxonomy: &ClassTaxonomy) -> Self {
        let mut counts: Vec<ClassCount> = taxonomy
            .classes()
            .iter()
            .enumerate()
            .map(|(class_id, class)| ClassCount {
                class_id,
                display_name: class.display_name.clone(),
                color: class.color,
                count: 0,
            })
            .collect();

        for detection in detections {
            let Some(class) = taxonomy.get(detection.class_id) else {
                continue;
            };
            if let Some(entry) = counts.iter_mut().find(|c| c.display_name == class.display_name) {
                entry.count += 1;
            }
        }
        Self(counts)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassCount> {
        self.0.iter()
    }

    pub fn nonzero(&self) -> impl Iterator<Item = &ClassCount> {
        self.0.iter().filter(|c| c.count > 0)
    }

    pub fn total(&self) -> usize {
        self.0.iter().map(|c| c.count).sum()
    }
}

/// Text lines drawn by [`render_overlay`], top to bottom, with their y offset.
pub fn overlay_lines(source_label: &str, fps: f64, counts: &ClassCounts) -> Vec<(i32, String, Rgb<u8>)> {
    let mut lines = vec![
        (SOURCE_Y, format!("Source: {source_label}"), WHITE),
        (SOURCE_Y + LINE_STEP, format!("FPS: {fps:.1}"), GREEN),
    ];
    let mut y = SOURCE_Y + 2 * LINE_STEP + SECTION_GAP;
    for count in counts.nonzero() {
        lines.push((y, format!("{}: {}", count.display_name, count.count), Rgb(count.color)));
        y += CLASS_STEP;
    }
    lines
}

/// Draw the stats overlay in the top-left corner of `image`.
pub fn render_overlay(image: &mut RgbImage, source_label: &str, fps: f64, counts: &ClassCounts) {
    for (y, text, color) in overlay_lines(source_label, fps, counts) {
        draw_text(image, MARGIN_X, y, &text, TEXT_SCALE, color);
    }
}

#[cfg(test)]
mod tests {
    use ml_core::{BoundingBox, Detection};

    use super::*;

    fn det(class_id: usize) -> Detection {
        Detection::new(BoundingBox::new(0.0, 0.0, 5.0, 5.0), 0.9, class_id)
    }

    #[test]
    fn empty_set_counts_are_all_zero() {
        let taxonomy = ClassTaxonomy::default();
        let counts = ClassCounts::tally(&DetectionSet::empty(), &taxonomy);
        assert_eq!(counts.iter().count(), taxonomy.classes().len());
        assert_eq!(counts.total(), 0);
        assert_eq!(overlay_lines("0", 0.0, &counts).len(), 2);
    }

    #[test]
    fn class_lines_follow_fps_in_taxonomy_order() {
        let taxonomy = ClassTaxonomy::default();
        let detections = DetectionSet::new(vec![det(2), det(0), det(2), det(9)]);
        let counts = ClassCounts::tally(&detections, &taxonomy);
        let lines = overlay_lines("clip.mp4", 12.34, &counts);
        let text: Vec<_> = lines.iter().map(|(y, t, _)| (*y, t.as_str())).collect();
        assert_eq!(
            text,
            vec![
                (10, "Source: clip.mp4"),
                (40, "FPS: 12.3"),
                (80, "Oddiy Harakat: 1"),
                (105, "Jabrlangan Shaxs: 2"),
            ]
        );
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn unknown_classes_are_not_counted() {
        let taxonomy = ClassTaxonomy::default();
        let counts = ClassCounts::tally(&DetectionSet::new(vec![det(7)]), &taxonomy);
        assert_eq!(counts.iter().count(), taxonomy.classes().len());
        assert_eq!(counts.nonzero().count(), 0);
        assert_eq!(overlay_lines("0", 1.0, &counts).len(), 2);
    }

    #[test]
    fn fps_is_zero_without_elapsed_time() {
        assert_eq!(average_fps(10, Duration::ZERO), 0.0);
        assert_eq!(average_fps(10, Duration::from_secs(2)), 5.0);
    }

    #[test]
    fn overlay_draws_into_the_top_left_corner() {
        let mut image = RgbImage::new(320, 240);
        let counts = ClassCounts::tally(&DetectionSet::new(vec![det(1)]), &ClassTaxonomy::default());
        render_overlay(&mut image, "0", 30.0, &counts);
        let painted: Vec<_> = image
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0 != [0, 0, 0])
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!painted.is_empty());
        assert!(painted.iter().all(|&(_, y)| y < 110));
    }
}
