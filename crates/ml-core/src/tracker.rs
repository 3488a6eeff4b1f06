//! Multi-object tracker collaborator and the default IoU tracker.

use std::cmp::Ordering;

use anyhow::Result;

use crate::detection::{BoundingBox, Detection};

/// Assigns stable identities to detections across frames.
pub trait Tracker: Send {
    /// Returns one detection per input, in input order, each carrying a track id.
    fn update(&mut self, detections: &[Detection]) -> Result<Vec<Detection>>;
}

/// Builds a fresh [`Tracker`] for each source activation.
pub trait TrackerFactory: Send + Sync {
    fn create(&self, frame_rate: f64) -> Box<dyn Tracker>;
}

#[derive(Debug, Clone)]
struct Track {
    id: u64,
    bbox: BoundingBox,
    class_id: usize,
    missed: u32,
}

/// Greedy IoU tracker.
///
/// Detections are matched to live tracks of the same class by descending IoU;
/// unmatched detections open new tracks. A track survives `max_age` consecutive
/// frames without a match.
#[derive(Debug, Clone)]
pub struct IouTracker {
    tracks: Vec<Track>,
    next_id: u64,
    max_age: u32,
    iou_threshold: f32,
}

impl IouTracker {
    pub fn new(max_age: u32, iou_threshold: f32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            max_age,
            iou_threshold,
        }
    }

    /// Keep unmatched tracks alive for roughly one second of video.
    pub fn for_frame_rate(frame_rate: f64, iou_threshold: f32) -> Self {
        let max_age = if frame_rate.is_finite() && frame_rate > 0.0 {
            frame_rate.round().clamp(1.0, 300.0) as u32
        } else {
            30
        };
        Self::new(max_age, iou_threshold)
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn max_age(&self) -> u32 {
        self.max_age
    }
}

impl Tracker for IouTracker {
    fn update(&mut self, detections: &[Detection]) -> Result<Vec<Detection>> {
        let mut candidates = Vec::new();
        for (det_idx, detection) in detections.iter().enumerate() {
            for (track_idx, track) in self.tracks.iter().enumerate() {
                if track.class_id != detection.class_id {
                    continue;
                }
                let iou = track.bbox.iou(&detection.bbox);
                if iou >= self.iou_threshold {
                    candidates.push((det_idx, track_idx, iou));
                }
            }
        }
        candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));

        let mut det_track: Vec<Option<usize>> = vec![None; detections.len()];
        let mut track_taken = vec![false; self.tracks.len()];
        for (det_idx, track_idx, _) in candidates {
            if det_track[det_idx].is_none() && !track_taken[track_idx] {
                det_track[det_idx] = Some(track_idx);
                track_taken[track_idx] = true;
            }
        }

        for (track, taken) in self.tracks.iter_mut().zip(&track_taken) {
            if !taken {
                track.missed += 1;
            }
        }

        let mut output = Vec::with_capacity(detections.len());
        for (detection, matched) in detections.iter().zip(det_track) {
            let id = match matched {
                Some(track_idx) => {
                    let track = &mut self.tracks[track_idx];
                    track.bbox = detection.bbox;
                    track.missed = 0;
                    track.id
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.push(Track {
                        id,
                        bbox: detection.bbox,
                        class_id: detection.class_id,
                        missed: 0,
                    });
                    id
                }
            };
            output.push(detection.clone().with_track_id(id));
        }

        let max_age = self.max_age;
        self.tracks.retain(|track| track.missed <= max_age);
        Ok(output)
    }
}

/// Factory producing [`IouTracker`]s scaled to the source frame rate.
#[derive(Debug, Clone, Copy)]
pub struct IouTrackerFactory {
    pub iou_threshold: f32,
}

impl Default for IouTrackerFactory {
    fn default() -> Self {
        Self { iou_threshold: 0.3 }
    }
}

impl TrackerFactory for IouTrackerFactory {
    fn create(&self, frame_rate: f64) -> Box<dyn Tracker> {
        Box::new(IouTracker::for_frame_rate(frame_rate, self.iou_threshold))
    }
}
