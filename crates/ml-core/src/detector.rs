use anyhow::Result;
use video_ingest::Frame;

use crate::detection::DetectionSet;

/// Object detector collaborator.
///
/// Implementations must not mutate the frame and must be safe to call from
/// several streams at once; the model is read-only after loading.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<DetectionSet>;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        "detector"
    }
}

/// Detector used when no model is configured. Every frame has zero detections.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&self, _frame: &Frame) -> Result<DetectionSet> {
        Ok(DetectionSet::empty())
    }

    fn name(&self) -> &str {
        "null"
    }
}
