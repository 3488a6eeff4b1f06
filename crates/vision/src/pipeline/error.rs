use thiserror::Error;

/// Errors surfaced by the pipeline's control operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source {uri} is unavailable: {reason}")]
    SourceUnavailable { uri: String, reason: String },
    #[error("invalid pipeline configuration: {0}")]
    Config(String),
}

/// Per-frame stage failure. Each one is recovered inside the iteration that
/// produced it and never ends the stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    /// Detector failed; the frame continues with zero detections.
    #[error("detection failed: {0}")]
    Detection(String),
    /// Tracker failed or broke its contract; identities are cleared for the frame.
    #[error("tracking failed: {0}")]
    Tracking(String),
    /// Drawing failed; the unannotated frame is used instead.
    #[error("annotation failed: {0}")]
    Annotation(String),
    /// Compression failed; the frame unit is dropped.
    #[error("encoding failed: {0}")]
    Encoding(String),
}

impl StageError {
    /// Metric label of the failing stage.
    pub fn stage(&self) -> &'static str {
        match self {
            StageError::Detection(_) => "detection",
            StageError::Tracking(_) => "tracking",
            StageError::Annotation(_) => "annotation",
            StageError::Encoding(_) => "encoding",
        }
    }
}
