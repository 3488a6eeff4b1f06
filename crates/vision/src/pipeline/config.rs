//! Configuration for the frame pipeline.
//!
//! CLI arguments are translated into a [`PipelineConfig`] once at startup so
//! downstream stages never re-parse flags.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Args;
use ml_core::ClassTaxonomy;

use crate::pipeline::error::PipelineError;

#[derive(Clone, Debug)]
/// Canonical configuration shared by every stage in the pipeline.
pub struct PipelineConfig {
    /// Detections at or below this confidence are dropped.
    pub confidence_threshold: f32,
    /// Same-class boxes overlapping above this IoU are suppressed.
    pub nms_iou_threshold: f32,
    /// Resolution requested from a source when it is opened.
    pub working_size: (i32, i32),
    /// Frame rate assumed when the source does not report one.
    pub default_fps: f64,
    /// JPEG quality of emitted stream units (1-100).
    pub jpeg_quality: u8,
    /// Sleep after a failed read before trying again.
    pub read_backoff: Duration,
    /// Camera indices `0..limit` probed by `list_available_cameras`.
    pub camera_probe_limit: i32,
    /// Consecutive failed reads after which a file source counts as exhausted.
    pub file_exhaustion_reads: u32,
    /// Input resolution handed to model-backed detectors.
    pub detector_input: (i64, i64),
    /// Optional JSON class taxonomy replacing the built-in one.
    pub taxonomy_path: Option<PathBuf>,
    /// Telemetry and instrumentation options.
    pub telemetry: TelemetryOptions,
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing pipeline spans.
    pub chrome_trace_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.35,
            nms_iou_threshold: 0.3,
            working_size: (1280, 720),
            default_fps: 30.0,
            jpeg_quality: 85,
            read_backoff: Duration::from_millis(100),
            camera_probe_limit: 5,
            file_exhaustion_reads: 50,
            detector_input: (640, 640),
            taxonomy_path: None,
            telemetry: TelemetryOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Check value ranges. Called by the controller and by CLI conversion.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let unit = |value: f32| value > 0.0 && value < 1.0;
        if !unit(self.confidence_threshold) {
            return Err(PipelineError::Config(format!(
                "confidence threshold must be in (0, 1), got {}",
                self.confidence_threshold
            )));
        }
        if !unit(self.nms_iou_threshold) {
            return Err(PipelineError::Config(format!(
                "NMS IoU threshold must be in (0, 1), got {}",
                self.nms_iou_threshold
            )));
        }
        if self.working_size.0 <= 0 || self.working_size.1 <= 0 {
            return Err(PipelineError::Config(
                "working width and height must be positive".into(),
            ));
        }
        if self.detector_input.0 <= 0 || self.detector_input.1 <= 0 {
            return Err(PipelineError::Config(
                "detector width and height must be positive".into(),
            ));
        }
        if !(self.default_fps.is_finite() && self.default_fps > 0.0) {
            return Err(PipelineError::Config(format!(
                "default fps must be positive, got {}",
                self.default_fps
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(PipelineError::Config(format!(
                "JPEG quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }
        if self.file_exhaustion_reads == 0 {
            return Err(PipelineError::Config(
                "file exhaustion reads must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Load the configured taxonomy, falling back to the built-in classes.
    pub fn load_taxonomy(&self) -> Result<ClassTaxonomy> {
        match self.taxonomy_path.as_ref() {
            Some(path) => ClassTaxonomy::from_json_file(path)
                .with_context(|| format!("failed to load taxonomy from {}", path.display())),
            None => Ok(ClassTaxonomy::default()),
        }
    }
}

/// Pipeline flags shared by every subcommand that runs the pipeline.
#[derive(Debug, Default, Args)]
pub struct PipelineCliArgs {
    /// Minimum detection confidence (exclusive), 0-1.
    #[arg(long = "confidence", value_name = "SCORE")]
    pub confidence: Option<f32>,
    /// IoU above which same-class boxes are suppressed, 0-1.
    #[arg(long = "nms-iou", value_name = "IOU")]
    pub nms_iou: Option<f32>,
    /// Working capture width in pixels.
    #[arg(long = "width", value_name = "PX")]
    pub width: Option<i32>,
    /// Working capture height in pixels.
    #[arg(long = "height", value_name = "PX")]
    pub height: Option<i32>,
    /// Frame rate assumed when the source reports none.
    #[arg(long = "fps", value_name = "FPS")]
    pub fps: Option<f64>,
    /// JPEG quality used by the encoder (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY")]
    pub jpeg_quality: Option<i32>,
    /// Backoff after a failed read, in milliseconds.
    #[arg(long = "read-backoff-ms", value_name = "MS")]
    pub read_backoff_ms: Option<u64>,
    /// Number of camera indices to probe.
    #[arg(long = "camera-probe-limit", value_name = "N")]
    pub camera_probe_limit: Option<i32>,
    /// Consecutive failed reads that end a file source.
    #[arg(long = "file-exhaustion-reads", value_name = "N")]
    pub file_exhaustion_reads: Option<u32>,
    /// Detector input width in pixels.
    #[arg(long = "detector-width", value_name = "PX")]
    pub detector_width: Option<i64>,
    /// Detector input height in pixels.
    #[arg(long = "detector-height", value_name = "PX")]
    pub detector_height: Option<i64>,
    /// JSON file describing class names, colours and trackable classes.
    #[arg(long = "taxonomy", value_name = "PATH")]
    pub taxonomy: Option<PathBuf>,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
}

impl TryFrom<PipelineCliArgs> for PipelineConfig {
    type Error = anyhow::Error;

    fn try_from(args: PipelineCliArgs) -> Result<Self> {
        let defaults = PipelineConfig::default();

        let jpeg_quality = match args.jpeg_quality {
            Some(quality) => u8::try_from(quality)
                .ok()
                .filter(|q| (1..=100).contains(q))
                .with_context(|| format!("--jpeg-quality must be between 1 and 100, got {quality}"))?,
            None => defaults.jpeg_quality,
        };

        let config = PipelineConfig {
            confidence_threshold: args.confidence.unwrap_or(defaults.confidence_threshold),
            nms_iou_threshold: args.nms_iou.unwrap_or(defaults.nms_iou_threshold),
            working_size: (
                args.width.unwrap_or(defaults.working_size.0),
                args.height.unwrap_or(defaults.working_size.1),
            ),
            default_fps: args.fps.unwrap_or(defaults.default_fps),
            jpeg_quality,
            read_backoff: args
                .read_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.read_backoff),
            camera_probe_limit: args
                .camera_probe_limit
                .unwrap_or(defaults.camera_probe_limit)
                .max(0),
            file_exhaustion_reads: args
                .file_exhaustion_reads
                .unwrap_or(defaults.file_exhaustion_reads),
            detector_input: (
                args.detector_width.unwrap_or(defaults.detector_input.0),
                args.detector_height.unwrap_or(defaults.detector_input.1),
            ),
            taxonomy_path: args.taxonomy,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
            },
        };
        config.validate()?;
        Ok(config)
    }
}
