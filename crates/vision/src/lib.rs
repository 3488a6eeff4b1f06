//! Detection, tracking and annotation pipeline that turns a camera or file
//! source into a stream of multipart JPEG units.

pub mod pipeline;

pub use pipeline::{
    annotation::{annotate, format_label},
    config::{PipelineCliArgs, PipelineConfig, TelemetryOptions},
    controller::{FrameStream, PipelineController, PipelineStatus, SourceType},
    encoding::{BOUNDARY, MULTIPART_CONTENT_TYPE, encode_unit, frame_unit},
    error::{PipelineError, StageError},
    filter::{FilteredDetections, filter_detections},
    identity::stitch_identities,
    overlay::{ClassCounts, FrameCounters, render_overlay},
};
