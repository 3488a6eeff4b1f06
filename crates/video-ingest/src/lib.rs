//! Frame acquisition for the vision pipeline.
//!
//! The crate exposes the [`Frame`] type handed to downstream stages, the
//! [`CaptureBackend`]/[`Capture`] seam the pipeline controller drives, and the
//! concrete backends: an image-sequence reader that works everywhere and an
//! OpenCV reader for cameras and video files (feature `opencv`).

mod capture;
mod sequence;
mod source;
mod types;

#[cfg(feature = "opencv")]
mod camera;

pub use capture::{Capture, CaptureBackend};
pub use sequence::ImageSequenceBackend;
pub use source::{SourceHandle, SourceKind};
pub use types::{CaptureError, Frame, FrameFormat};

#[cfg(feature = "opencv")]
pub use camera::OpenCvBackend;
