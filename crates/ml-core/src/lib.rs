//! Detection data model and the detector/tracker collaborators consumed by the
//! vision pipeline.
//!
//! Enable the `with-tch` feature to pull in the TorchScript detector.

pub mod detection;
pub mod detector;
pub mod nms;
pub mod taxonomy;
pub mod tracker;

#[cfg(feature = "with-tch")]
pub mod torch;

pub use detection::{BoundingBox, Detection, DetectionSet};
pub use detector::{Detector, NullDetector};
pub use nms::{nms_keep_indices, non_max_suppression};
pub use taxonomy::{ClassInfo, ClassTaxonomy, TaxonomyError, TrackableClasses};
pub use tracker::{IouTracker, IouTrackerFactory, Tracker, TrackerFactory};

#[cfg(feature = "with-tch")]
pub use tch;
#[cfg(feature = "with-tch")]
pub use torch::TorchDetector;
