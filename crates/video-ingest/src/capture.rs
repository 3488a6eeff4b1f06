//! Capture seam shared by every frame source.
//!
//! A [`CaptureBackend`] opens [`SourceHandle`]s into [`Capture`] handles. Handles
//! are not thread-safe on their own; callers serialise access behind a lock.

use tracing::debug;

use crate::{
    source::SourceHandle,
    types::{CaptureError, Frame},
};

/// An open capture device or file.
pub trait Capture: Send {
    /// Read one frame. Any error is a failed read for this attempt only.
    fn read(&mut self) -> Result<Frame, CaptureError>;

    fn is_opened(&self) -> bool;

    /// Frame rate reported by the source, if any.
    fn frame_rate(&self) -> Option<f64>;

    /// Request a working resolution. Backends that cannot resize ignore it.
    fn set_resolution(&mut self, _width: i32, _height: i32) {}

    /// Release the underlying handle. Further reads fail.
    fn release(&mut self);
}

/// Factory for [`Capture`] handles.
pub trait CaptureBackend: Send + Sync {
    fn open(&self, handle: &SourceHandle) -> Result<Box<dyn Capture>, CaptureError>;

    /// Probe camera indices `0..limit` and return those that opened.
    ///
    /// Every probe handle is released before the next index is tried.
    fn probe_cameras(&self, limit: i32) -> Vec<i32> {
        let mut available = Vec::new();
        for index in 0..limit.max(0) {
            match self.open(&SourceHandle::Camera(index)) {
                Ok(mut capture) => {
                    if capture.is_opened() {
                        available.push(index);
                    }
                    capture.release();
                }
                Err(err) => debug!("camera probe #{index} failed: {err}"),
            }
        }
        available
    }
}
