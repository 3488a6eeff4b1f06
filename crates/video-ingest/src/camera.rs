//! OpenCV-backed capture for cameras and video files.

use opencv::{
    core::{Mat, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use tracing::{debug, warn};

use crate::{
    capture::{Capture, CaptureBackend},
    source::SourceHandle,
    types::{CaptureError, Frame},
};

/// Opens cameras through V4L2 first and falls back to any available backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenCvBackend;

impl CaptureBackend for OpenCvBackend {
    fn open(&self, handle: &SourceHandle) -> Result<Box<dyn Capture>, CaptureError> {
        let cap = open_video_capture(handle)?;
        Ok(Box::new(OpenCvCapture {
            cap,
            frame: Mat::default(),
        }))
    }
}

struct OpenCvCapture {
    cap: VideoCapture,
    frame: Mat,
}

impl Capture for OpenCvCapture {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        let grabbed = self
            .cap
            .read(&mut self.frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed {
            return Err(CaptureError::Read("no frame returned".into()));
        }

        let size = self.frame.size().map_err(|e| CaptureError::Other(e.into()))?;
        if size.width <= 0 || size.height <= 0 {
            return Err(CaptureError::Read("empty frame".into()));
        }

        let data = self
            .frame
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        Ok(Frame::from_bgr(data, size.width, size.height))
    }

    fn is_opened(&self) -> bool {
        self.cap.is_opened().unwrap_or(false)
    }

    fn frame_rate(&self) -> Option<f64> {
        self.cap
            .get(videoio::CAP_PROP_FPS)
            .ok()
            .filter(|fps| fps.is_finite() && *fps > 0.0)
    }

    fn set_resolution(&mut self, width: i32, height: i32) {
        let _ = self.cap.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64);
        let _ = self.cap.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64);
    }

    fn release(&mut self) {
        if let Err(err) = self.cap.release() {
            warn!("video-ingest: failed to release capture: {err}");
        }
    }
}

/// Attempt to open a camera input either by index or file path.
fn open_video_capture(handle: &SourceHandle) -> Result<VideoCapture, CaptureError> {
    for backend in [videoio::CAP_V4L2, videoio::CAP_ANY] {
        let opened = match handle {
            SourceHandle::Camera(index) => VideoCapture::new(*index, backend),
            SourceHandle::File(path) => {
                VideoCapture::from_file(&path.to_string_lossy(), backend)
            }
        };
        match opened {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                debug!("video-ingest: failed to open {handle} with backend {backend}: {err}");
            }
        }
    }

    Err(CaptureError::Open {
        uri: handle.to_string(),
    })
}
