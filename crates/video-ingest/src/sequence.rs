//! Pure-Rust capture backend that replays still images from disk.
//!
//! A `File` handle may point at a single image or at a directory; directory
//! entries with a known image extension are replayed in lexical order. Camera
//! handles are never available through this backend.

use std::{
    fs,
    path::{Path, PathBuf},
};

use image::imageops::{self, FilterType};
use tracing::debug;

use crate::{
    capture::{Capture, CaptureBackend},
    source::SourceHandle,
    types::{CaptureError, Frame},
};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Clone, Debug, Default)]
pub struct ImageSequenceBackend {
    frame_rate: Option<f64>,
}

impl ImageSequenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a fixed frame rate for every sequence opened by this backend.
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = Some(fps);
        self
    }
}

impl CaptureBackend for ImageSequenceBackend {
    fn open(&self, handle: &SourceHandle) -> Result<Box<dyn Capture>, CaptureError> {
        let SourceHandle::File(path) = handle else {
            return Err(CaptureError::Open {
                uri: handle.to_string(),
            });
        };

        let paths = collect_images(path).map_err(|err| {
            debug!("image sequence {} unavailable: {err}", path.display());
            CaptureError::Open {
                uri: handle.to_string(),
            }
        })?;
        if paths.is_empty() {
            return Err(CaptureError::Open {
                uri: handle.to_string(),
            });
        }

        Ok(Box::new(ImageSequenceCapture {
            paths,
            cursor: 0,
            resolution: None,
            frame_rate: self.frame_rate,
            opened: true,
        }))
    }

    fn probe_cameras(&self, _limit: i32) -> Vec<i32> {
        Vec::new()
    }
}

fn collect_images(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(path)? {
        let candidate = entry?.path();
        if candidate.is_file() && has_image_extension(&candidate) {
            paths.push(candidate);
        }
    }
    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Largest size within `bounds` that keeps the aspect ratio of `size`.
fn fit_within((width, height): (u32, u32), (max_w, max_h): (u32, u32)) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let scale = (max_w as f64 / width as f64).min(max_h as f64 / height as f64);
    let fit = |side: u32| ((side as f64 * scale).round() as u32).max(1);
    (fit(width), fit(height))
}

struct ImageSequenceCapture {
    paths: Vec<PathBuf>,
    cursor: usize,
    resolution: Option<(u32, u32)>,
    frame_rate: Option<f64>,
    opened: bool,
}

impl Capture for ImageSequenceCapture {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        if !self.opened {
            return Err(CaptureError::Read("capture released".into()));
        }
        let Some(path) = self.paths.get(self.cursor) else {
            return Err(CaptureError::Read("end of sequence".into()));
        };
        self.cursor += 1;

        let decoded = image::open(path)
            .map_err(|err| CaptureError::Read(format!("{}: {err}", path.display())))?
            .to_rgb8();
        let image = match self.resolution {
            Some(bounds) => {
                let (width, height) = fit_within(decoded.dimensions(), bounds);
                if (width, height) == decoded.dimensions() {
                    decoded
                } else {
                    imageops::resize(&decoded, width, height, FilterType::Triangle)
                }
            }
            None => decoded,
        };
        Ok(Frame::from_rgb_image(&image))
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    /// Frames are scaled to fit inside the requested size, keeping their aspect ratio.
    fn set_resolution(&mut self, width: i32, height: i32) {
        if width > 0 && height > 0 {
            self.resolution = Some((width as u32, height as u32));
        }
    }

    fn release(&mut self) {
        self.opened = false;
    }
}
