use anyhow::{Error, anyhow};
use chrono::Utc;
use image::RgbImage;
use thiserror::Error;

/// Raw frame captured from a video source, stored as packed 8-bit pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

/// Channel order of the packed pixel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
    Rgb8,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("frame read failed: {0}")]
    Read(String),
    #[error(transparent)]
    Other(#[from] Error),
}

impl Frame {
    /// Wrap a BGR buffer as produced by camera drivers.
    pub fn from_bgr(data: Vec<u8>, width: i32, height: i32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        }
    }

    pub fn from_rgb_image(image: &RgbImage) -> Self {
        Self {
            data: image.as_raw().clone(),
            width: image.width() as i32,
            height: image.height() as i32,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Rgb8,
        }
    }

    /// Number of bytes a well-formed frame of this size occupies.
    pub fn expected_len(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize) * 3
    }

    /// Copy the frame into an RGB image buffer. The frame itself is left untouched.
    pub fn to_rgb_image(&self) -> Result<RgbImage, Error> {
        if self.width <= 0 || self.height <= 0 {
            return Err(anyhow!(
                "frame has invalid dimensions {}x{}",
                self.width,
                self.height
            ));
        }
        if self.data.len() != self.expected_len() {
            return Err(anyhow!(
                "unexpected frame buffer size: got {} bytes, expected {}",
                self.data.len(),
                self.expected_len()
            ));
        }

        let rgb = match self.format {
            FrameFormat::Rgb8 => self.data.clone(),
            FrameFormat::Bgr8 => bgr_to_rgb(&self.data),
        };
        RgbImage::from_raw(self.width as u32, self.height as u32, rgb)
            .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))
    }
}

fn bgr_to_rgb(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_frames_are_swizzled_into_rgb() {
        let frame = Frame::from_bgr(vec![1, 2, 3, 4, 5, 6], 2, 1);
        let image = frame.to_rgb_image().expect("rgb image");
        assert_eq!(image.as_raw(), &vec![3, 2, 1, 6, 5, 4]);
        assert_eq!(frame.data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn truncated_buffers_are_rejected() {
        let frame = Frame::from_bgr(vec![0; 5], 2, 1);
        assert!(frame.to_rgb_image().is_err());
    }

    #[test]
    fn rgb_image_round_trips_through_frame() {
        let image = RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        let frame = Frame::from_rgb_image(&image);
        assert_eq!(frame.format, FrameFormat::Rgb8);
        assert_eq!(frame.to_rgb_image().expect("rgb image"), image);
    }
}
