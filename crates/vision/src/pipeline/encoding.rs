//! JPEG compression and multipart framing of stream units.

use image::{RgbImage, codecs::jpeg::JpegEncoder};

use crate::pipeline::error::StageError;

/// Boundary token separating units in the multipart stream.
pub const BOUNDARY: &str = "frame";
/// Content type of the HTTP response carrying the stream.
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, StageError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|err| StageError::Encoding(format!("JPEG encode failed: {err}")))?;
    Ok(buffer)
}

/// Wrap an encoded image as `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`.
pub fn frame_unit(jpeg: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(jpeg.len() + 48);
    payload.extend_from_slice(b"--");
    payload.extend_from_slice(BOUNDARY.as_bytes());
    payload.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    payload
}

/// Compress and frame one image.
pub fn encode_unit(image: &RgbImage, quality: u8) -> Result<Vec<u8>, StageError> {
    encode_jpeg(image, quality).map(|jpeg| frame_unit(&jpeg))
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    const HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

    #[test]
    fn unit_framing_wraps_the_payload() {
        let unit = frame_unit(b"JPEG");
        assert_eq!(unit, b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n");
    }

    #[test]
    fn encoded_unit_carries_a_decodable_jpeg() {
        let image = RgbImage::from_pixel(64, 48, Rgb([200, 40, 40]));
        let unit = encode_unit(&image, 85).expect("encode");
        assert!(unit.starts_with(HEADER));
        assert!(unit.ends_with(b"\r\n"));

        let jpeg = &unit[HEADER.len()..unit.len() - 2];
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(jpeg).expect("decode").to_rgb8();
        assert_eq!(decoded.dimensions(), (64, 48));
    }
}
