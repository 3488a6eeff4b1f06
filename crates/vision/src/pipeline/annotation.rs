//! Drawing primitives and the detection annotator.
//!
//! Text uses a built-in 5x7 bitmap font so the pipeline has no font assets to
//! ship. Lowercase letters are drawn as uppercase.

use image::{Rgb, RgbImage};
use ml_core::{ClassTaxonomy, Detection, DetectionSet};

use crate::pipeline::error::StageError;

pub(crate) const BOX_THICKNESS: i32 = 2;
pub(crate) const TEXT_SCALE: i32 = 2;
const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const LABEL_PADDING: i32 = 3;
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Label text for one detection: `"<display> <pct>%"` plus `" ID:<n>"` when tracked.
pub fn format_label(detection: &Detection, taxonomy: &ClassTaxonomy) -> String {
    let pct = (detection.confidence * 100.0).round() as i32;
    let display = taxonomy.display_name(detection.class_id);
    match detection.track_id {
        Some(id) => format!("{display} {pct}% ID:{id}"),
        None => format!("{display} {pct}%"),
    }
}

/// Draw every detection onto a copy of `canvas`.
///
/// All detections get a box and a label; trackable classes additionally get
/// corner brackets. An empty set returns an untouched copy.
pub fn annotate(
    canvas: &RgbImage,
    detections: &DetectionSet,
    taxonomy: &ClassTaxonomy,
) -> Result<RgbImage, StageError> {
    let mut image = canvas.clone();
    if detections.is_empty() {
        return Ok(image);
    }

    if let Some(bad) = detections.iter().find(|d| !d.bbox.is_finite()) {
        return Err(StageError::Annotation(format!(
            "non-finite box for class {}: {:?}",
            bad.class_id, bad.bbox
        )));
    }

    let (width, height) = image.dimensions();
    for detection in detections {
        let color = Rgb(taxonomy.color(detection.class_id));
        let (x1, y1, x2, y2) = pixel_box(detection, width, height);
        draw_rectangle(&mut image, x1, y1, x2, y2, BOX_THICKNESS, color);
        if taxonomy.is_trackable(detection.class_id) {
            draw_corners(&mut image, x1, y1, x2, y2, BOX_THICKNESS, color);
        }
    }

    for detection in detections {
        let color = Rgb(taxonomy.color(detection.class_id));
        let (x1, y1, _, _) = pixel_box(detection, width, height);
        let label = format_label(detection, taxonomy);
        let box_width = text_width(&label, TEXT_SCALE) + 2 * LABEL_PADDING;
        let box_height = text_height(TEXT_SCALE) + 2 * LABEL_PADDING;
        let top = if y1 - box_height >= 0 { y1 - box_height } else { y1 };
        fill_rect(&mut image, x1, top, x1 + box_width - 1, top + box_height - 1, color);
        draw_text(
            &mut image,
            x1 + LABEL_PADDING,
            top + LABEL_PADDING,
            &label,
            TEXT_SCALE,
            BLACK,
        );
    }

    Ok(image)
}

/// Box corners in pixels, clamped to the canvas so integer offsets stay small.
fn pixel_box(detection: &Detection, width: u32, height: u32) -> (i32, i32, i32, i32) {
    let b = detection.bbox;
    let max_x = width.saturating_sub(1) as f32;
    let max_y = height.saturating_sub(1) as f32;
    (
        b.x1.clamp(0.0, max_x).round() as i32,
        b.y1.clamp(0.0, max_y).round() as i32,
        b.x2.clamp(0.0, max_x).round() as i32,
        b.y2.clamp(0.0, max_y).round() as i32,
    )
}

/// Quarter-length brackets at each corner, stroked centred on the box edges so
/// they stand out from the inward box outline.
fn draw_corners(
    image: &mut RgbImage,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    thickness: i32,
    color: Rgb<u8>,
) {
    let dx = (x2 - x1) / 4;
    let dy = (y2 - y1) / 4;
    let corners = [
        ((x1, y1), x1 + dx, y1 + dy),
        ((x2, y1), x2 - dx, y1 + dy),
        ((x1, y2), x1 + dx, y2 - dy),
        ((x2, y2), x2 - dx, y2 - dy),
    ];
    for ((x, y), end_x, end_y) in corners {
        stroke_horizontal(image, x, end_x, y, thickness, color);
        stroke_vertical(image, x, y, end_y, thickness, color);
    }
}

fn stroke_horizontal(image: &mut RgbImage, xa: i32, xb: i32, y: i32, thickness: i32, color: Rgb<u8>) {
    let top = y - thickness / 2;
    fill_rect(image, xa.min(xb), top, xa.max(xb), top + thickness - 1, color);
}

fn stroke_vertical(image: &mut RgbImage, x: i32, ya: i32, yb: i32, thickness: i32, color: Rgb<u8>) {
    let left = x - thickness / 2;
    fill_rect(image, left, ya.min(yb), left + thickness - 1, ya.max(yb), color);
}

pub(crate) fn draw_rectangle(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    thickness: i32,
    color: Rgb<u8>,
) {
    for inset in 0..thickness.max(1) {
        let (l, t, r, b) = (left + inset, top + inset, right - inset, bottom - inset);
        if l > r || t > b {
            break;
        }
        fill_rect(image, l, t, r, t, color);
        fill_rect(image, l, b, r, b, color);
        fill_rect(image, l, t, l, b, color);
        fill_rect(image, r, t, r, b, color);
    }
}

/// Fill the inclusive rectangle, clipped to the image.
pub(crate) fn fill_rect(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.max(0);
    let top = top.max(0);
    let right = right.min(width - 1);
    let bottom = bottom.min(height - 1);
    if left > right || top > bottom {
        return;
    }

    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

pub(crate) fn text_width(text: &str, scale: i32) -> i32 {
    let chars = text.chars().count() as i32;
    if chars == 0 {
        0
    } else {
        (chars * (GLYPH_WIDTH + 1) - 1) * scale
    }
}

pub(crate) fn text_height(scale: i32) -> i32 {
    GLYPH_HEIGHT * scale
}

/// Draw `text` with its top-left corner at `(x, y)`.
pub(crate) fn draw_text(
    image: &mut RgbImage,
    mut x: i32,
    y: i32,
    text: &str,
    scale: i32,
    color: Rgb<u8>,
) {
    for ch in text.chars().flat_map(char::to_uppercase) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        let px = x + col * scale;
                        let py = y + row as i32 * scale;
                        fill_rect(image, px, py, px + scale - 1, py + scale - 1, color);
                    }
                }
            }
        }
        x += (GLYPH_WIDTH + 1) * scale;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '%' => [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}
