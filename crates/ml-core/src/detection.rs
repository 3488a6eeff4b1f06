use serde::Serialize;

/// Axis-aligned box in pixel coordinates (`x1 < x2`, `y1 < y2`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from a centre-based `[cx, cy, w, h]` box.
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let l = self.x1.max(other.x1);
        let r = self.x2.min(other.x2);
        let t = self.y1.max(other.y1);
        let b = self.y2.min(other.y2);
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    /// Intersection-over-union; zero when either box is degenerate.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

/// One object observation. `track_id` is only present after tracking succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: usize,
    pub track_id: Option<u64>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class_id: usize) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            track_id: None,
        }
    }

    pub fn with_track_id(mut self, track_id: u64) -> Self {
        self.track_id = Some(track_id);
        self
    }
}

/// Ordered detections for a single frame. Order is preserved by every stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionSet {
    pub detections: Vec<Detection>,
}

impl DetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    /// Drop every track identity, leaving geometry and class untouched.
    pub fn clear_track_ids(&mut self) {
        for detection in &mut self.detections {
            detection.track_id = None;
        }
    }
}

impl From<Vec<Detection>> for DetectionSet {
    fn from(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl IntoIterator for DetectionSet {
    type Item = Detection;
    type IntoIter = std::vec::IntoIter<Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.into_iter()
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}
