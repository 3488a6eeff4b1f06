use std::{path::Path, sync::Mutex};

use anyhow::{Result, anyhow, bail};
use image::imageops::{self, FilterType};
use tch::{self, Device, Kind, Tensor};
use tracing::debug;
use video_ingest::Frame;

use crate::{
    detection::{BoundingBox, Detection, DetectionSet},
    detector::Detector,
};

/// Upper bound on raw candidates decoded per frame.
const MAX_CANDIDATES: usize = 512;

/// TorchScript-backed detector wrapper.
///
/// Accepts YOLO-style exports with output `[1, 4 + C, N]` (centre boxes followed
/// by per-class scores) or `[1, N, 6]` (`x1, y1, x2, y2, score, class`).
pub struct TorchDetector {
    module: Mutex<tch::CModule>,
    device: Device,
    input_size: (i64, i64),
    min_confidence: f32,
}

impl TorchDetector {
    /// Load a TorchScript module onto `device`.
    pub fn new<P: AsRef<Path>>(model_path: P, device: Device, input_size: (i64, i64)) -> Result<Self> {
        let module = tch::CModule::load_on_device(model_path, device)?;
        Ok(Self {
            module: Mutex::new(module),
            device,
            input_size,
            min_confidence: 0.01,
        })
    }

    /// Discard raw candidates below `confidence` before they leave the model.
    pub fn with_min_confidence(mut self, confidence: f32) -> Self {
        self.min_confidence = confidence;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    fn frame_to_tensor(&self, frame: &Frame) -> Result<Tensor> {
        let (in_w, in_h) = self.input_size;
        let rgb = frame.to_rgb_image()?;
        let resized = imageops::resize(&rgb, in_w as u32, in_h as u32, FilterType::Triangle);

        let tensor = Tensor::from_slice(resized.as_raw())
            .to_device(self.device)
            .to_kind(Kind::Float)
            .view([1, in_h, in_w, 3])
            .permute([0, 3, 1, 2])
            / 255.0;
        Ok(tensor)
    }

    fn decode(&self, output: &Tensor, frame: &Frame) -> Result<Vec<Detection>> {
        let shape = output.size();
        if shape.len() != 3 || shape[0] != 1 {
            bail!("unexpected detector output shape: {shape:?}");
        }

        let (in_w, in_h) = self.input_size;
        let scale_x = frame.width as f32 / in_w as f32;
        let scale_y = frame.height as f32 / in_h as f32;
        let scale = |b: BoundingBox| {
            BoundingBox::new(b.x1 * scale_x, b.y1 * scale_y, b.x2 * scale_x, b.y2 * scale_y)
        };

        let squeezed = output.to_device(Device::Cpu).to_kind(Kind::Float).squeeze_dim(0);
        let mut detections = Vec::new();

        if shape[2] == 6 && shape[1] != 6 {
            let rows: Vec<Vec<f32>> = Vec::<Vec<f32>>::try_from(&squeezed.contiguous())?;
            for row in rows {
                let score = row[4];
                if score < self.min_confidence {
                    continue;
                }
                let bbox = scale(BoundingBox::new(row[0], row[1], row[2], row[3]));
                detections.push(Detection::new(bbox, score, row[5].max(0.0) as usize));
            }
        } else {
            if shape[1] < 5 {
                bail!("detector output requires at least 5 channels, got {}", shape[1]);
            }
            let rows: Vec<Vec<f32>> =
                Vec::<Vec<f32>>::try_from(&squeezed.permute([1, 0]).contiguous())?;
            for row in rows {
                let (class_id, score) = row[4..]
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((0usize, f32::MIN), |best, (idx, s)| if s > best.1 { (idx, s) } else { best });
                if score < self.min_confidence {
                    continue;
                }
                let bbox = scale(BoundingBox::from_cxcywh(row[0], row[1], row[2], row[3]));
                detections.push(Detection::new(bbox, score, class_id));
            }
        }

        keep_most_confident(&mut detections);
        Ok(detections)
    }
}

/// Cap `detections` at [`MAX_CANDIDATES`], keeping the highest scores.
fn keep_most_confident(detections: &mut Vec<Detection>) {
    if detections.len() > MAX_CANDIDATES {
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        detections.truncate(MAX_CANDIDATES);
    }
}

impl Detector for TorchDetector {
    fn detect(&self, frame: &Frame) -> Result<DetectionSet> {
        let input = self.frame_to_tensor(frame)?;
        let output = {
            let module = self
                .module
                .lock()
                .map_err(|_| anyhow!("detector module poisoned"))?;
            tch::no_grad(|| module.forward_ts(&[input]))?
        };
        let detections = self.decode(&output, frame)?;
        debug!("torch detector produced {} candidate(s)", detections.len());
        Ok(DetectionSet::new(detections))
    }

    fn name(&self) -> &str {
        "torchscript"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_cap_keeps_the_highest_scores() {
        let mut detections: Vec<Detection> = (0..MAX_CANDIDATES + 10)
            .map(|i| {
                let score = i as f32 / (MAX_CANDIDATES + 10) as f32;
                Detection::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), score, 0)
            })
            .collect();
        keep_most_confident(&mut detections);
        assert_eq!(detections.len(), MAX_CANDIDATES);
        let lowest_kept = 10.0 / (MAX_CANDIDATES + 10) as f32;
        assert!(detections.iter().all(|d| d.confidence >= lowest_kept));
    }
}
