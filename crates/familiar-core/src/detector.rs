//! Anchor-grid face detector via ONNX Runtime.
//!
//! Single-scale detector: one stride-32 output grid with five anchor
//! priors per cell, sigmoid objectness and exp box decoding.

use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DET_INPUT_SIZE: usize = 416;
const DET_STRIDE: usize = 32;
const DET_GRID: usize = DET_INPUT_SIZE / DET_STRIDE;
const DET_SCORE_THRESHOLD: f32 = 0.5;
const DET_IOU_LIMIT: f32 = 0.4;
/// Anchor priors (width, height) in grid-cell units.
const DET_ANCHORS: [(f32, f32); 5] = [
    (1.603_231, 2.094_468),
    (6.041_143, 7.080_126),
    (2.882_459, 3.518_061),
    (4.266_906, 5.178_857),
    (9.041_765, 10.663_08),
];
/// Per-anchor channel layout: [tx, ty, tw, th, objectness].
const DET_VALUES_PER_ANCHOR: usize = 5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Face detector session. `detect` returns boxes in original frame
/// coordinates, sorted by confidence descending.
pub struct FaceDetector {
    session: Session,
}

impl FaceDetector {
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face detector model"
        );

        Ok(Self { session })
    }

    /// Detect faces in a grayscale frame.
    pub fn detect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        let input = preprocess(frame, width as usize, height as usize);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("detector output: {e}")))?;

        let expected = DET_ANCHORS.len() * DET_VALUES_PER_ANCHOR * DET_GRID * DET_GRID;
        if raw.len() < expected {
            return Err(DetectorError::InferenceFailed(format!(
                "detector output has {} values, expected {expected}",
                raw.len()
            )));
        }

        let scale_x = width as f32 / DET_INPUT_SIZE as f32;
        let scale_y = height as f32 / DET_INPUT_SIZE as f32;
        let boxes = decode_grid(raw, DET_SCORE_THRESHOLD, scale_x, scale_y);

        Ok(non_max_suppression(boxes, DET_IOU_LIMIT))
    }
}

/// Resize a grayscale frame to the square model input and normalize to
/// [0, 1], replicating the single channel to RGB.
fn preprocess(frame: &[u8], width: usize, height: usize) -> Array4<f32> {
    let size = DET_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        let src_y = (y * height / size).min(height.saturating_sub(1));
        for x in 0..size {
            let src_x = (x * width / size).min(width.saturating_sub(1));
            let pixel = frame
                .get(src_y * width + src_x)
                .copied()
                .unwrap_or(0) as f32;
            let normalized = pixel / 255.0;
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    tensor
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decode the raw output grid into boxes above the score threshold.
///
/// Layout is channel-major: value `v` of anchor `a` at cell (row, col)
/// lives at `((a * 5 + v) * grid + row) * grid + col`. Coordinates are
/// mapped back to the original frame by per-axis scale factors.
fn decode_grid(raw: &[f32], score_threshold: f32, scale_x: f32, scale_y: f32) -> Vec<BoundingBox> {
    let grid = DET_GRID;
    let at = |a: usize, v: usize, row: usize, col: usize| -> f32 {
        raw[((a * DET_VALUES_PER_ANCHOR + v) * grid + row) * grid + col]
    };

    let mut boxes = Vec::new();

    for (a, &(anchor_w, anchor_h)) in DET_ANCHORS.iter().enumerate() {
        for row in 0..grid {
            for col in 0..grid {
                let score = sigmoid(at(a, 4, row, col));
                if score <= score_threshold {
                    continue;
                }

                let cx = (col as f32 + sigmoid(at(a, 0, row, col))) * DET_STRIDE as f32;
                let cy = (row as f32 + sigmoid(at(a, 1, row, col))) * DET_STRIDE as f32;
                let w = anchor_w * at(a, 2, row, col).exp() * DET_STRIDE as f32;
                let h = anchor_h * at(a, 3, row, col).exp() * DET_STRIDE as f32;

                boxes.push(BoundingBox {
                    x: (cx - w / 2.0) * scale_x,
                    y: (cy - h / 2.0) * scale_y,
                    width: w * scale_x,
                    height: h * scale_y,
                    confidence: score,
                });
            }
        }
    }

    boxes
}

/// Greedy NMS: keep the highest-confidence box of each overlapping
/// cluster. Output stays sorted by confidence descending.
fn non_max_suppression(mut boxes: Vec<BoundingBox>, iou_limit: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::new();
    'candidates: for candidate in boxes {
        for winner in &kept {
            if iou(winner, &candidate) > iou_limit {
                continue 'candidates;
            }
        }
        kept.push(candidate);
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let left = a.x.max(b.x);
    let top = a.y.max(b.y);
    let right = (a.x + a.width).min(b.x + b.width);
    let bottom = (a.y + a.height).min(b.y + b.height);

    let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
    let union = a.width * a.height + b.width * b.height - overlap;

    if union > 0.0 {
        overlap / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf }
    }

    /// Raw output with every logit strongly negative (score ≈ 0).
    fn silent_grid() -> Vec<f32> {
        vec![-20.0; DET_ANCHORS.len() * DET_VALUES_PER_ANCHOR * DET_GRID * DET_GRID]
    }

    fn set(raw: &mut [f32], a: usize, v: usize, row: usize, col: usize, value: f32) {
        raw[((a * DET_VALUES_PER_ANCHOR + v) * DET_GRID + row) * DET_GRID + col] = value;
    }

    #[test]
    fn test_sigmoid_midpoint() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_decode_empty_when_all_scores_low() {
        let raw = silent_grid();
        assert!(decode_grid(&raw, DET_SCORE_THRESHOLD, 1.0, 1.0).is_empty());
    }

    #[test]
    fn test_decode_single_activation() {
        let mut raw = silent_grid();
        // Anchor 0, cell (6, 6): confident detection, centered offsets,
        // zero log-size corrections.
        set(&mut raw, 0, 0, 6, 6, 0.0); // sigmoid(0) = 0.5 → cx at cell center
        set(&mut raw, 0, 1, 6, 6, 0.0);
        set(&mut raw, 0, 2, 6, 6, 0.0); // exp(0) = 1 → anchor-sized box
        set(&mut raw, 0, 3, 6, 6, 0.0);
        set(&mut raw, 0, 4, 6, 6, 10.0);

        let boxes = decode_grid(&raw, 0.5, 1.0, 1.0);
        assert_eq!(boxes.len(), 1);

        let b = &boxes[0];
        let expected_cx = 6.5 * DET_STRIDE as f32;
        let expected_w = DET_ANCHORS[0].0 * DET_STRIDE as f32;
        assert!((b.x + b.width / 2.0 - expected_cx).abs() < 1e-3);
        assert!((b.width - expected_w).abs() < 1e-3);
        assert!(b.confidence > 0.99);
    }

    #[test]
    fn test_decode_scales_to_frame_coordinates() {
        let mut raw = silent_grid();
        set(&mut raw, 0, 4, 0, 0, 10.0);

        let unit = decode_grid(&raw, 0.5, 1.0, 1.0);
        let scaled = decode_grid(&raw, 0.5, 2.0, 0.5);
        assert!((scaled[0].width - unit[0].width * 2.0).abs() < 1e-3);
        assert!((scaled[0].height - unit[0].height * 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_iou_identical_boxes() {
        let a = bbox(0.0, 0.0, 50.0, 50.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = bbox(100.0, 100.0, 10.0, 10.0, 1.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = bbox(5.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_best_of_cluster() {
        let boxes = vec![
            bbox(2.0, 2.0, 100.0, 100.0, 0.7),
            bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            bbox(300.0, 300.0, 40.0, 40.0, 0.6),
        ];
        let kept = non_max_suppression(boxes, DET_IOU_LIMIT);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_nms_sorted_by_confidence() {
        let boxes = vec![
            bbox(0.0, 0.0, 10.0, 10.0, 0.55),
            bbox(200.0, 0.0, 10.0, 10.0, 0.95),
            bbox(0.0, 200.0, 10.0, 10.0, 0.75),
        ];
        let kept = non_max_suppression(boxes, DET_IOU_LIMIT);
        let confidences: Vec<f32> = kept.iter().map(|b| b.confidence).collect();
        assert_eq!(confidences, vec![0.95, 0.75, 0.55]);
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let frame = vec![255u8; 64 * 48];
        let tensor = preprocess(&frame, 64, 48);
        assert_eq!(tensor.shape(), &[1, 3, DET_INPUT_SIZE, DET_INPUT_SIZE]);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 1, 10, 10]], tensor[[0, 2, 10, 10]]);
    }
}
