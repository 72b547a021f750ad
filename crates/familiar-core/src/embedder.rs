//! Face embedding extraction via ONNX Runtime.
//!
//! Crops the detected box out of the frame, resizes to the model input,
//! and produces the 128-dimensional identity descriptor.

use crate::types::{BoundingBox, Descriptor, DESCRIPTOR_DIM};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const EMBED_INPUT_SIZE: usize = 112;
const EMBED_MEAN: f32 = 127.5;
const EMBED_STD: f32 = 128.0;
/// Fraction of box size added on each side before cropping, so the
/// crop keeps some forehead/chin context around a tight detection box.
const EMBED_CROP_MARGIN: f32 = 0.1;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedding model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Embedding session producing descriptors from face crops.
pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face embedding model"
        );

        Ok(Self { session })
    }

    /// Extract the descriptor for one detected face.
    pub fn extract(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Descriptor, EmbedderError> {
        let crop = crop_resize(frame, width as usize, height as usize, face);
        let input = preprocess(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding output: {e}")))?;

        Descriptor::new(raw.to_vec()).map_err(|_| {
            EmbedderError::InferenceFailed(format!(
                "expected {DESCRIPTOR_DIM}-dim embedding, got {}",
                raw.len()
            ))
        })
    }
}

/// Crop the (margin-expanded) face box and bilinearly resize it to the
/// square model input. The box is clamped to frame bounds first.
fn crop_resize(frame: &[u8], width: usize, height: usize, face: &BoundingBox) -> Vec<u8> {
    let margin_x = face.width * EMBED_CROP_MARGIN;
    let margin_y = face.height * EMBED_CROP_MARGIN;

    let left = (face.x - margin_x).max(0.0);
    let top = (face.y - margin_y).max(0.0);
    let right = (face.x + face.width + margin_x).min(width as f32);
    let bottom = (face.y + face.height + margin_y).min(height as f32);

    let crop_w = (right - left).max(1.0);
    let crop_h = (bottom - top).max(1.0);

    let size = EMBED_INPUT_SIZE;
    let mut out = vec![0u8; size * size];

    for oy in 0..size {
        let sy = top + (oy as f32 + 0.5) / size as f32 * crop_h - 0.5;
        let y0 = (sy.floor().max(0.0) as usize).min(height - 1);
        let y1 = (y0 + 1).min(height - 1);
        let fy = (sy - sy.floor()).clamp(0.0, 1.0);

        for ox in 0..size {
            let sx = left + (ox as f32 + 0.5) / size as f32 * crop_w - 0.5;
            let x0 = (sx.floor().max(0.0) as usize).min(width - 1);
            let x1 = (x0 + 1).min(width - 1);
            let fx = (sx - sx.floor()).clamp(0.0, 1.0);

            let tl = frame[y0 * width + x0] as f32;
            let tr = frame[y0 * width + x1] as f32;
            let bl = frame[y1 * width + x0] as f32;
            let br = frame[y1 * width + x1] as f32;

            let top_mix = tl + (tr - tl) * fx;
            let bottom_mix = bl + (br - bl) * fx;
            let value = top_mix + (bottom_mix - top_mix) * fy;

            out[oy * size + ox] = value.round().clamp(0.0, 255.0) as u8;
        }
    }

    out
}

/// Normalize a grayscale crop into a NCHW tensor, replicating the
/// single channel to three.
fn preprocess(crop: &[u8]) -> Array4<f32> {
    let size = EMBED_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        for x in 0..size {
            let pixel = crop.get(y * size + x).copied().unwrap_or(0) as f32;
            let normalized = (pixel - EMBED_MEAN) / EMBED_STD;
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9 }
    }

    #[test]
    fn test_crop_resize_output_size() {
        let frame = vec![50u8; 64 * 64];
        let crop = crop_resize(&frame, 64, 64, &face(10.0, 10.0, 30.0, 30.0));
        assert_eq!(crop.len(), EMBED_INPUT_SIZE * EMBED_INPUT_SIZE);
    }

    #[test]
    fn test_crop_resize_uniform_stays_uniform() {
        let frame = vec![200u8; 128 * 96];
        let crop = crop_resize(&frame, 128, 96, &face(20.0, 20.0, 50.0, 50.0));
        assert!(crop.iter().all(|&p| p == 200));
    }

    #[test]
    fn test_crop_resize_box_outside_frame_is_clamped() {
        let frame = vec![100u8; 32 * 32];
        // Box hangs past every edge; must not panic or index out of range.
        let crop = crop_resize(&frame, 32, 32, &face(-10.0, -10.0, 60.0, 60.0));
        assert_eq!(crop.len(), EMBED_INPUT_SIZE * EMBED_INPUT_SIZE);
        assert!(crop.iter().all(|&p| p == 100));
    }

    #[test]
    fn test_crop_picks_the_requested_region() {
        // Left half black, right half white; a crop of the right half
        // should come out bright.
        let width = 100usize;
        let height = 100usize;
        let mut frame = vec![0u8; width * height];
        for y in 0..height {
            for x in 50..width {
                frame[y * width + x] = 255;
            }
        }
        let crop = crop_resize(&frame, width, height, &face(60.0, 20.0, 30.0, 30.0));
        let mean: f32 =
            crop.iter().map(|&p| p as f32).sum::<f32>() / crop.len() as f32;
        assert!(mean > 250.0, "crop of bright region should be bright, mean={mean}");
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let crop = vec![128u8; EMBED_INPUT_SIZE * EMBED_INPUT_SIZE];
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE]);
        let expected = (128.0 - EMBED_MEAN) / EMBED_STD;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_replicates_channels() {
        let crop: Vec<u8> = (0..EMBED_INPUT_SIZE * EMBED_INPUT_SIZE)
            .map(|i| (i % 251) as u8)
            .collect();
        let tensor = preprocess(&crop);
        for y in (0..EMBED_INPUT_SIZE).step_by(17) {
            for x in (0..EMBED_INPUT_SIZE).step_by(13) {
                assert_eq!(tensor[[0, 0, y, x]], tensor[[0, 1, y, x]]);
                assert_eq!(tensor[[0, 1, y, x]], tensor[[0, 2, y, x]]);
            }
        }
    }
}
