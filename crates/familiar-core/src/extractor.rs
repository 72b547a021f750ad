//! The model-provider boundary: frame in, face observations out.

use crate::detector::{DetectorError, FaceDetector};
use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::types::FaceObservation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedder: {0}")]
    Embedder(#[from] EmbedderError),
}

/// Capability trait for turning one grayscale frame into zero-or-more
/// face observations.
///
/// An empty vector is the normal "no face in frame" result; `Err` is an
/// environment failure (model missing, inference error). Callers use
/// only the first observation — output is ordered by detection
/// confidence, so index 0 is deterministic.
pub trait EmbeddingModel: Send {
    fn extract(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceObservation>, ExtractorError>;
}

/// Production pipeline: detector followed by per-face embedding.
pub struct FaceExtractor {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl FaceExtractor {
    /// Load both model sessions. Fails fast if either file is missing.
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, ExtractorError> {
        let detector = FaceDetector::load(detector_path)?;
        let embedder = FaceEmbedder::load(embedder_path)?;
        Ok(Self { detector, embedder })
    }
}

impl EmbeddingModel for FaceExtractor {
    fn extract(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceObservation>, ExtractorError> {
        let boxes = self.detector.detect(frame, width, height)?;

        let mut observations = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let descriptor = self.embedder.extract(frame, width, height, &bbox)?;
            observations.push(FaceObservation { bbox, descriptor });
        }

        Ok(observations)
    }
}
