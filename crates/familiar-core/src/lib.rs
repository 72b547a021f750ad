//! familiar-core — Face recognition engine for the companion.
//!
//! Descriptor matching, the per-patient gallery, the whisper narration
//! gate, enrollment staging, and the ONNX detection + embedding
//! pipeline behind the [`EmbeddingModel`] capability trait.

pub mod detector;
pub mod embedder;
pub mod enroll;
pub mod extractor;
pub mod gallery;
pub mod matcher;
pub mod types;
pub mod whisper;

pub use enroll::{EnrollError, EnrollmentForm, PendingEnrollment};
pub use extractor::{EmbeddingModel, ExtractorError, FaceExtractor};
pub use gallery::{Gallery, GalleryEntry};
pub use matcher::{best_match, MatchCandidate, DEFAULT_MATCH_THRESHOLD};
pub use types::{
    BoundingBox, Descriptor, Detection, FaceObservation, KnownFace, DESCRIPTOR_DIM,
};
pub use whisper::{WhisperGate, DEFAULT_WHISPER_COOLDOWN};
