use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dimension of the face descriptor produced by the embedding model.
pub const DESCRIPTOR_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("descriptor is not a JSON number array: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("descriptor has {got} dimensions, expected {expected}")]
    WrongDimension { got: usize, expected: usize },
}

/// Face identity signature — a fixed-length embedding vector.
///
/// Compared only via distance, never interpreted per-element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    /// Wrap raw embedding output, validating the dimension.
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.len() != DESCRIPTOR_DIM {
            return Err(DescriptorError::WrongDimension {
                got: values.len(),
                expected: DESCRIPTOR_DIM,
            });
        }
        Ok(Self { values })
    }

    /// Euclidean distance to another descriptor.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Serialize to the stored `face_encoding` form — a plain JSON array.
    pub fn to_encoding(&self) -> String {
        serde_json::to_string(&self.values).expect("Vec<f32> serializes infallibly")
    }

    /// Parse a stored `face_encoding` string, validating the dimension.
    pub fn from_encoding(encoding: &str) -> Result<Self, DescriptorError> {
        let values: Vec<f32> = serde_json::from_str(encoding)?;
        Self::new(values)
    }
}

/// Bounding box for a detected face, in original frame coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// One face found in a frame: where it is and who it looks like.
#[derive(Debug, Clone)]
pub struct FaceObservation {
    pub bbox: BoundingBox,
    pub descriptor: Descriptor,
}

/// A person the patient knows, with their stored face signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownFace {
    pub id: String,
    pub patient_id: String,
    pub person_name: String,
    pub relationship: Option<String>,
    pub notes: Option<String>,
    /// JSON-encoded descriptor values.
    pub face_encoding: String,
    /// JPEG snapshot captured at enrollment.
    pub photo: Option<Vec<u8>>,
    pub added_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Outcome of one detection tick, published to the UI boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Detection {
    /// No face in frame.
    Absent,
    /// A face is in frame but matches nobody in the gallery.
    Unknown,
    /// A face matched a gallery entry.
    Known {
        face_id: String,
        person_name: String,
        confidence_percent: u8,
    },
}

impl Detection {
    pub fn is_known(&self) -> bool {
        matches!(self, Detection::Known { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(fill: f32) -> Descriptor {
        Descriptor::new(vec![fill; DESCRIPTOR_DIM]).unwrap()
    }

    #[test]
    fn test_distance_identical() {
        let a = descriptor(0.25);
        assert!(a.distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_distance_known_value() {
        // All 128 components differ by 0.1: sqrt(128 * 0.01) ≈ 1.1314
        let a = descriptor(0.0);
        let b = descriptor(0.1);
        let expected = (DESCRIPTOR_DIM as f32 * 0.01).sqrt();
        assert!((a.distance(&b) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = descriptor(0.3);
        let b = descriptor(-0.2);
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn test_encoding_round_trip() {
        let a = descriptor(0.5);
        let parsed = Descriptor::from_encoding(&a.to_encoding()).unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn test_encoding_rejects_wrong_dimension() {
        let err = Descriptor::from_encoding("[1.0, 2.0, 3.0]").unwrap_err();
        assert!(matches!(
            err,
            DescriptorError::WrongDimension { got: 3, expected: DESCRIPTOR_DIM }
        ));
    }

    #[test]
    fn test_encoding_rejects_garbage() {
        assert!(Descriptor::from_encoding("not json").is_err());
        assert!(Descriptor::from_encoding("{\"values\": []}").is_err());
    }

    #[test]
    fn test_detection_serializes_tagged() {
        let d = Detection::Known {
            face_id: "f1".into(),
            person_name: "Alice".into(),
            confidence_percent: 90,
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["state"], "known");
        assert_eq!(json["person_name"], "Alice");

        let absent = serde_json::to_value(Detection::Absent).unwrap();
        assert_eq!(absent["state"], "absent");
    }
}
