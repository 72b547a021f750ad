//! Enrollment staging — promoting an unmatched live face into a
//! persisted known face.

use crate::types::{Descriptor, KnownFace};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("a name is required to save this person")]
    EmptyName,
}

/// An unmatched face waiting for the user to save or discard it.
///
/// At most one exists per session; staging a new one replaces it.
#[derive(Debug, Clone)]
pub struct PendingEnrollment {
    pub descriptor: Descriptor,
    pub snapshot_jpeg: Vec<u8>,
    pub staged_at: DateTime<Utc>,
}

/// User-editable fields for confirming an enrollment.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentForm {
    pub person_name: String,
    pub relationship: Option<String>,
    pub notes: Option<String>,
}

impl EnrollmentForm {
    /// Reject a blank name before anything is persisted.
    pub fn validate(&self) -> Result<(), EnrollError> {
        if self.person_name.trim().is_empty() {
            return Err(EnrollError::EmptyName);
        }
        Ok(())
    }
}

/// Build the `KnownFace` record for a confirmed enrollment.
///
/// Callers must have run [`EnrollmentForm::validate`] first; the record
/// is constructed as-is.
pub fn build_known_face(
    patient_id: &str,
    form: &EnrollmentForm,
    pending: &PendingEnrollment,
    now: DateTime<Utc>,
) -> KnownFace {
    KnownFace {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id: patient_id.to_string(),
        person_name: form.person_name.trim().to_string(),
        relationship: form.relationship.clone().filter(|r| !r.trim().is_empty()),
        notes: form.notes.clone().filter(|n| !n.trim().is_empty()),
        face_encoding: pending.descriptor.to_encoding(),
        photo: Some(pending.snapshot_jpeg.clone()),
        added_at: now,
        last_seen: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DESCRIPTOR_DIM;

    fn pending() -> PendingEnrollment {
        PendingEnrollment {
            descriptor: Descriptor::new(vec![0.1; DESCRIPTOR_DIM]).unwrap(),
            snapshot_jpeg: vec![0xFF, 0xD8, 0xFF],
            staged_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        let form = EnrollmentForm::default();
        assert!(matches!(form.validate(), Err(EnrollError::EmptyName)));
    }

    #[test]
    fn test_whitespace_name_rejected() {
        let form = EnrollmentForm {
            person_name: "   ".into(),
            ..Default::default()
        };
        assert!(matches!(form.validate(), Err(EnrollError::EmptyName)));
    }

    #[test]
    fn test_valid_form_accepted() {
        let form = EnrollmentForm {
            person_name: "Bob".into(),
            relationship: Some("Neighbor".into()),
            notes: None,
        };
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_build_known_face_fields() {
        let form = EnrollmentForm {
            person_name: " Bob ".into(),
            relationship: Some("Neighbor".into()),
            notes: Some("".into()),
        };
        let staged = pending();
        let now = Utc::now();
        let face = build_known_face("p1", &form, &staged, now);

        assert_eq!(face.patient_id, "p1");
        assert_eq!(face.person_name, "Bob");
        assert_eq!(face.relationship.as_deref(), Some("Neighbor"));
        assert_eq!(face.notes, None, "blank notes are dropped");
        assert_eq!(face.added_at, now);
        assert_eq!(face.last_seen, now);
        assert_eq!(face.photo.as_deref(), Some(&[0xFF, 0xD8, 0xFF][..]));

        let round_trip = Descriptor::from_encoding(&face.face_encoding).unwrap();
        assert_eq!(round_trip, staged.descriptor);
    }

    #[test]
    fn test_build_generates_unique_ids() {
        let form = EnrollmentForm {
            person_name: "Bob".into(),
            ..Default::default()
        };
        let staged = pending();
        let now = Utc::now();
        let a = build_known_face("p1", &form, &staged, now);
        let b = build_known_face("p1", &form, &staged, now);
        assert_ne!(a.id, b.id);
    }
}
