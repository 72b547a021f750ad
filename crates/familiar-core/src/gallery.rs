//! Per-patient gallery of known faces, held in memory for one session.

use crate::types::{Descriptor, KnownFace};
use chrono::{DateTime, Utc};

/// A gallery record with its descriptor parsed once at load time.
///
/// `descriptor` is `None` when the stored encoding failed to parse —
/// the record stays listed but is skipped by matching.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub face: KnownFace,
    pub descriptor: Option<Descriptor>,
}

/// The set of known faces for exactly one patient.
///
/// Created at session start, discarded at session end. Mutated only by
/// enrollment (`add`) and match bookkeeping (`touch`).
#[derive(Debug)]
pub struct Gallery {
    patient_id: String,
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    /// Build a gallery from stored records, parsing descriptors up front.
    pub fn from_faces(patient_id: impl Into<String>, faces: Vec<KnownFace>) -> Self {
        let patient_id = patient_id.into();
        let entries = faces
            .into_iter()
            .map(|face| {
                let descriptor = match Descriptor::from_encoding(&face.face_encoding) {
                    Ok(d) => Some(d),
                    Err(err) => {
                        tracing::debug!(
                            face_id = %face.id,
                            person = %face.person_name,
                            error = %err,
                            "skipping face with unparseable encoding"
                        );
                        None
                    }
                };
                GalleryEntry { face, descriptor }
            })
            .collect();
        Self { patient_id, entries }
    }

    pub fn empty(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            entries: Vec::new(),
        }
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a freshly enrolled face. Visible to the next match call.
    pub fn add(&mut self, face: KnownFace) {
        let descriptor = Descriptor::from_encoding(&face.face_encoding).ok();
        self.entries.push(GalleryEntry { face, descriptor });
    }

    /// Update the in-memory `last_seen` for a matched face.
    pub fn touch(&mut self, face_id: &str, at: DateTime<Utc>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.face.id == face_id) {
            entry.face.last_seen = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DESCRIPTOR_DIM;

    fn face(id: &str, encoding: &str) -> KnownFace {
        let now = Utc::now();
        KnownFace {
            id: id.into(),
            patient_id: "p1".into(),
            person_name: format!("person-{id}"),
            relationship: None,
            notes: None,
            face_encoding: encoding.into(),
            photo: None,
            added_at: now,
            last_seen: now,
        }
    }

    fn valid_encoding(fill: f32) -> String {
        serde_json::to_string(&vec![fill; DESCRIPTOR_DIM]).unwrap()
    }

    #[test]
    fn test_load_parses_descriptors_once() {
        let gallery = Gallery::from_faces("p1", vec![face("a", &valid_encoding(0.1))]);
        assert_eq!(gallery.len(), 1);
        assert!(gallery.entries()[0].descriptor.is_some());
    }

    #[test]
    fn test_malformed_encoding_kept_but_unparsed() {
        let gallery = Gallery::from_faces(
            "p1",
            vec![face("a", "corrupt"), face("b", &valid_encoding(0.2))],
        );
        assert_eq!(gallery.len(), 2);
        assert!(gallery.entries()[0].descriptor.is_none());
        assert!(gallery.entries()[1].descriptor.is_some());
    }

    #[test]
    fn test_touch_updates_last_seen() {
        let mut gallery = Gallery::from_faces("p1", vec![face("a", &valid_encoding(0.1))]);
        let later = Utc::now() + chrono::Duration::minutes(5);
        gallery.touch("a", later);
        assert_eq!(gallery.entries()[0].face.last_seen, later);
    }

    #[test]
    fn test_touch_unknown_id_is_noop() {
        let mut gallery = Gallery::from_faces("p1", vec![face("a", &valid_encoding(0.1))]);
        let before = gallery.entries()[0].face.last_seen;
        gallery.touch("missing", Utc::now() + chrono::Duration::hours(1));
        assert_eq!(gallery.entries()[0].face.last_seen, before);
    }

    #[test]
    fn test_add_grows_gallery() {
        let mut gallery = Gallery::empty("p1");
        gallery.add(face("a", &valid_encoding(0.3)));
        assert_eq!(gallery.len(), 1);
        assert!(gallery.entries()[0].descriptor.is_some());
    }
}
