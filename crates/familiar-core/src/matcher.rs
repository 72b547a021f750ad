//! Nearest-neighbor matching of a live descriptor against the gallery.

use crate::gallery::Gallery;
use crate::types::Descriptor;

/// Default acceptance threshold, in descriptor-space Euclidean units.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Best gallery match for a probe descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub face_id: String,
    pub person_name: String,
    pub distance: f32,
    pub confidence_percent: u8,
}

/// Find the closest known face under `threshold`, or `None` for an
/// unknown face.
///
/// Entries whose stored encoding failed to parse are skipped; a corrupt
/// record never aborts matching against the rest of the gallery. The
/// strict `<` comparison means the first-encountered record wins exact
/// distance ties, which is deterministic as long as gallery order is.
pub fn best_match(probe: &Descriptor, gallery: &Gallery, threshold: f32) -> Option<MatchCandidate> {
    let mut best: Option<(usize, f32)> = None;

    for (idx, entry) in gallery.entries().iter().enumerate() {
        let Some(stored) = &entry.descriptor else {
            continue;
        };
        let distance = probe.distance(stored);
        if distance >= threshold {
            continue;
        }
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((idx, distance)),
        }
    }

    best.map(|(idx, distance)| {
        let face = &gallery.entries()[idx].face;
        MatchCandidate {
            face_id: face.id.clone(),
            person_name: face.person_name.clone(),
            distance,
            confidence_percent: confidence_percent(distance),
        }
    })
}

/// Map a match distance to the 0–100 confidence scale shown to the user.
fn confidence_percent(distance: f32) -> u8 {
    ((1.0 - distance) * 100.0).round().clamp(0.0, 100.0) as u8
}
