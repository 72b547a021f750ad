//! familiar-store — Persistence boundary for known faces and
//! unknown-encounter telemetry.
//!
//! The detection loop only ever touches the [`FaceStore`] trait; the
//! SQLite implementation lives in [`sqlite`].

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use familiar_core::KnownFace;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("no known face with id {0}")]
    FaceNotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The four store operations the recognition core needs.
///
/// Tick-path writes (`touch_last_seen`, `log_unknown_encounter`) are
/// best-effort telemetry for callers; failures must never halt the
/// detection loop.
#[async_trait]
pub trait FaceStore: Send + Sync {
    /// All known faces enrolled for one patient.
    async fn list_known_faces(&self, patient_id: &str) -> Result<Vec<KnownFace>, StoreError>;

    /// Persist a newly enrolled face, returning the stored record.
    async fn create_known_face(&self, face: KnownFace) -> Result<KnownFace, StoreError>;

    /// Record that a known face was just seen live.
    async fn touch_last_seen(&self, face_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Record that the patient encountered someone not in the gallery.
    async fn log_unknown_encounter(
        &self,
        patient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

pub use sqlite::SqliteStore;
