//! SQLite-backed face store via tokio-rusqlite.

use crate::{FaceStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use familiar_core::KnownFace;
use rusqlite::params;
use std::path::Path;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS known_faces (
    id            TEXT PRIMARY KEY,
    patient_id    TEXT NOT NULL,
    person_name   TEXT NOT NULL,
    relationship  TEXT,
    notes         TEXT,
    face_encoding TEXT NOT NULL,
    photo         BLOB,
    added_at      TEXT NOT NULL,
    last_seen     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_known_faces_patient ON known_faces (patient_id);

CREATE TABLE IF NOT EXISTS unknown_encounters (
    id             TEXT PRIMARY KEY,
    patient_id     TEXT NOT NULL,
    encounter_time TEXT NOT NULL,
    patient_action TEXT NOT NULL DEFAULT 'detected'
);
CREATE INDEX IF NOT EXISTS idx_unknown_encounters_patient ON unknown_encounters (patient_id);
";

/// SQLite store. One file per deployment; all patients share the
/// tables, scoped by `patient_id`.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (and migrate) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref().to_path_buf()).await?;
        Self::init(conn).await
    }

    /// In-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

fn parse_timestamp(column: &str, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("{column}: {e}").into(),
            )
        })
}

fn row_to_face(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnownFace> {
    Ok(KnownFace {
        id: row.get("id")?,
        patient_id: row.get("patient_id")?,
        person_name: row.get("person_name")?,
        relationship: row.get("relationship")?,
        notes: row.get("notes")?,
        face_encoding: row.get("face_encoding")?,
        photo: row.get("photo")?,
        added_at: parse_timestamp("added_at", row.get("added_at")?)?,
        last_seen: parse_timestamp("last_seen", row.get("last_seen")?)?,
    })
}

#[async_trait]
impl FaceStore for SqliteStore {
    async fn list_known_faces(&self, patient_id: &str) -> Result<Vec<KnownFace>, StoreError> {
        let patient_id = patient_id.to_string();
        let faces = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, patient_id, person_name, relationship, notes,
                            face_encoding, photo, added_at, last_seen
                     FROM known_faces
                     WHERE patient_id = ?1
                     ORDER BY added_at, id",
                )?;
                let faces = stmt
                    .query_map(params![patient_id], row_to_face)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(faces)
            })
            .await?;
        Ok(faces)
    }

    async fn create_known_face(&self, face: KnownFace) -> Result<KnownFace, StoreError> {
        let stored = face.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO known_faces
                         (id, patient_id, person_name, relationship, notes,
                          face_encoding, photo, added_at, last_seen)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        face.id,
                        face.patient_id,
                        face.person_name,
                        face.relationship,
                        face.notes,
                        face.face_encoding,
                        face.photo,
                        face.added_at.to_rfc3339(),
                        face.last_seen.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(stored)
    }

    async fn touch_last_seen(&self, face_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let id = face_id.to_string();
        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE known_faces SET last_seen = ?1 WHERE id = ?2",
                    params![at.to_rfc3339(), id],
                )?;
                Ok(updated)
            })
            .await?;
        if updated == 0 {
            return Err(StoreError::FaceNotFound(face_id.to_string()));
        }
        Ok(())
    }

    async fn log_unknown_encounter(
        &self,
        patient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let patient_id = patient_id.to_string();
        let id = uuid::Uuid::new_v4().to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO unknown_encounters (id, patient_id, encounter_time, patient_action)
                     VALUES (?1, ?2, ?3, 'detected')",
                    params![id, patient_id, at.to_rfc3339()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use familiar_core::{Descriptor, DESCRIPTOR_DIM};

    fn face(id: &str, patient_id: &str, name: &str) -> KnownFace {
        let now = Utc::now();
        KnownFace {
            id: id.into(),
            patient_id: patient_id.into(),
            person_name: name.into(),
            relationship: Some("Friend".into()),
            notes: None,
            face_encoding: Descriptor::new(vec![0.5; DESCRIPTOR_DIM])
                .unwrap()
                .to_encoding(),
            photo: Some(vec![1, 2, 3]),
            added_at: now,
            last_seen: now,
        }
    }

    #[tokio::test]
    async fn test_create_then_list_round_trip() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create_known_face(face("f1", "p1", "Alice")).await.unwrap();

        let faces = store.list_known_faces("p1").await.unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].person_name, "Alice");
        assert_eq!(faces[0].relationship.as_deref(), Some("Friend"));
        assert_eq!(faces[0].photo.as_deref(), Some(&[1, 2, 3][..]));
        assert!(Descriptor::from_encoding(&faces[0].face_encoding).is_ok());
    }

    #[tokio::test]
    async fn test_list_is_scoped_per_patient() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create_known_face(face("f1", "p1", "Alice")).await.unwrap();
        store.create_known_face(face("f2", "p2", "Bob")).await.unwrap();

        let p1 = store.list_known_faces("p1").await.unwrap();
        assert_eq!(p1.len(), 1);
        assert_eq!(p1[0].person_name, "Alice");

        let p2 = store.list_known_faces("p2").await.unwrap();
        assert_eq!(p2.len(), 1);
        assert_eq!(p2[0].person_name, "Bob");

        assert!(store.list_known_faces("p3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_touch_updates_last_seen() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create_known_face(face("f1", "p1", "Alice")).await.unwrap();

        let later = Utc::now() + chrono::Duration::minutes(10);
        store.touch_last_seen("f1", later).await.unwrap();

        let faces = store.list_known_faces("p1").await.unwrap();
        assert_eq!(faces[0].last_seen, later.with_timezone(&Utc));
    }

    #[tokio::test]
    async fn test_touch_missing_face_errors() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let err = store.touch_last_seen("ghost", Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::FaceNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_encounter_logged() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.log_unknown_encounter("p1", Utc::now()).await.unwrap();
        store.log_unknown_encounter("p1", Utc::now()).await.unwrap();
        // Inserts must not collide on id.
    }

    #[tokio::test]
    async fn test_duplicate_face_id_rejected() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.create_known_face(face("f1", "p1", "Alice")).await.unwrap();
        let err = store.create_known_face(face("f1", "p1", "Alice")).await;
        assert!(err.is_err());
    }
}
