use crate::session::{SessionError, SessionHandle};
use familiar_core::EnrollmentForm;
use zbus::interface;

/// D-Bus interface for the Familiar companion daemon.
///
/// Bus name: org.familiar.Companion1
/// Object path: /org/familiar/Companion1
pub struct CompanionService {
    session: SessionHandle,
}

impl CompanionService {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }
}

fn to_fdo(err: SessionError) -> zbus::fdo::Error {
    match err {
        SessionError::Enroll(_) => zbus::fdo::Error::InvalidArgs(err.to_string()),
        _ => zbus::fdo::Error::Failed(err.to_string()),
    }
}

fn none_if_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[interface(name = "org.familiar.Companion1")]
impl CompanionService {
    /// Start a recognition session for the given patient.
    async fn start_camera(&self, patient_id: &str) -> zbus::fdo::Result<()> {
        tracing::info!(patient_id, "start_camera requested");
        self.session.start(patient_id).await.map_err(to_fdo)
    }

    /// Stop the running recognition session.
    async fn stop_camera(&self) -> zbus::fdo::Result<()> {
        tracing::info!("stop_camera requested");
        self.session.stop().await.map_err(to_fdo)
    }

    /// Enable or mute narration.
    async fn set_audio_enabled(&self, enabled: bool) -> zbus::fdo::Result<()> {
        self.session.set_audio_enabled(enabled).await;
        Ok(())
    }

    /// Current detection state as JSON.
    async fn current_detection(&self) -> zbus::fdo::Result<String> {
        let detection = self.session.snapshot().detection;
        serde_json::to_string(&detection)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Save the pending unknown face as a known person. Returns the
    /// stored record as JSON.
    async fn confirm_enrollment(
        &self,
        name: &str,
        relationship: &str,
        notes: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(name, "confirm_enrollment requested");
        let form = EnrollmentForm {
            person_name: name.to_string(),
            relationship: none_if_blank(relationship),
            notes: none_if_blank(notes),
        };
        let face = self.session.confirm_enrollment(form).await.map_err(to_fdo)?;
        Ok(serde_json::json!({
            "id": face.id,
            "patient_id": face.patient_id,
            "person_name": face.person_name,
            "relationship": face.relationship,
            "notes": face.notes,
            "added_at": face.added_at.to_rfc3339(),
        })
        .to_string())
    }

    /// Drop the pending unknown face without saving it.
    async fn discard_enrollment(&self) -> zbus::fdo::Result<()> {
        self.session.discard_enrollment().await;
        Ok(())
    }

    /// Daemon and session status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.session.snapshot();
        let mut value = serde_json::to_value(&snapshot)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        value["version"] = serde_json::Value::from(env!("CARGO_PKG_VERSION"));
        Ok(value.to_string())
    }
}
