//! Recognition session — the detection loop controller.
//!
//! One tokio task owns the gallery, the pending enrollment, the whisper
//! gate, and the sampling timer. Commands from the UI boundary and
//! detection ticks interleave through a single `select!` loop, so ticks
//! are never re-entrant and an enrollment's gallery mutation is always
//! visible to the next tick.

use crate::engine::{EngineError, Sampler};
use chrono::Utc;
use familiar_core::{
    best_match, enroll, Detection, EnrollError, EnrollmentForm, Gallery, KnownFace,
    PendingEnrollment, WhisperGate, DEFAULT_MATCH_THRESHOLD, DEFAULT_WHISPER_COOLDOWN,
};
use familiar_hw::{SpeechParams, SpeechSink};
use familiar_store::{FaceStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

const MSG_CAMERA_ON: &str = "Camera activated. I will help you recognize people.";
const MSG_CAMERA_OFF: &str = "Camera deactivated.";
const MSG_SOMEONE_NEW: &str = "You are meeting someone new. Would you like to save this person?";

fn greeting(name: &str) -> String {
    format!("Hello, this is {name}")
}

fn remembered(name: &str) -> String {
    format!("I will remember {name} from now on.")
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("face recognition models are not loaded")]
    ModelsNotReady,
    #[error("camera is already running")]
    AlreadyRunning,
    #[error("could not start camera: {0}")]
    CameraStart(#[source] EngineError),
    #[error("could not load known faces: {0}")]
    GalleryLoad(#[source] StoreError),
    #[error("could not save this person: {0}")]
    EnrollmentSave(#[source] StoreError),
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error("no unknown face is waiting to be saved")]
    NoPendingEnrollment,
    #[error("session task exited")]
    ChannelClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    CameraStarting,
    Running,
    Stopped,
}

/// Point-in-time view of the session, published to the UI boundary
/// after every change.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub models_ready: bool,
    pub patient_id: Option<String>,
    pub detection: Detection,
    pub pending_enrollment: bool,
    pub audio_enabled: bool,
    pub gallery_size: usize,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub match_threshold: f32,
    pub tick_period: Duration,
    pub whisper_cooldown: Duration,
    pub audio_enabled: bool,
    pub speech_params: SpeechParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            tick_period: Duration::from_secs(2),
            whisper_cooldown: DEFAULT_WHISPER_COOLDOWN,
            audio_enabled: true,
            speech_params: SpeechParams::default(),
        }
    }
}

enum SessionCommand {
    Start {
        patient_id: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    SetAudioEnabled {
        enabled: bool,
    },
    Confirm {
        form: EnrollmentForm,
        reply: oneshot::Sender<Result<KnownFace, SessionError>>,
    },
    Discard,
}

/// Clone-safe handle to the session task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub async fn start(&self, patient_id: &str) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Start {
                patient_id: patient_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Stop { reply: reply_tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    pub async fn set_audio_enabled(&self, enabled: bool) {
        let _ = self
            .tx
            .send(SessionCommand::SetAudioEnabled { enabled })
            .await;
    }

    pub async fn confirm_enrollment(
        &self,
        form: EnrollmentForm,
    ) -> Result<KnownFace, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Confirm {
                form,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    pub async fn discard_enrollment(&self) {
        let _ = self.tx.send(SessionCommand::Discard).await;
    }

    /// Current published state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribe to state updates.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }
}

/// Spawn the session task. `sampler` is `None` when the models failed
/// to load — the session then refuses every start request.
pub fn spawn_session(
    cfg: SessionConfig,
    sampler: Option<Arc<dyn Sampler>>,
    store: Arc<dyn FaceStore>,
    speech: Box<dyn SpeechSink>,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(8);
    let initial = SessionSnapshot {
        state: SessionState::Idle,
        models_ready: sampler.is_some(),
        patient_id: None,
        detection: Detection::Absent,
        pending_enrollment: false,
        audio_enabled: cfg.audio_enabled,
        gallery_size: 0,
    };
    let (snapshot_tx, snapshot_rx) = watch::channel(initial);

    let task = SessionTask {
        gate: WhisperGate::new(cfg.whisper_cooldown),
        audio_enabled: cfg.audio_enabled,
        cfg,
        sampler,
        store,
        speech,
        state: SessionState::Idle,
        gallery: None,
        detection: Detection::Absent,
        pending: None,
        snapshot_tx,
    };
    tokio::spawn(task.run(rx));

    SessionHandle { tx, snapshot_rx }
}

enum TickerAction {
    Start,
    Stop,
    Keep,
}

struct SessionTask {
    cfg: SessionConfig,
    sampler: Option<Arc<dyn Sampler>>,
    store: Arc<dyn FaceStore>,
    speech: Box<dyn SpeechSink>,
    gate: WhisperGate,
    state: SessionState,
    gallery: Option<Gallery>,
    detection: Detection,
    pending: Option<PendingEnrollment>,
    audio_enabled: bool,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl SessionTask {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        let mut ticker: Option<tokio::time::Interval> = None;

        loop {
            let cmd = if let Some(interval) = ticker.as_mut() {
                tokio::select! {
                    // Commands win over a due tick so an explicit stop
                    // is never delayed behind sampling work.
                    biased;
                    cmd = rx.recv() => cmd,
                    _ = interval.tick() => {
                        self.tick().await;
                        continue;
                    }
                }
            } else {
                rx.recv().await
            };

            let Some(cmd) = cmd else { break };

            match self.handle_command(cmd).await {
                TickerAction::Start => {
                    let start = tokio::time::Instant::now() + self.cfg.tick_period;
                    let mut interval = tokio::time::interval_at(start, self.cfg.tick_period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    ticker = Some(interval);
                }
                TickerAction::Stop => ticker = None,
                TickerAction::Keep => {}
            }
        }

        // Command channel closed (daemon teardown): the camera must not
        // outlive the session under any exit path.
        if matches!(self.state, SessionState::Running | SessionState::CameraStarting) {
            self.close_camera().await;
            self.state = SessionState::Stopped;
            self.publish();
        }
        tracing::debug!("session task exiting");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) -> TickerAction {
        match cmd {
            SessionCommand::Start { patient_id, reply } => {
                let result = self.start(patient_id).await;
                let action = if result.is_ok() {
                    TickerAction::Start
                } else {
                    TickerAction::Keep
                };
                let _ = reply.send(result);
                action
            }
            SessionCommand::Stop { reply } => {
                if matches!(
                    self.state,
                    SessionState::Running | SessionState::CameraStarting
                ) {
                    self.stop_session().await;
                }
                let _ = reply.send(());
                TickerAction::Stop
            }
            SessionCommand::SetAudioEnabled { enabled } => {
                self.audio_enabled = enabled;
                self.publish();
                TickerAction::Keep
            }
            SessionCommand::Confirm { form, reply } => {
                let _ = reply.send(self.confirm(form).await);
                TickerAction::Keep
            }
            SessionCommand::Discard => {
                if self.pending.take().is_some() {
                    self.publish();
                }
                TickerAction::Keep
            }
        }
    }

    async fn start(&mut self, patient_id: String) -> Result<(), SessionError> {
        if self.state == SessionState::Running || self.state == SessionState::CameraStarting {
            return Err(SessionError::AlreadyRunning);
        }
        let Some(sampler) = self.sampler.clone() else {
            return Err(SessionError::ModelsNotReady);
        };

        self.state = SessionState::CameraStarting;
        self.publish();

        let faces = match self.store.list_known_faces(&patient_id).await {
            Ok(faces) => faces,
            Err(err) => {
                self.state = SessionState::Idle;
                self.publish();
                return Err(SessionError::GalleryLoad(err));
            }
        };
        let gallery = Gallery::from_faces(patient_id.clone(), faces);
        tracing::info!(patient = %patient_id, faces = gallery.len(), "gallery loaded");

        if let Err(err) = sampler.open_camera().await {
            self.state = SessionState::Idle;
            self.publish();
            return Err(SessionError::CameraStart(err));
        }

        self.gallery = Some(gallery);
        self.detection = Detection::Absent;
        self.state = SessionState::Running;
        self.publish();
        self.whisper(MSG_CAMERA_ON);
        Ok(())
    }

    async fn stop_session(&mut self) {
        self.close_camera().await;
        self.state = SessionState::Stopped;
        self.detection = Detection::Absent;
        self.pending = None;
        self.gallery = None;
        self.publish();
        self.whisper(MSG_CAMERA_OFF);
    }

    async fn close_camera(&mut self) {
        if let Some(sampler) = &self.sampler {
            sampler.close_camera().await;
        }
    }

    /// One detection cycle: sample → match → report → narrate.
    async fn tick(&mut self) {
        let Some(sampler) = self.sampler.clone() else {
            return;
        };

        let sample = match sampler.sample().await {
            Ok(sample) => sample,
            Err(err) => {
                tracing::warn!(error = %err, "sampling failed; skipping tick");
                return;
            }
        };

        // Single-subject recognition: only the most confident face.
        let Some(observation) = sample.faces.into_iter().next() else {
            self.detection = Detection::Absent;
            self.publish();
            return;
        };

        let matched = self
            .gallery
            .as_ref()
            .and_then(|g| best_match(&observation.descriptor, g, self.cfg.match_threshold));
        let now = Utc::now();

        match matched {
            Some(candidate) => {
                self.detection = Detection::Known {
                    face_id: candidate.face_id.clone(),
                    person_name: candidate.person_name.clone(),
                    confidence_percent: candidate.confidence_percent,
                };
                self.publish();
                self.whisper(&greeting(&candidate.person_name));

                if let Some(gallery) = self.gallery.as_mut() {
                    gallery.touch(&candidate.face_id, now);
                }
                // Best-effort bookkeeping; a store hiccup must not
                // interrupt recognition.
                if let Err(err) = self.store.touch_last_seen(&candidate.face_id, now).await {
                    tracing::warn!(
                        face_id = %candidate.face_id,
                        error = %err,
                        "last-seen update failed"
                    );
                }
            }
            None => {
                self.detection = Detection::Unknown;
                self.whisper(MSG_SOMEONE_NEW);

                match sample.snapshot_jpeg {
                    Some(snapshot_jpeg) => {
                        self.pending = Some(PendingEnrollment {
                            descriptor: observation.descriptor,
                            snapshot_jpeg,
                            staged_at: now,
                        });
                    }
                    None => {
                        tracing::debug!("unknown face sample without snapshot; not staged")
                    }
                }
                self.publish();

                if let Some(patient_id) = self.gallery.as_ref().map(|g| g.patient_id().to_string())
                {
                    if let Err(err) = self.store.log_unknown_encounter(&patient_id, now).await {
                        tracing::warn!(error = %err, "unknown-encounter log failed");
                    }
                }
            }
        }
    }

    async fn confirm(&mut self, form: EnrollmentForm) -> Result<KnownFace, SessionError> {
        if self.pending.is_none() {
            return Err(SessionError::NoPendingEnrollment);
        }
        form.validate()?;

        let (patient_id, face) = {
            let gallery = self.gallery.as_ref().ok_or(SessionError::NoPendingEnrollment)?;
            let pending = self.pending.as_ref().ok_or(SessionError::NoPendingEnrollment)?;
            let face = enroll::build_known_face(gallery.patient_id(), &form, pending, Utc::now());
            (gallery.patient_id().to_string(), face)
        };

        // Persist first: on failure the pending enrollment survives so
        // the user can retry.
        let stored = self
            .store
            .create_known_face(face)
            .await
            .map_err(SessionError::EnrollmentSave)?;

        tracing::info!(
            patient = %patient_id,
            face_id = %stored.id,
            person = %stored.person_name,
            "enrolled new known face"
        );

        if let Some(gallery) = self.gallery.as_mut() {
            gallery.add(stored.clone());
        }
        self.pending = None;
        self.publish();
        self.whisper(&remembered(&stored.person_name));
        Ok(stored)
    }

    fn whisper(&mut self, text: &str) {
        if !self.audio_enabled {
            return;
        }
        let now = tokio::time::Instant::now().into_std();
        if self.gate.should_emit(text, now) {
            self.speech.speak(text, &self.cfg.speech_params);
        }
    }

    fn publish(&self) {
        let snapshot = SessionSnapshot {
            state: self.state,
            models_ready: self.sampler.is_some(),
            patient_id: self.gallery.as_ref().map(|g| g.patient_id().to_string()),
            detection: self.detection.clone(),
            pending_enrollment: self.pending.is_some(),
            audio_enabled: self.audio_enabled,
            gallery_size: self.gallery.as_ref().map(|g| g.len()).unwrap_or(0),
        };
        let _ = self.snapshot_tx.send(snapshot);
    }
}
