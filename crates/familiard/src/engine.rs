//! Inference engine thread.
//!
//! Camera I/O and model inference are blocking, so they live on a
//! dedicated OS thread that owns both resources and serves requests
//! over a channel. The session task talks to it through [`Sampler`].

use async_trait::async_trait;
use familiar_core::{EmbeddingModel, ExtractorError, FaceObservation};
use familiar_hw::{CameraError, Frame, FrameSource};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const SNAPSHOT_JPEG_QUALITY: u8 = 80;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("extractor error: {0}")]
    Extractor(#[from] ExtractorError),
    #[error("snapshot encoding failed: {0}")]
    Snapshot(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// One sampled detection cycle's raw material.
pub struct Sample {
    /// Faces found in the frame, ordered by detection confidence.
    pub faces: Vec<FaceObservation>,
    /// JPEG of the sampled frame; present only when a face was found.
    pub snapshot_jpeg: Option<Vec<u8>>,
}

/// The engine surface the detection loop drives. Production
/// implementation is [`EngineHandle`]; tests substitute fakes.
#[async_trait]
pub trait Sampler: Send + Sync {
    /// Acquire the camera; returns once the stream delivers a frame.
    async fn open_camera(&self) -> Result<(), EngineError>;
    /// Release the camera. Idempotent.
    async fn close_camera(&self);
    /// Grab the current frame and extract face observations.
    async fn sample(&self) -> Result<Sample, EngineError>;
}

enum EngineRequest {
    OpenCamera {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    CloseCamera {
        reply: oneshot::Sender<()>,
    },
    Sample {
        reply: oneshot::Sender<Result<Sample, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

#[async_trait]
impl Sampler for EngineHandle {
    async fn open_camera(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::OpenCamera { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    async fn close_camera(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(EngineRequest::CloseCamera { reply: reply_tx })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    async fn sample(&self) -> Result<Sample, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Sample { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the frame source and the models for its whole life;
/// the camera itself is acquired and released per session through
/// open/close requests. Dropping the handle ends the thread, which
/// releases the camera if a session left it open.
pub fn spawn_engine(
    mut source: Box<dyn FrameSource>,
    mut model: Box<dyn EmbeddingModel>,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("familiar-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::OpenCamera { reply } => {
                        let result = source.start().map_err(EngineError::from);
                        if let Err(err) = &result {
                            tracing::warn!(error = %err, "camera open failed");
                        }
                        let _ = reply.send(result);
                    }
                    EngineRequest::CloseCamera { reply } => {
                        source.stop();
                        let _ = reply.send(());
                    }
                    EngineRequest::Sample { reply } => {
                        let _ = reply.send(run_sample(source.as_mut(), model.as_mut()));
                    }
                }
            }
            // Handle dropped: make sure a live camera never outlives
            // the session that opened it.
            source.stop();
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

fn run_sample(
    source: &mut dyn FrameSource,
    model: &mut dyn EmbeddingModel,
) -> Result<Sample, EngineError> {
    let frame = source.grab()?;
    let faces = model.extract(&frame.data, frame.width, frame.height)?;

    let snapshot_jpeg = if faces.is_empty() {
        None
    } else {
        Some(encode_snapshot(&frame)?)
    };

    tracing::debug!(
        sequence = frame.sequence,
        faces = faces.len(),
        "sampled frame"
    );

    Ok(Sample { faces, snapshot_jpeg })
}

/// Encode the grayscale frame as a JPEG for the enrollment dialog.
fn encode_snapshot(frame: &Frame) -> Result<Vec<u8>, EngineError> {
    let mut buf = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, SNAPSHOT_JPEG_QUALITY);
    encoder
        .encode(
            &frame.data,
            frame.width,
            frame.height,
            image::ExtendedColorType::L8,
        )
        .map_err(|e| EngineError::Snapshot(e.to_string()))?;
    Ok(buf)
}
