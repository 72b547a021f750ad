use anyhow::Result;
use familiar_core::FaceExtractor;
use familiar_hw::{EspeakSink, SpeechSink, V4l2Source};
use familiar_store::SqliteStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod session;

use config::Config;
use dbus_interface::CompanionService;
use engine::{spawn_engine, Sampler};
use session::spawn_session;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("familiard starting");
    let config = Config::from_env();

    if let Some(dir) = config.db_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let store = Arc::new(SqliteStore::open(&config.db_path).await?);
    tracing::info!(db = %config.db_path.display(), "store opened");

    // A missing model is an environment error: the daemon still serves
    // the UI boundary, but every start request is refused until the
    // models are installed.
    let sampler: Option<Arc<dyn Sampler>> = match FaceExtractor::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
    ) {
        Ok(extractor) => {
            let source = V4l2Source::new(config.camera_device.clone());
            tracing::info!(device = %config.camera_device, "inference engine ready");
            Some(Arc::new(spawn_engine(Box::new(source), Box::new(extractor))))
        }
        Err(err) => {
            tracing::error!(error = %err, "face models unavailable; recognition disabled");
            None
        }
    };

    let speech: Box<dyn SpeechSink> = Box::new(EspeakSink::new(config.speech_voice.clone()));
    let session = spawn_session(config.session_config(), sampler, store, speech);

    let _connection = zbus::connection::Builder::session()?
        .name("org.familiar.Companion1")?
        .serve_at("/org/familiar/Companion1", CompanionService::new(session.clone()))?
        .build()
        .await?;

    tracing::info!("familiard ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("familiard shutting down");
    let _ = session.stop().await;

    Ok(())
}
