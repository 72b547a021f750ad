use crate::session::SessionConfig;
use familiar_hw::SpeechParams;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Euclidean distance threshold for a positive match.
    pub match_threshold: f32,
    /// Detection sampling period.
    pub tick_period: Duration,
    /// Repeat-suppression window for narration.
    pub whisper_cooldown: Duration,
    /// Whether narration starts enabled.
    pub audio_enabled: bool,
    /// Speech tuning.
    pub speech_rate: f32,
    pub speech_pitch: f32,
    pub speech_volume: f32,
    /// Optional synthesizer voice name.
    pub speech_voice: Option<String>,
}

impl Config {
    /// Load configuration from `FAMILIAR_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("familiar");

        let model_dir = std::env::var("FAMILIAR_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let db_path = std::env::var("FAMILIAR_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("companion.db"));

        Self {
            camera_device: std::env::var("FAMILIAR_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            db_path,
            match_threshold: env_f32("FAMILIAR_MATCH_THRESHOLD", 0.6),
            tick_period: Duration::from_millis(env_u64("FAMILIAR_TICK_MS", 2000)),
            whisper_cooldown: Duration::from_millis(env_u64("FAMILIAR_WHISPER_COOLDOWN_MS", 5000)),
            audio_enabled: std::env::var("FAMILIAR_AUDIO_ENABLED")
                .map(|v| v != "0")
                .unwrap_or(true),
            speech_rate: env_f32("FAMILIAR_SPEECH_RATE", 0.9),
            speech_pitch: env_f32("FAMILIAR_SPEECH_PITCH", 1.0),
            speech_volume: env_f32("FAMILIAR_SPEECH_VOLUME", 0.8),
            speech_voice: std::env::var("FAMILIAR_SPEECH_VOICE").ok(),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("face_detect.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the face embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("face_embed.onnx")
            .to_string_lossy()
            .into_owned()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            match_threshold: self.match_threshold,
            tick_period: self.tick_period,
            whisper_cooldown: self.whisper_cooldown,
            audio_enabled: self.audio_enabled,
            speech_params: SpeechParams {
                rate: self.speech_rate,
                pitch: self.speech_pitch,
                volume: self.speech_volume,
            },
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
