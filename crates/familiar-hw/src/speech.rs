//! Speech synthesis sink — the whisper's voice.

use std::process::{Command, Stdio};

/// Utterance tuning passed through to the synthesizer.
#[derive(Debug, Clone, Copy)]
pub struct SpeechParams {
    /// Relative speaking rate, 1.0 = normal.
    pub rate: f32,
    /// Relative pitch, 1.0 = normal.
    pub pitch: f32,
    /// Volume 0.0–1.0.
    pub volume: f32,
}

impl Default for SpeechParams {
    fn default() -> Self {
        // Slightly slow and soft, tuned for an earpiece.
        Self {
            rate: 0.9,
            pitch: 1.0,
            volume: 0.8,
        }
    }
}

/// Fire-and-forget text-to-speech output. No acknowledgment; failures
/// are logged and swallowed.
pub trait SpeechSink: Send {
    fn speak(&self, text: &str, params: &SpeechParams);
}

/// espeak-ng subprocess sink.
///
/// espeak-ng flags: `-s` words per minute (default 175), `-p` pitch
/// 0–99 (default 50), `-a` amplitude 0–200 (default 100).
pub struct EspeakSink {
    voice: Option<String>,
}

impl EspeakSink {
    pub fn new(voice: Option<String>) -> Self {
        Self { voice }
    }
}

impl SpeechSink for EspeakSink {
    fn speak(&self, text: &str, params: &SpeechParams) {
        let words_per_minute = (175.0 * params.rate).round().clamp(80.0, 450.0) as u32;
        let pitch = (50.0 * params.pitch).round().clamp(0.0, 99.0) as u32;
        let amplitude = (100.0 * params.volume).round().clamp(0.0, 200.0) as u32;

        let mut cmd = Command::new("espeak-ng");
        cmd.arg("-s")
            .arg(words_per_minute.to_string())
            .arg("-p")
            .arg(pitch.to_string())
            .arg("-a")
            .arg(amplitude.to_string());
        if let Some(voice) = &self.voice {
            cmd.arg("-v").arg(voice);
        }
        cmd.arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match cmd.spawn() {
            Ok(_) => tracing::debug!(text, "speaking"),
            Err(err) => tracing::warn!(error = %err, "speech synthesis unavailable"),
        }
    }
}

/// Sink that discards all speech. Used when no synthesizer is wanted.
pub struct NullSink;

impl SpeechSink for NullSink {
    fn speak(&self, text: &str, _params: &SpeechParams) {
        tracing::debug!(text, "speech muted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_soft_and_slow() {
        let p = SpeechParams::default();
        assert!(p.rate < 1.0);
        assert!(p.volume < 1.0);
        assert_eq!(p.pitch, 1.0);
    }

    #[test]
    fn test_null_sink_is_silent() {
        // Just exercises the trait object path.
        let sink: Box<dyn SpeechSink> = Box::new(NullSink);
        sink.speak("Hello, this is Alice", &SpeechParams::default());
    }
}
