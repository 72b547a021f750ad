//! De-duplication gate for spoken announcements.
//!
//! The detection loop re-reports the same identity on every tick; the
//! gate keeps the narration from flooding the patient's earpiece.

use std::time::{Duration, Instant};

/// Default repeat-suppression window.
pub const DEFAULT_WHISPER_COOLDOWN: Duration = Duration::from_secs(5);

/// Suppresses repeats of the most recent message inside a cooldown
/// window. Evaluated per message content: a different message passes
/// immediately, even mid-cooldown.
#[derive(Debug)]
pub struct WhisperGate {
    cooldown: Duration,
    last: Option<(String, Instant)>,
}

impl WhisperGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, last: None }
    }

    /// Decide whether `text` should be spoken at `now`, and record it
    /// if so. Returns false only for an exact repeat inside the window.
    pub fn should_emit(&mut self, text: &str, now: Instant) -> bool {
        if let Some((last_text, last_at)) = &self.last {
            if last_text == text && now.duration_since(*last_at) < self.cooldown {
                return false;
            }
        }
        self.last = Some((text.to_string(), now));
        true
    }
}

impl Default for WhisperGate {
    fn default() -> Self {
        Self::new(DEFAULT_WHISPER_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_emits() {
        let mut gate = WhisperGate::default();
        assert!(gate.should_emit("Hello, this is Alice", Instant::now()));
    }

    #[test]
    fn test_repeat_within_window_suppressed() {
        let mut gate = WhisperGate::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(gate.should_emit("Hello, this is Alice", t0));
        assert!(!gate.should_emit("Hello, this is Alice", t0 + Duration::from_secs(2)));
        assert!(!gate.should_emit("Hello, this is Alice", t0 + Duration::from_secs(4)));
    }

    #[test]
    fn test_repeat_after_window_emits() {
        let mut gate = WhisperGate::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(gate.should_emit("Hello, this is Alice", t0));
        assert!(gate.should_emit("Hello, this is Alice", t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_different_message_interrupts_cooldown() {
        let mut gate = WhisperGate::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(gate.should_emit("Hello, this is Alice", t0));
        assert!(gate.should_emit("Hello, this is Bob", t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_emission_resets_window() {
        let mut gate = WhisperGate::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(gate.should_emit("A", t0));
        assert!(gate.should_emit("B", t0 + Duration::from_secs(1)));
        // "A" again: last emitted message is now "B", so "A" passes.
        assert!(gate.should_emit("A", t0 + Duration::from_secs(2)));
        // And the fresh "A" emission starts its own window.
        assert!(!gate.should_emit("A", t0 + Duration::from_secs(3)));
    }
}
