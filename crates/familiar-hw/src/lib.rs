//! familiar-hw — Platform capabilities for the companion.
//!
//! V4L2 camera capture behind [`FrameSource`] and speech synthesis
//! behind [`SpeechSink`], so the recognition core stays
//! platform-independent and unit-testable with fakes.

pub mod camera;
pub mod frame;
pub mod speech;

pub use camera::{CameraError, FrameSource, V4l2Source};
pub use frame::Frame;
pub use speech::{EspeakSink, NullSink, SpeechParams, SpeechSink};
