//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("permission denied opening {0}")]
    PermissionDenied(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("camera not started")]
    NotStarted,
}

/// Continuous frame source the detection loop samples from.
///
/// `start` acquires the device and confirms the stream delivers a first
/// frame; `grab` returns the current frame; `stop` releases the device.
/// Starting an already started source and stopping a stopped one are
/// both no-ops.
pub trait FrameSource: Send {
    fn start(&mut self) -> Result<(), CameraError>;
    fn grab(&mut self) -> Result<Frame, CameraError>;
    fn stop(&mut self);
    fn is_started(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
}

struct OpenDevice {
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

/// V4L2-backed frame source.
pub struct V4l2Source {
    device_path: String,
    open: Option<OpenDevice>,
}

impl V4l2Source {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
            open: None,
        }
    }
}

impl FrameSource for V4l2Source {
    fn start(&mut self) -> Result<(), CameraError> {
        if self.open.is_some() {
            return Ok(());
        }

        let path = &self.device_path;
        if !Path::new(path).exists() {
            return Err(CameraError::DeviceNotFound(path.clone()));
        }

        let device = Device::with_path(path).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("busy") || msg.contains("EBUSY") {
                CameraError::DeviceBusy
            } else if msg.contains("denied") || msg.contains("EACCES") {
                CameraError::PermissionDenied(path.clone())
            } else {
                CameraError::DeviceNotFound(format!("{path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::FormatNegotiationFailed(
                "device does not support video capture".into(),
            ));
        }

        // Ask for 640x480 YUYV; accept GREY if that is what the driver
        // negotiates.
        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = 640;
        fmt.height = 480;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let pixel_format = if negotiated.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if negotiated.fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV or GREY)",
                negotiated.fourcc
            )));
        };

        tracing::info!(
            device = %path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "camera started"
        );

        self.open = Some(OpenDevice {
            device,
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
        });

        // The stream is live once the first frame arrives; surface any
        // capture failure now rather than on the first tick.
        match self.grab() {
            Ok(_) => Ok(()),
            Err(e) => {
                self.open = None;
                Err(e)
            }
        }
    }

    fn grab(&mut self) -> Result<Frame, CameraError> {
        let open = self.open.as_ref().ok_or(CameraError::NotStarted)?;

        let mut stream = MmapStream::with_buffers(&open.device, BufType::VideoCapture, 4)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let data = match open.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, open.width, open.height),
            PixelFormat::Grey => frame::grey_to_grayscale(buf, open.width, open.height),
        }
        .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        Ok(Frame {
            data,
            width: open.width,
            height: open.height,
            sequence: meta.sequence,
        })
    }

    fn stop(&mut self) {
        if self.open.take().is_some() {
            tracing::info!(device = %self.device_path, "camera stopped");
        }
    }

    fn is_started(&self) -> bool {
        self.open.is_some()
    }
}
