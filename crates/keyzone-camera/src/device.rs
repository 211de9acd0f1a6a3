//! Camera device abstraction.
//!
//! A [`CameraDevice`] is an opened camera. It is moved onto the capture thread
//! by [`FrameSource`](crate::FrameSource), so implementations must be `Send`,
//! but they are never shared: every call happens on one thread at a time.
//!
//! # Testability
//!
//! The trait lets the capture pipeline run against [`MockCamera`](crate::MockCamera)
//! without any camera hardware.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Error type for camera and capture operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to open camera {index}: {reason}")]
    DeviceOpen { index: i32, reason: String },
    #[error("camera read failed: {0}")]
    Read(String),
    #[error("frame source has already been started")]
    AlreadyStarted,
    #[error("frame source has already been stopped")]
    AlreadyStopped,
    #[error("capture thread did not stop within {0} ms")]
    StopTimeout(u64),
    #[error("camera reported invalid frame size {width}x{height}")]
    InvalidProperties { width: u32, height: u32 },
    #[error("failed to spawn capture thread: {0}")]
    ThreadSpawn(String),
}

/// A camera control that is either left to the driver or pinned to a value.
///
/// In TOML this is written `"auto"` or `{ fixed = 400.0 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Setting {
    Auto,
    Fixed(f64),
}

/// Requested camera parameters, applied once when the device is opened.
///
/// Drivers are free to negotiate different values; read the outcome back with
/// [`CameraDevice::properties`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Index of the capture device (`/dev/video<N>` on Linux).
    #[serde(default)]
    pub device_index: i32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Four-character pixel format code, e.g. `"MJPG"`. An empty string keeps the
    /// driver default.
    #[serde(default = "default_fourcc")]
    pub fourcc: String,
    #[serde(default = "default_exposure")]
    pub exposure: Setting,
    #[serde(default = "default_focus")]
    pub focus: Setting,
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_fps() -> f64 {
    30.0
}

fn default_fourcc() -> String {
    "MJPG".to_string()
}

fn default_exposure() -> Setting {
    Setting::Auto
}

fn default_focus() -> Setting {
    Setting::Fixed(400.0)
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            fourcc: default_fourcc(),
            exposure: default_exposure(),
            focus: default_focus(),
        }
    }
}

/// Parameters the opened device actually delivers.
///
/// These, not the requested [`CameraConfig`], are authoritative for converting
/// detector output into camera pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraProperties {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Focus position, when the driver reports one.
    pub focus: Option<f64>,
}

impl CameraProperties {
    /// Returns an error if the reported frame size is unusable.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::InvalidProperties {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Raw pixels as produced by a device read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    /// Interleaved pixel bytes in the device's native channel order.
    pub data: Vec<u8>,
}

/// A captured image stamped by the frame source.
///
/// Frames are handed out as `Arc<Frame>`; a consumer may hold one for as long
/// as it likes without blocking the producer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Position in capture order, starting at 1. Strictly increasing per source.
    pub sequence: u64,
    pub captured_at: Instant,
    pub data: Vec<u8>,
}

impl Frame {
    /// Stamps `image` with its capture sequence number and the current time.
    pub fn new(sequence: u64, image: Image) -> Self {
        Self {
            width: image.width,
            height: image.height,
            sequence,
            captured_at: Instant::now(),
            data: image.data,
        }
    }
}

/// An opened camera.
pub trait CameraDevice: Send + 'static {
    /// Returns the negotiated capture parameters.
    fn properties(&self) -> CameraProperties;

    /// Blocks until the next frame is available.
    ///
    /// An error ends capture; the frame source does not retry.
    fn read_frame(&mut self) -> Result<Image, CaptureError>;

    /// Releases the underlying OS handle. Called exactly once, after the last read.
    fn release(&mut self);
}
