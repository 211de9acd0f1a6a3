//! # keyzone-camera
//!
//! Camera acquisition for keyzone.
//!
//! - **`device`** – the [`CameraDevice`] trait, the open-time [`CameraConfig`]
//!   and the negotiated [`CameraProperties`].
//! - **`frame_source`** – [`FrameSource`], which reads the device on a
//!   dedicated thread and keeps only the most recent frame for the consumer.
//! - **`mock`** – a scripted camera for tests and replay.
//! - **`opencv_camera`** – the OpenCV `VideoCapture` backend (feature `opencv`).

pub mod device;
pub mod frame_source;
pub mod mock;

#[cfg(feature = "opencv")]
pub mod opencv_camera;

pub use device::{CameraConfig, CameraDevice, CameraProperties, CaptureError, Frame, Image, Setting};
pub use frame_source::{FrameSource, SourceState, DEFAULT_STOP_TIMEOUT};
pub use mock::{MockCamera, MockCameraHandle};

#[cfg(feature = "opencv")]
pub use opencv_camera::OpenCvCamera;
