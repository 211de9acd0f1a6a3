//! OpenCV `VideoCapture` camera backend.
//!
//! Applies the whole [`CameraConfig`] at open time and reads back what the
//! driver actually negotiated. Property writes the driver rejects are logged and
//! otherwise ignored; the read-back properties are what count.

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoWriter};
use tracing::{debug, info, warn};

use crate::device::{CameraConfig, CameraDevice, CameraProperties, CaptureError, Image, Setting};

/// V4L2 `CAP_PROP_AUTO_EXPOSURE` values: 1 is manual, 3 is aperture priority.
const V4L2_EXPOSURE_MANUAL: f64 = 1.0;
const V4L2_EXPOSURE_AUTO: f64 = 3.0;

/// A camera opened through OpenCV.
pub struct OpenCvCamera {
    capture: VideoCapture,
    properties: CameraProperties,
    buffer: Mat,
}

impl OpenCvCamera {
    /// Opens camera `config.device_index` and applies `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::DeviceOpen`] if the device cannot be opened.
    pub fn open(config: &CameraConfig) -> Result<Self, CaptureError> {
        let index = config.device_index;
        let open_err = |reason: String| CaptureError::DeviceOpen { index, reason };

        info!("opening camera {index}");
        let mut capture =
            VideoCapture::new(index, videoio::CAP_ANY).map_err(|e| open_err(e.to_string()))?;
        if !capture.is_opened().map_err(|e| open_err(e.to_string()))? {
            return Err(open_err("device is not available".to_string()));
        }

        // Keep at most one frame queued in the driver so reads are always fresh.
        set_property(&mut capture, videoio::CAP_PROP_BUFFERSIZE, 1.0, "buffer size");

        let code = config.fourcc.as_str();
        if !code.is_empty() {
            match fourcc(code) {
                Some(value) => set_property(&mut capture, videoio::CAP_PROP_FOURCC, value, "fourcc"),
                None => warn!("ignoring invalid fourcc {code:?}; expected four ASCII characters"),
            }
        }
        set_property(&mut capture, videoio::CAP_PROP_FRAME_WIDTH, f64::from(config.width), "width");
        set_property(&mut capture, videoio::CAP_PROP_FRAME_HEIGHT, f64::from(config.height), "height");
        set_property(&mut capture, videoio::CAP_PROP_FPS, config.fps, "fps");

        match config.exposure {
            Setting::Auto => {
                set_property(&mut capture, videoio::CAP_PROP_AUTO_EXPOSURE, V4L2_EXPOSURE_AUTO, "auto exposure")
            }
            Setting::Fixed(value) => {
                set_property(&mut capture, videoio::CAP_PROP_AUTO_EXPOSURE, V4L2_EXPOSURE_MANUAL, "auto exposure");
                set_property(&mut capture, videoio::CAP_PROP_EXPOSURE, value, "exposure");
            }
        }
        match config.focus {
            Setting::Auto => set_property(&mut capture, videoio::CAP_PROP_AUTOFOCUS, 1.0, "autofocus"),
            Setting::Fixed(value) => {
                set_property(&mut capture, videoio::CAP_PROP_AUTOFOCUS, 0.0, "autofocus");
                set_property(&mut capture, videoio::CAP_PROP_FOCUS, value, "focus");
            }
        }

        let properties = read_properties(&capture);
        info!(
            width = properties.width,
            height = properties.height,
            fps = properties.fps,
            focus = ?properties.focus,
            "camera negotiated"
        );
        if (properties.width, properties.height) != (config.width, config.height) {
            warn!(
                "camera delivers {}x{} instead of the requested {}x{}",
                properties.width, properties.height, config.width, config.height
            );
        }

        Ok(Self {
            capture,
            properties,
            buffer: Mat::default(),
        })
    }
}

impl CameraDevice for OpenCvCamera {
    fn properties(&self) -> CameraProperties {
        self.properties
    }

    fn read_frame(&mut self) -> Result<Image, CaptureError> {
        let grabbed = self
            .capture
            .read(&mut self.buffer)
            .map_err(|e| CaptureError::Read(e.to_string()))?;
        if !grabbed || self.buffer.empty() {
            return Err(CaptureError::Read("end of stream".to_string()));
        }

        let width = u32::try_from(self.buffer.cols()).unwrap_or(0);
        let height = u32::try_from(self.buffer.rows()).unwrap_or(0);
        let data = if self.buffer.is_continuous() {
            self.buffer
                .data_bytes()
                .map_err(|e| CaptureError::Read(e.to_string()))?
                .to_vec()
        } else {
            let packed = self
                .buffer
                .try_clone()
                .map_err(|e| CaptureError::Read(e.to_string()))?;
            packed
                .data_bytes()
                .map_err(|e| CaptureError::Read(e.to_string()))?
                .to_vec()
        };
        Ok(Image { width, height, data })
    }

    fn release(&mut self) {
        match self.capture.release() {
            Ok(()) => debug!("camera released"),
            Err(e) => warn!("camera release failed: {e}"),
        }
    }
}

fn set_property(capture: &mut VideoCapture, property: i32, value: f64, name: &str) {
    match capture.set(property, value) {
        Ok(true) => debug!("set camera {name} = {value}"),
        Ok(false) => warn!("camera rejected {name} = {value}"),
        Err(e) => warn!("failed to set camera {name}: {e}"),
    }
}

fn read_properties(capture: &VideoCapture) -> CameraProperties {
    let get = |property| capture.get(property).unwrap_or(0.0);
    let focus = get(videoio::CAP_PROP_FOCUS);
    CameraProperties {
        width: get(videoio::CAP_PROP_FRAME_WIDTH).max(0.0) as u32,
        height: get(videoio::CAP_PROP_FRAME_HEIGHT).max(0.0) as u32,
        fps: get(videoio::CAP_PROP_FPS),
        focus: (focus > 0.0).then_some(focus),
    }
}

/// Packs a four-character code such as `"MJPG"` the way OpenCV expects it.
fn fourcc(code: &str) -> Option<f64> {
    let mut chars = code.chars();
    match (chars.next(), chars.next(), chars.next(), chars.next(), chars.next()) {
        (Some(a), Some(b), Some(c), Some(d), None) if code.is_ascii() => {
            VideoWriter::fourcc(a, b, c, d).ok().map(f64::from)
        }
        _ => None,
    }
}
