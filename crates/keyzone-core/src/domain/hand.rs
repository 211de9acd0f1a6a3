//! Hand and fingertip entities produced by the external hand detector.
//!
//! The detector reports landmarks in image-normalized coordinates (`0..1` on both
//! axes). The resolver works in camera pixels, so observations are converted with
//! [`HandObservation::to_camera_space`] using the camera's negotiated frame size.

use serde::{Deserialize, Serialize};

/// Landmark id of the thumb tip.
pub const THUMB_TIP: u32 = 4;
/// Landmark id of the index finger tip.
pub const INDEX_TIP: u32 = 8;
/// Landmark id of the middle finger tip.
pub const MIDDLE_TIP: u32 = 12;
/// Landmark id of the ring finger tip.
pub const RING_TIP: u32 = 16;
/// Landmark id of the little finger tip.
pub const PINKY_TIP: u32 = 20;

/// The five fingertip landmarks tracked by default, thumb first.
pub const FINGERTIP_IDS: [u32; 5] = [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// Returns a human-readable finger name for a fingertip landmark id.
pub fn finger_name(landmark_id: u32) -> &'static str {
    match landmark_id {
        THUMB_TIP => "Thumb",
        INDEX_TIP => "Index",
        MIDDLE_TIP => "Middle",
        RING_TIP => "Ring",
        PINKY_TIP => "Pinky",
        _ => "Unknown",
    }
}

/// Which hand an observation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Returns the opposite hand.
    ///
    /// Detectors label hands as seen in the image; a mirrored camera view reports
    /// the left hand as `Right` and vice versa.
    pub fn mirrored(self) -> Self {
        match self {
            Handedness::Left => Handedness::Right,
            Handedness::Right => Handedness::Left,
        }
    }

    /// Returns `"Left"` or `"Right"`.
    pub fn label(self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        }
    }
}

impl std::fmt::Display for Handedness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single landmark in image-normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: u32,
    pub x: f64,
    pub y: f64,
}

/// One detected hand as reported by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    pub handedness: Handedness,
    pub landmarks: Vec<Landmark>,
}

impl HandObservation {
    /// Converts the tracked landmarks to camera pixels.
    ///
    /// Only landmarks whose id is in `tracked_ids` are kept, in the order of
    /// `tracked_ids`. Pixel coordinates are truncated toward zero, matching how
    /// the camera quadrilateral was measured (whole pixels).
    pub fn to_camera_space(&self, frame_width: u32, frame_height: u32, tracked_ids: &[u32]) -> Hand {
        let fingertips = tracked_ids
            .iter()
            .filter_map(|id| self.landmarks.iter().find(|l| l.id == *id))
            .map(|l| Fingertip {
                landmark_id: l.id,
                x: (l.x * f64::from(frame_width)).trunc(),
                y: (l.y * f64::from(frame_height)).trunc(),
            })
            .collect();
        Hand {
            handedness: self.handedness,
            fingertips,
        }
    }
}

/// A tracked fingertip in camera-pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fingertip {
    pub landmark_id: u32,
    pub x: f64,
    pub y: f64,
}

/// A hand whose fingertips are in camera-pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hand {
    pub handedness: Handedness,
    pub fingertips: Vec<Fingertip>,
}

impl Hand {
    /// Rotates every fingertip by 180° inside a `width × height` frame.
    ///
    /// Used when the camera is mounted upside down relative to the calibrated view.
    pub fn rotated_180(mut self, frame_width: u32, frame_height: u32) -> Self {
        let max_x = f64::from(frame_width.saturating_sub(1));
        let max_y = f64::from(frame_height.saturating_sub(1));
        for tip in &mut self.fingertips {
            tip.x = max_x - tip.x;
            tip.y = max_y - tip.y;
        }
        self
    }

    /// Swaps the handedness label.
    pub fn mirrored(mut self) -> Self {
        self.handedness = self.handedness.mirrored();
        self
    }
}
