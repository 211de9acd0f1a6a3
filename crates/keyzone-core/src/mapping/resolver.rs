//! Fingertip → key resolution: homography followed by key lookup.

use serde::Serialize;
use tracing::trace;

use crate::domain::hand::{finger_name, Hand, Handedness};
use crate::domain::layout::{Key, KeyboardLayout};
use crate::mapping::classifier::KeyClassifier;
use crate::mapping::homography::{CameraQuad, GeometryError, HomographyMapper};

/// A camera point mapped into layout space, with the key under it (if any).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved<'a> {
    /// Layout-normalized coordinates of the point.
    pub normalized: (f64, f64),
    /// The key containing the point, or `None` when it is off the keyboard.
    pub key: Option<&'a Key>,
}

/// Resolution result for one fingertip of one hand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FingertipResolution {
    pub handedness: Handedness,
    pub landmark_id: u32,
    /// Camera-pixel position that was resolved.
    pub camera: (f64, f64),
    /// Layout-normalized position.
    pub normalized: (f64, f64),
    /// The key under the fingertip.
    pub key: Option<Key>,
}

impl FingertipResolution {
    /// Returns the finger name for this fingertip's landmark id.
    pub fn finger_name(&self) -> &'static str {
        finger_name(self.landmark_id)
    }

    /// Returns the label of the resolved key, if any.
    pub fn keycode(&self) -> Option<&str> {
        self.key.as_ref().map(|k| k.keycode.as_str())
    }
}

/// Owns the session's layout and homography and resolves camera points to keys.
///
/// Immutable after construction, so a single resolver can be shared across threads.
#[derive(Debug, Clone)]
pub struct FingertipResolver {
    layout: KeyboardLayout,
    mapper: HomographyMapper,
}

impl FingertipResolver {
    /// Builds the homography for `layout` seen through `quad`.
    ///
    /// # Errors
    ///
    /// Returns a [`GeometryError`] if `quad` is degenerate.
    pub fn new(layout: KeyboardLayout, quad: CameraQuad) -> Result<Self, GeometryError> {
        let mapper = HomographyMapper::new(&layout, quad)?;
        Ok(Self { layout, mapper })
    }

    /// Returns the key under camera point `(px, py)`.
    pub fn resolve(&self, px: f64, py: f64) -> Option<&Key> {
        self.resolve_point(px, py).key
    }

    /// Maps `(px, py)` and looks up the key, keeping the normalized coordinates.
    pub fn resolve_point(&self, px: f64, py: f64) -> Resolved<'_> {
        let (nx, ny) = self.mapper.transform(px, py);
        let key = KeyClassifier::lookup(&self.layout, nx, ny);
        trace!(px, py, nx, ny, key = key.map(|k| k.keycode.as_str()), "resolved point");
        Resolved {
            normalized: (nx, ny),
            key,
        }
    }

    /// Resolves every fingertip of every hand, in input order.
    pub fn resolve_hands(&self, hands: &[Hand]) -> Vec<FingertipResolution> {
        hands
            .iter()
            .flat_map(|hand| {
                hand.fingertips.iter().map(move |tip| {
                    let resolved = self.resolve_point(tip.x, tip.y);
                    FingertipResolution {
                        handedness: hand.handedness,
                        landmark_id: tip.landmark_id,
                        camera: (tip.x, tip.y),
                        normalized: resolved.normalized,
                        key: resolved.key.cloned(),
                    }
                })
            })
            .collect()
    }

    /// Returns the session layout.
    pub fn layout(&self) -> &KeyboardLayout {
        &self.layout
    }

    /// Returns the camera-to-layout mapper.
    pub fn mapper(&self) -> &HomographyMapper {
        &self.mapper
    }
}
