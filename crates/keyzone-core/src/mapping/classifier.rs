//! Point-to-key classification in layout-normalized space.

use crate::domain::layout::{Key, KeyboardLayout};

/// Stateless key lookup over a [`KeyboardLayout`].
pub struct KeyClassifier;

impl KeyClassifier {
    /// Returns the first key, in insertion order, whose half-open rectangle contains
    /// `(nx, ny)`.
    ///
    /// Returns `None` when the point is off every key; this is the normal
    /// "finger off the keyboard" case, not a failure. When rectangles overlap the
    /// earlier key wins.
    pub fn lookup(layout: &KeyboardLayout, nx: f64, ny: f64) -> Option<&Key> {
        layout.keys().iter().find(|key| key.contains(nx, ny))
    }
}
