//! Keyboard layout domain entity.
//!
//! The layout is a set of rectangular keys positioned in "layout-normalized space":
//! the keyboard frame's pixel width maps to 1.0 and its pixel height maps to the
//! aspect ratio `height / width`. Width is always the reference axis, so the frame
//! occupies `[0, 1] × [0, h]` with `h = height / width`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::format::drawio::DrawioError;

/// Errors that can occur when building or loading a keyboard layout.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// The diagram contains no record acting as the keyboard frame.
    #[error("keyboard frame record `{label}` not found in layout diagram")]
    FrameNotFound { label: String },

    /// The diagram is not well-formed or contains unreadable geometry.
    #[error("failed to parse layout diagram: {0}")]
    Parse(#[from] DrawioError),

    /// The layout file could not be read.
    #[error("I/O error reading layout at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The keyboard frame has a non-positive or non-finite size.
    #[error("invalid keyboard dimensions {width}x{height}")]
    InvalidDimensions { width: f64, height: f64 },

    /// A key has a non-positive or non-finite extent.
    #[error("invalid key `{keycode}`: width and height must be positive and finite")]
    InvalidKey { keycode: String },
}

/// A single key rectangle in layout-normalized space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    /// Label of the key as it appears in the layout diagram (e.g. `"A"`, `"Enter"`).
    pub keycode: String,
    /// Left edge (inclusive).
    pub x: f64,
    /// Top edge (inclusive).
    pub y: f64,
    /// Horizontal extent; the right edge `x + width` is exclusive.
    pub width: f64,
    /// Vertical extent; the bottom edge `y + height` is exclusive.
    pub height: f64,
}

impl Key {
    /// Creates a key from its label and rectangle.
    pub fn new(keycode: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            keycode: keycode.into(),
            x,
            y,
            width,
            height,
        }
    }

    /// Returns the rightmost X coordinate (exclusive).
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Returns the bottommost Y coordinate (exclusive).
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Returns the centre of the key rectangle.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Returns `true` if `(nx, ny)` lies inside the half-open rectangle
    /// `[x, x + width) × [y, y + height)`.
    ///
    /// A point on the edge shared by two adjacent keys belongs to exactly one of
    /// them. Non-finite coordinates are never contained.
    pub fn contains(&self, nx: f64, ny: f64) -> bool {
        self.x <= nx && nx < self.right() && self.y <= ny && ny < self.bottom()
    }

    /// Returns `true` if this key overlaps `other` (shared edges do not count).
    pub fn overlaps(&self, other: &Key) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    fn has_valid_extent(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// The keyboard layout: frame size in source pixel units plus the ordered keys.
///
/// Key order is the order in which the keys appear in the source diagram and is
/// the tie-break rule when rectangles overlap. Deserialization goes through
/// [`KeyboardLayout::new`], so a decoded layout is always valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLayout")]
pub struct KeyboardLayout {
    /// Frame width in source pixel units.
    width: f64,
    /// Frame height in source pixel units.
    height: f64,
    /// Keys in layout-normalized space, in insertion order.
    keys: Vec<Key>,
}

/// Unvalidated wire form of [`KeyboardLayout`].
#[derive(Deserialize)]
struct RawLayout {
    width: f64,
    height: f64,
    keys: Vec<Key>,
}

impl TryFrom<RawLayout> for KeyboardLayout {
    type Error = LayoutError;

    fn try_from(raw: RawLayout) -> Result<Self, Self::Error> {
        Self::new(raw.width, raw.height, raw.keys)
    }
}

impl KeyboardLayout {
    /// Creates a layout from keys that are already in layout-normalized space.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidDimensions`] if the frame size is not positive
    /// and finite, and [`LayoutError::InvalidKey`] for a key with an empty extent.
    pub fn new(width: f64, height: f64, keys: Vec<Key>) -> Result<Self, LayoutError> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(LayoutError::InvalidDimensions { width, height });
        }
        if let Some(bad) = keys.iter().find(|k| !k.has_valid_extent()) {
            return Err(LayoutError::InvalidKey {
                keycode: bad.keycode.clone(),
            });
        }
        Ok(Self {
            width,
            height,
            keys,
        })
    }

    /// Creates a layout from keys measured in source pixel units relative to the
    /// frame's top-left corner.
    ///
    /// Every coordinate (including `y` and `height`) is divided by the frame
    /// `width`.
    ///
    /// # Errors
    ///
    /// Same as [`KeyboardLayout::new`].
    pub fn from_pixel_keys(width: f64, height: f64, keys: Vec<Key>) -> Result<Self, LayoutError> {
        if !(width.is_finite() && width > 0.0) {
            return Err(LayoutError::InvalidDimensions { width, height });
        }
        let keys = keys
            .into_iter()
            .map(|k| Key {
                keycode: k.keycode,
                x: k.x / width,
                y: k.y / width,
                width: k.width / width,
                height: k.height / width,
            })
            .collect();
        Self::new(width, height, keys)
    }

    /// Frame width in source pixel units.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Frame height in source pixel units.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Returns `height / width`, the normalized height of the frame.
    pub fn aspect_ratio(&self) -> f64 {
        self.height / self.width
    }

    /// Returns the frame corners in layout-normalized space, ordered
    /// `[top-left, top-right, bottom-right, bottom-left]`.
    pub fn normalized_corners(&self) -> [[f64; 2]; 4] {
        let h = self.aspect_ratio();
        [[0.0, 0.0], [1.0, 0.0], [1.0, h], [0.0, h]]
    }

    /// Returns all keys in insertion order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Returns the first key with the given label.
    pub fn key(&self, keycode: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.keycode == keycode)
    }

    /// Returns `true` if `(nx, ny)` lies inside the normalized frame `[0, 1] × [0, h]`.
    pub fn contains_normalized(&self, nx: f64, ny: f64) -> bool {
        (0.0..=1.0).contains(&nx) && (0.0..=self.aspect_ratio()).contains(&ny)
    }

    /// Returns the index pairs of keys whose rectangles overlap.
    ///
    /// Overlaps are allowed; lookups resolve them by insertion order. The loader
    /// uses this to warn about diagrams that probably contain a drawing mistake.
    pub fn overlapping_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, a) in self.keys.iter().enumerate() {
            for (j, b) in self.keys.iter().enumerate().skip(i + 1) {
                if a.overlaps(b) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}
