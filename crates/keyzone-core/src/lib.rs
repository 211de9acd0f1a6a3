//! # keyzone-core
//!
//! Geometry engine for resolving tracked fingertips to keys of a printed or
//! virtual keyboard seen by a fixed overhead camera.
//!
//! - **`domain`** – the [`KeyboardLayout`] (keys as rectangles in
//!   layout-normalized space, where the frame width is 1.0) and the hand and
//!   fingertip types produced by a hand detector.
//! - **`mapping`** – the camera → layout homography, the half-open key lookup
//!   and the [`FingertipResolver`] that combines them.
//! - **`format`** – the draw.io diagram reader that produces layouts.
//!
//! Everything here is pure and immutable after construction; nothing blocks or
//! spawns threads.

pub mod domain;
pub mod format;
pub mod mapping;

pub use domain::hand::{
    finger_name, Fingertip, Hand, HandObservation, Handedness, Landmark, FINGERTIP_IDS,
};
pub use domain::layout::{Key, KeyboardLayout, LayoutError};
pub use format::drawio::{load_layout, parse_layout, DrawioError};
pub use mapping::classifier::KeyClassifier;
pub use mapping::homography::{CameraQuad, GeometryError, HomographyMapper};
pub use mapping::resolver::{FingertipResolution, FingertipResolver, Resolved};
