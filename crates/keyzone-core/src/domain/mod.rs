//! Domain entities for keyzone.
//!
//! Pure data with no OS, camera or thread dependencies: the keyboard layout and
//! the hand/fingertip observations that get resolved against it.

/// Keyboard layout: keys as rectangles in layout-normalized space.
pub mod layout;

/// Hands and fingertips reported by the hand detector.
pub mod hand;
