//! Camera-space to keyboard-space mapping.
//!
//! [`homography::HomographyMapper`] turns camera pixels into layout-normalized
//! coordinates, [`classifier::KeyClassifier`] finds the key containing a
//! normalized point, and [`resolver::FingertipResolver`] composes the two.

pub mod classifier;
pub mod homography;
pub mod resolver;
