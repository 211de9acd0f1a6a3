//! Camera-space → layout-normalized-space projective mapping.
//!
//! The mapper is built once per session from the four camera-pixel corners of the
//! keyboard frame. It solves the exact 4-point correspondence (8 unknowns, 8
//! equations, `h33 = 1`) against the normalized frame `[(0,0),(1,0),(1,h),(0,h)]`,
//! so that key rectangles can be compared directly against mapped points.
//!
//! Wire-up:
//!
//! ```text
//!   camera quad [TL, TR, BR, BL]  ──solve──▶  H (3×3)
//!   (px, py) ──H──▶ (a·px+b·py+c, d·px+e·py+f) / (g·px+h·py+1) = (nx, ny)
//! ```

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::layout::KeyboardLayout;

/// Relative area below which three corners are treated as collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-9;

/// Denominator magnitude below which a point is treated as lying on the line at infinity.
const PROJECTIVE_EPSILON: f64 = 1e-15;

/// Errors raised while constructing a [`HomographyMapper`].
///
/// All variants mean the camera quadrilateral cannot yield a valid transform; the
/// caller has to supply corrected corners.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    /// A corner coordinate is NaN or infinite.
    #[error("degenerate camera quadrilateral: corner {0} is not finite")]
    NonFiniteCorner(usize),

    /// Three of the corners are collinear, or two coincide.
    #[error("degenerate camera quadrilateral: corners {0:?} are collinear or coincident")]
    CollinearCorners([usize; 3]),

    /// The correspondence system has no unique solution.
    #[error("degenerate camera quadrilateral: correspondence system is singular")]
    Singular,
}

/// The keyboard frame as seen by the camera, in pixels.
///
/// Corners are ordered `[top-left, top-right, bottom-right, bottom-left]` with
/// respect to the keyboard, regardless of how the keyboard is rotated in the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraQuad {
    corners: [[f64; 2]; 4],
}

impl CameraQuad {
    /// Creates a quad from `[TL, TR, BR, BL]` camera-pixel corners.
    pub fn new(corners: [[f64; 2]; 4]) -> Self {
        Self { corners }
    }

    /// Returns the corners in `[TL, TR, BR, BL]` order.
    pub fn corners(&self) -> &[[f64; 2]; 4] {
        &self.corners
    }

    /// Returns the mean of the four corners.
    pub fn centroid(&self) -> [f64; 2] {
        let sx: f64 = self.corners.iter().map(|c| c[0]).sum();
        let sy: f64 = self.corners.iter().map(|c| c[1]).sum();
        [sx / 4.0, sy / 4.0]
    }

    /// Checks that every corner is finite and that no three corners are collinear.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::NonFiniteCorner`] or [`GeometryError::CollinearCorners`].
    pub fn validate(&self) -> Result<(), GeometryError> {
        if let Some(i) = self
            .corners
            .iter()
            .position(|c| !(c[0].is_finite() && c[1].is_finite()))
        {
            return Err(GeometryError::NonFiniteCorner(i));
        }

        // Twice the triangle area is compared against the squared extent of the
        // quad so the test does not depend on the pixel scale.
        let extent = self.extent();
        let tolerance = COLLINEAR_TOLERANCE * extent * extent;
        for triple in [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]] {
            let [a, b, c] = triple.map(|i| self.corners[i]);
            if cross(a, b, c).abs() <= tolerance {
                return Err(GeometryError::CollinearCorners(triple));
            }
        }
        Ok(())
    }

    /// Returns `true` if the corners form a convex polygon in the given order.
    pub fn is_convex(&self) -> bool {
        let signs: Vec<bool> = (0..4)
            .map(|i| {
                cross(
                    self.corners[i],
                    self.corners[(i + 1) % 4],
                    self.corners[(i + 2) % 4],
                ) > 0.0
            })
            .collect();
        signs.iter().all(|s| *s) || signs.iter().all(|s| !*s)
    }

    fn extent(&self) -> f64 {
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for [x, y] in self.corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        (max_x - min_x).max(max_y - min_y)
    }
}

impl From<[[f64; 2]; 4]> for CameraQuad {
    fn from(corners: [[f64; 2]; 4]) -> Self {
        Self::new(corners)
    }
}

/// Twice the signed area of triangle `abc`.
fn cross(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// Projective transform from camera pixels to layout-normalized coordinates.
///
/// Immutable after construction; safe to share between threads.
#[derive(Debug, Clone, PartialEq)]
pub struct HomographyMapper {
    matrix: Matrix3<f64>,
    quad: CameraQuad,
    aspect_ratio: f64,
}

impl HomographyMapper {
    /// Builds the mapper for `layout` as seen through `quad`.
    ///
    /// # Errors
    ///
    /// Returns a [`GeometryError`] if the quad is degenerate.
    pub fn new(layout: &KeyboardLayout, quad: CameraQuad) -> Result<Self, GeometryError> {
        quad.validate()?;
        if !quad.is_convex() {
            warn!(
                corners = ?quad.corners(),
                "camera quadrilateral is not convex; corners may be out of TL, TR, BR, BL order"
            );
        }

        let target = layout.normalized_corners();
        let matrix = solve_four_point(&quad, &target)?;
        debug!(?matrix, "camera-to-layout homography computed");

        Ok(Self {
            matrix,
            quad,
            aspect_ratio: layout.aspect_ratio(),
        })
    }

    /// Maps a camera-pixel point to layout-normalized coordinates.
    ///
    /// Points on the camera's vanishing line map to non-finite coordinates, which
    /// never fall inside a key.
    pub fn transform(&self, px: f64, py: f64) -> (f64, f64) {
        let p = self.matrix * Vector3::new(px, py, 1.0);
        if p[2].abs() < PROJECTIVE_EPSILON {
            return (f64::NAN, f64::NAN);
        }
        (p[0] / p[2], p[1] / p[2])
    }

    /// Returns the 3×3 matrix, normalized so that `h33 = 1` whenever possible.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Returns the camera quadrilateral the mapper was built from.
    pub fn quad(&self) -> &CameraQuad {
        &self.quad
    }

    /// Returns the normalized frame height `h` used as the target aspect ratio.
    pub fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }
}

/// Conditioning transform for the source points: centroid to origin, mean
/// distance `sqrt(2)`.
fn conditioning(quad: &CameraQuad) -> Matrix3<f64> {
    let [cx, cy] = quad.centroid();
    let mean_dist = quad
        .corners()
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / 4.0;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Solves `dst ≃ H · src` exactly for four correspondences.
fn solve_four_point(quad: &CameraQuad, dst: &[[f64; 2]; 4]) -> Result<Matrix3<f64>, GeometryError> {
    let t = conditioning(quad);
    let src = quad.corners();
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for i in 0..4 {
        let p = t * Vector3::new(src[i][0], src[i][1], 1.0);
        let (x, y) = (p[0], p[1]);
        let (u, v) = (dst[i][0], dst[i][1]);

        // Row 2i:   [x y 1 0 0 0 -u·x -u·y] · h = u
        a[(2 * i, 0)] = x;
        a[(2 * i, 1)] = y;
        a[(2 * i, 2)] = 1.0;
        a[(2 * i, 6)] = -u * x;
        a[(2 * i, 7)] = -u * y;
        b[2 * i] = u;

        // Row 2i+1: [0 0 0 x y 1 -v·x -v·y] · h = v
        a[(2 * i + 1, 3)] = x;
        a[(2 * i + 1, 4)] = y;
        a[(2 * i + 1, 5)] = 1.0;
        a[(2 * i + 1, 6)] = -v * x;
        a[(2 * i + 1, 7)] = -v * y;
        b[2 * i + 1] = v;
    }

    let h = a.lu().solve(&b).ok_or(GeometryError::Singular)?;
    if h.iter().any(|c| !c.is_finite()) {
        return Err(GeometryError::Singular);
    }

    #[rustfmt::skip]
    let conditioned = Matrix3::new(
        h[0], h[1], h[2],
        h[3], h[4], h[5],
        h[6], h[7], 1.0,
    );
    let matrix = conditioned * t;

    let scale = matrix[(2, 2)];
    if scale.abs() < PROJECTIVE_EPSILON {
        Ok(matrix)
    } else {
        Ok(matrix / scale)
    }
}
