#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Homography solvers from point correspondences.
pub mod homography;

/// Linear algebra utilities for 3x3 matrices.
pub mod linalg;

/// Robust model estimation.
pub mod ransac;

pub use homography::GeometryError;
