//! Geometric image transformations.
//!
//! Perspective warps are how the compositor projects every key frame onto
//! the shared panorama canvas.

mod perspective;

pub use perspective::{inverse_perspective_matrix, transform_point, warp_perspective};
