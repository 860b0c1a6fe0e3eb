//! Smoothing filters applied before binary descriptor sampling.

mod box_blur;
pub use box_blur::*;
