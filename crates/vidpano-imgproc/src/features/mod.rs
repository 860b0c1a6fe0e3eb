//! Feature detection, description and matching.
//!
//! This module provides the binary feature pipeline used to score the overlap
//! between video frames and to register key frames against each other:
//!
//! - **FAST**: Features from Accelerated Segment Test corner detection
//! - **Steered BRIEF**: 256-bit descriptors rotated by the keypoint orientation
//! - **Hamming k-NN**: brute-force nearest neighbour matching with a ratio test

mod fast;
pub use fast::*;

mod orb;
pub use orb::*;

mod matching;
pub use matching::*;

/// A detected keypoint in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    /// Column of the keypoint.
    pub x: f32,
    /// Row of the keypoint.
    pub y: f32,
    /// Detector response, higher is stronger.
    pub response: f32,
    /// Orientation in radians.
    pub angle: f32,
}

/// A packed 256-bit binary descriptor.
pub type BinaryDescriptor = [u8; 32];
