#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Pipeline, selector and compositor configuration.
pub mod config;

/// Panorama compositing from ordered key frames.
pub mod compositor;

/// Feature correspondence and homography estimation seams.
pub mod correspondence;

/// Automatic and rectangle cropping of composites.
pub mod cropper;

/// Overlap scoring between consecutive frames.
pub mod overlap;

/// End to end driver: selection, stitching, cropping and saving.
pub mod pipeline;

/// Online key-frame selection.
pub mod selector;
