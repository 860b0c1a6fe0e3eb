#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use vidpano_image as image;

#[doc(inline)]
pub use vidpano_imgproc as imgproc;

#[doc(inline)]
pub use vidpano_geometry as geometry;

#[doc(inline)]
pub use vidpano_io as io;

#[doc(inline)]
pub use vidpano_stitch as stitch;
