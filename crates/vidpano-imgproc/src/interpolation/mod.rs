//! Pixel interpolation kernels used by the geometric warps.

mod bilinear;
pub(crate) use bilinear::bilinear_interpolation;

/// Interpolation mode for the warp operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterpolationMode {
    /// Bilinear interpolation
    Bilinear,
    /// Nearest neighbor interpolation
    Nearest,
}

/// Kernel for interpolating a pixel value
///
/// # Arguments
///
/// * `image` - The input image container with shape (height, width, C).
/// * `u` - The x coordinate of the pixel to interpolate.
/// * `v` - The y coordinate of the pixel to interpolate.
/// * `interpolation` - The interpolation mode to use.
///
/// # Returns
///
/// The interpolated pixel values.
pub fn interpolate_pixel<const C: usize>(
    image: &vidpano_image::Image<f32, C>,
    u: f32,
    v: f32,
    interpolation: InterpolationMode,
) -> [f32; C] {
    match interpolation {
        InterpolationMode::Bilinear => bilinear_interpolation(image, u, v),
        InterpolationMode::Nearest => {
            let iu = (u.round() as usize).min(image.cols() - 1);
            let iv = (v.round() as usize).min(image.rows() - 1);
            let mut pixel = [0.0; C];
            pixel.copy_from_slice(image.pixel(iv, iu));
            pixel
        }
    }
}
