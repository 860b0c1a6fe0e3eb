use crate::error::IoError;
use jpeg_encoder::{ColorType, Encoder};
use std::path::Path;
use vidpano_image::Image;

/// Writes the given JPEG _(rgb8)_ data to the given file path.
///
/// # Arguments
///
/// - `file_path` - The path to the JPEG image.
/// - `image` - The image containing the JPEG image data
/// - `quality` - The quality of the JPEG encoding, range from 0 (lowest) to 100 (highest)
pub fn write_image_jpeg_rgb8(
    file_path: impl AsRef<Path>,
    image: &Image<u8, 3>,
    quality: u8,
) -> Result<(), IoError> {
    write_image_jpeg_imp(file_path, image, ColorType::Rgb, quality)
}

fn write_image_jpeg_imp(
    file_path: impl AsRef<Path>,
    image: &Image<u8, 3>,
    color_type: ColorType,
    quality: u8,
) -> Result<(), IoError> {
    let image_size = image.size();
    let (width, height) = match (
        u16::try_from(image_size.width),
        u16::try_from(image_size.height),
    ) {
        (Ok(w), Ok(h)) => (w, h),
        _ => return Err(IoError::ImageTooLarge(image_size.width, image_size.height)),
    };

    let encoder = Encoder::new_file(file_path, quality.clamp(1, 100))?;
    encoder.encode(image.as_slice(), width, height, color_type)?;
    Ok(())
}
