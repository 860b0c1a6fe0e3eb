use std::path::Path;

use vidpano_image::{Image, ImageSize};

use crate::{error::IoError, jpeg, png};

/// Reads an RGB8 image from the given file path.
///
/// The method tries to read from any image format supported by the image
/// crate and converts the pixels to 8-bit RGB.
///
/// # Arguments
///
/// * `file_path` - The path to a valid image file.
///
/// # Returns
///
/// An image containing the image data.
pub fn read_image_any_rgb8(file_path: impl AsRef<Path>) -> Result<Image<u8, 3>, IoError> {
    // resolve the file path correctly
    let file_path = file_path.as_ref().to_owned();

    // verify the file exists
    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path.to_path_buf()));
    }

    let img = image::ImageReader::open(&file_path)?
        .with_guessed_format()?
        .decode()?
        .into_rgb8();

    let size = ImageSize {
        width: img.width() as usize,
        height: img.height() as usize,
    };

    Ok(Image::new(size, img.into_raw())?)
}

/// Writes an RGB8 image, choosing the encoder from the file extension.
///
/// `.jpg` and `.jpeg` are encoded with the given `jpeg_quality`, `.png` is
/// lossless. Any other extension is rejected.
///
/// # Arguments
///
/// * `file_path` - The destination path.
/// * `image` - The image to encode.
/// * `jpeg_quality` - The JPEG quality in `[1, 100]`.
pub fn write_image_rgb8(
    file_path: impl AsRef<Path>,
    image: &Image<u8, 3>,
    jpeg_quality: u8,
) -> Result<(), IoError> {
    let file_path = file_path.as_ref();
    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => jpeg::write_image_jpeg_rgb8(file_path, image, jpeg_quality),
        Some("png") => png::write_image_png_rgb8(file_path, image),
        _ => Err(IoError::InvalidFileExtension(file_path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_any_png() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("panorama.PNG");

        let image = Image::<u8, 3>::new([2, 1].into(), vec![1, 2, 3, 4, 5, 6])?;
        write_image_rgb8(&file_path, &image, 95)?;

        let image_back = read_image_any_rgb8(&file_path)?;
        assert_eq!(image_back, image);
        Ok(())
    }

    #[test]
    fn write_unknown_extension() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("panorama.gif");

        let image = Image::<u8, 3>::from_size_val([2, 2].into(), 0)?;
        let res = write_image_rgb8(&file_path, &image, 95);
        assert!(matches!(res, Err(IoError::InvalidFileExtension(_))));
        assert!(!file_path.exists());
        Ok(())
    }

    #[test]
    fn read_missing_file() {
        let res = read_image_any_rgb8("missing.jpg");
        assert!(matches!(res, Err(IoError::FileDoesNotExist(_))));
    }
}
