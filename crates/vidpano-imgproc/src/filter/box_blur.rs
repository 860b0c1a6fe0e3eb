use rayon::prelude::*;
use vidpano_image::{Image, ImageError};

/// Blur a grayscale image with a `kernel_size x kernel_size` box filter.
///
/// The filter is separable: a horizontal pass followed by a vertical pass.
/// Borders are handled by replicating the edge pixels.
///
/// # Arguments
///
/// * `src` - The input grayscale image.
/// * `dst` - The output grayscale image, same size as `src`.
/// * `kernel_size` - The size of the kernel, must be odd.
///
/// # Example
///
/// ```
/// use vidpano_image::{Image, ImageSize};
/// use vidpano_imgproc::filter::box_blur_u8;
///
/// let image = Image::<u8, 1>::new(ImageSize { width: 3, height: 1 }, vec![0, 90, 0]).unwrap();
/// let mut blurred = Image::<u8, 1>::from_size_val(image.size(), 0).unwrap();
///
/// box_blur_u8(&image, &mut blurred, 3).unwrap();
/// assert_eq!(blurred.as_slice(), &[30, 30, 30]);
/// ```
pub fn box_blur_u8(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    kernel_size: usize,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let (cols, rows) = (src.cols(), src.rows());
    if cols == 0 || rows == 0 {
        return Ok(());
    }

    let half = (kernel_size / 2) as isize;
    let norm = (2 * half + 1) as u32;

    // horizontal pass, keep the sums to avoid rounding twice
    let mut tmp = vec![0u32; cols * rows];
    tmp.par_chunks_exact_mut(cols)
        .zip(src.as_slice().par_chunks_exact(cols))
        .for_each(|(tmp_row, src_row)| {
            for (c, out) in tmp_row.iter_mut().enumerate() {
                let mut acc = 0u32;
                for k in -half..=half {
                    let cc = (c as isize + k).clamp(0, cols as isize - 1) as usize;
                    acc += src_row[cc] as u32;
                }
                *out = acc;
            }
        });

    // vertical pass
    let tmp = &tmp;
    dst.as_slice_mut()
        .par_chunks_exact_mut(cols)
        .enumerate()
        .for_each(|(r, dst_row)| {
            for (c, out) in dst_row.iter_mut().enumerate() {
                let mut acc = 0u32;
                for k in -half..=half {
                    let rr = (r as isize + k).clamp(0, rows as isize - 1) as usize;
                    acc += tmp[rr * cols + c];
                }
                *out = ((acc + norm * norm / 2) / (norm * norm)) as u8;
            }
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use vidpano_image::{Image, ImageError, ImageSize};

    #[test]
    fn box_blur_constant() -> Result<(), ImageError> {
        let image = Image::<u8, 1>::from_size_val(
            ImageSize {
                width: 5,
                height: 4,
            },
            42,
        )?;
        let mut blurred = Image::from_size_val(image.size(), 0u8)?;
        super::box_blur_u8(&image, &mut blurred, 5)?;
        assert!(blurred.as_slice().iter().all(|&v| v == 42));
        Ok(())
    }
}
