use vidpano_image::{Image, ImageError, ImageSize};
use vidpano_imgproc::{color::gray_from_rgb_u8_new, crop::crop_image, threshold::threshold_binary};

/// An axis aligned box with inclusive edges in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    /// First row.
    pub top: usize,
    /// Last row.
    pub bottom: usize,
    /// First column.
    pub left: usize,
    /// Last column.
    pub right: usize,
}

impl BoundingBox {
    /// Whether the box collapses to a line or a point.
    pub fn is_degenerate(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// Number of columns covered, `right - left + 1`.
    pub fn width(&self) -> usize {
        self.right.saturating_sub(self.left) + 1
    }

    /// Number of rows covered, `bottom - top + 1`.
    pub fn height(&self) -> usize {
        self.bottom.saturating_sub(self.top) + 1
    }

    /// Box from two opposite corners of a half-open region `[x1, x2) x [y1, y2)`.
    ///
    /// Corners may be given in any order and are clamped to the image. Returns
    /// `None` when the clamped region is empty.
    ///
    /// # Example
    ///
    /// ```
    /// use vidpano_image::ImageSize;
    /// use vidpano_stitch::cropper::BoundingBox;
    ///
    /// let size = ImageSize { width: 100, height: 50 };
    /// let bbox = BoundingBox::from_corners(120, 40, 10, -5, size).unwrap();
    ///
    /// assert_eq!((bbox.left, bbox.right, bbox.top, bbox.bottom), (10, 99, 0, 39));
    /// ```
    pub fn from_corners(x1: i64, y1: i64, x2: i64, y2: i64, size: ImageSize) -> Option<Self> {
        let clamp_x = |x: i64| x.clamp(0, size.width as i64);
        let clamp_y = |y: i64| y.clamp(0, size.height as i64);

        let (x1, x2) = (clamp_x(x1), clamp_x(x2));
        let (y1, y2) = (clamp_y(y1), clamp_y(y2));
        let (left, right) = (x1.min(x2), x1.max(x2));
        let (top, bottom) = (y1.min(y2), y1.max(y2));

        if left == right || top == bottom {
            return None;
        }

        Some(Self {
            top: top as usize,
            bottom: bottom as usize - 1,
            left: left as usize,
            right: right as usize - 1,
        })
    }
}

/// Find the box spanned by the non-zero pixels of a binary map.
///
/// Each edge is scanned independently: the first row from the top with any
/// content, the first from the bottom, and likewise for columns. An edge with
/// no content keeps the image boundary.
pub fn content_bounding_box(binary: &Image<u8, 1>) -> BoundingBox {
    let (cols, rows) = (binary.cols(), binary.rows());
    let data = binary.as_slice();

    let row_has_content = |r: usize| data[r * cols..(r + 1) * cols].iter().any(|&v| v > 0);
    let col_has_content = |c: usize| (0..rows).any(|r| data[r * cols + c] > 0);

    let top = (0..rows).find(|&r| row_has_content(r)).unwrap_or(0);
    let bottom = (0..rows)
        .rev()
        .find(|&r| row_has_content(r))
        .unwrap_or(rows.saturating_sub(1));
    let left = (0..cols).find(|&c| col_has_content(c)).unwrap_or(0);
    let right = (0..cols)
        .rev()
        .find(|&c| col_has_content(c))
        .unwrap_or(cols.saturating_sub(1));

    BoundingBox {
        top,
        bottom,
        left,
        right,
    }
}

/// Cut the region covered by `bbox` out of `image`.
pub fn crop_to_box<const C: usize>(
    image: &Image<u8, C>,
    bbox: &BoundingBox,
) -> Result<Image<u8, C>, ImageError> {
    let mut dst = Image::from_size_val(
        ImageSize {
            width: bbox.width(),
            height: bbox.height(),
        },
        0u8,
    )?;
    crop_image(image, &mut dst, bbox.left, bbox.top)?;
    Ok(dst)
}

/// Remove the unmapped black background around a composite.
///
/// Pixels whose gray level is above zero are content. When the content box
/// is degenerate, including an all-black composite, the input is returned
/// unchanged.
///
/// # Example
///
/// ```
/// use vidpano_image::{Image, ImageSize};
/// use vidpano_stitch::cropper::crop_borders;
///
/// let mut data = vec![0u8; 4 * 4 * 3];
/// for (row, col) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
///     data[(row * 4 + col) * 3..(row * 4 + col) * 3 + 3].copy_from_slice(&[200, 200, 200]);
/// }
/// let composite = Image::<u8, 3>::new(ImageSize { width: 4, height: 4 }, data).unwrap();
///
/// let cropped = crop_borders(&composite).unwrap();
/// assert_eq!(cropped.size(), ImageSize { width: 2, height: 2 });
/// ```
pub fn crop_borders(composite: &Image<u8, 3>) -> Result<Image<u8, 3>, ImageError> {
    let gray = gray_from_rgb_u8_new(composite)?;
    let mut binary = Image::from_size_val(gray.size(), 0u8)?;
    threshold_binary(&gray, &mut binary, 0, 255)?;

    let bbox = content_bounding_box(&binary);
    if bbox.is_degenerate() {
        log::warn!(
            "invalid crop region {:?}, keeping the composite at {}",
            bbox,
            composite.size()
        );
        return Ok(composite.clone());
    }

    let cropped = crop_to_box(composite, &bbox)?;
    log::info!(
        "cropped {}x{} to {}x{} (left={}, right={}, top={}, bottom={})",
        composite.width(),
        composite.height(),
        cropped.width(),
        cropped.height(),
        bbox.left,
        bbox.right,
        bbox.top,
        bbox.bottom
    );

    Ok(cropped)
}
