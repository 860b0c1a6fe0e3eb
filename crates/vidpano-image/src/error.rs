/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when channel and shape are not valid.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when two images are expected to have the same size.
    #[error("Image size mismatch: ({0}, {1}) vs ({2}, {3})")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when a region does not fit inside the image.
    #[error("Region (x: {0}, y: {1}, width: {2}, height: {3}) is out of bounds")]
    RegionOutOfBounds(usize, usize, usize, usize),

    /// Error when the determinant of a transform matrix is zero.
    #[error("Cannot compute the determinant of the matrix")]
    CannotComputeDeterminant,
}
