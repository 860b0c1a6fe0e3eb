//! Frame sources.
//!
//! A [`FrameSource`] yields decoded RGB8 frames in stream order until it is
//! exhausted. Sources are pulled one frame at a time so that only the frames a
//! consumer decides to keep stay in memory.

use std::path::{Path, PathBuf};

use vidpano_image::Image;

use crate::{error::IoError, functional::read_image_any_rgb8};

#[cfg(feature = "gstreamer")]
mod video;
#[cfg(feature = "gstreamer")]
pub use video::VideoReader;

/// A sequential source of RGB8 frames.
pub trait FrameSource {
    /// Read the next frame.
    ///
    /// Returns `Ok(None)` once the stream is exhausted.
    fn read(&mut self) -> Result<Option<Image<u8, 3>>, IoError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> Result<Option<Image<u8, 3>>, IoError> {
        (**self).read()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn read(&mut self) -> Result<Option<Image<u8, 3>>, IoError> {
        (**self).read()
    }
}

/// File extensions recognised as still images.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Reads the images of a directory as consecutive frames.
///
/// Files are ordered by file name; entries without an image extension are
/// skipped.
///
/// # Example
///
/// ```no_run
/// use vidpano_io::stream::{FrameSource, ImageSequenceReader};
///
/// let mut reader = ImageSequenceReader::new("frames/").unwrap();
/// while let Some(frame) = reader.read().unwrap() {
///     println!("{}", frame.size());
/// }
/// ```
pub struct ImageSequenceReader {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageSequenceReader {
    /// Create a reader over the images found in `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, IoError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(IoError::FileDoesNotExist(dir.to_path_buf()));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        log::debug!("found {} images in {}", paths.len(), dir.display());

        Ok(Self { paths, next: 0 })
    }

    /// Total number of frames in the sequence.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the directory holds no image.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// The ordered image paths.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl FrameSource for ImageSequenceReader {
    fn read(&mut self) -> Result<Option<Image<u8, 3>>, IoError> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        let image = read_image_any_rgb8(path)?;
        self.next += 1;
        Ok(Some(image))
    }
}

/// Adapts an iterator of in-memory frames into a [`FrameSource`].
///
/// # Example
///
/// ```
/// use vidpano_image::Image;
/// use vidpano_io::stream::{FrameSource, IterFrameSource};
///
/// let frames = vec![Image::<u8, 3>::from_size_val([4, 4].into(), 0).unwrap()];
/// let mut source = IterFrameSource::new(frames);
///
/// assert!(source.read().unwrap().is_some());
/// assert!(source.read().unwrap().is_none());
/// ```
pub struct IterFrameSource<I> {
    frames: I,
}

impl<I: Iterator<Item = Image<u8, 3>>> IterFrameSource<I> {
    /// Create a new source from anything iterable.
    pub fn new(frames: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl<I: Iterator<Item = Image<u8, 3>>> FrameSource for IterFrameSource<I> {
    fn read(&mut self) -> Result<Option<Image<u8, 3>>, IoError> {
        Ok(self.frames.next())
    }
}

/// Open a frame source for `path`.
///
/// Directories are read as image sequences. Other files are decoded as video
/// when the `gstreamer` feature is enabled.
pub fn open_frame_source(
    path: impl AsRef<Path>,
) -> Result<Box<dyn FrameSource + Send>, IoError> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(Box::new(ImageSequenceReader::new(path)?));
    }
    if !path.exists() {
        return Err(IoError::FileDoesNotExist(path.to_path_buf()));
    }

    #[cfg(feature = "gstreamer")]
    {
        Ok(Box::new(VideoReader::new(path)?))
    }

    #[cfg(not(feature = "gstreamer"))]
    {
        log::error!("video input requires the `gstreamer` feature");
        Err(IoError::UnsupportedSource(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::png::write_image_png_rgb8;

    #[test]
    fn image_sequence_sorted_by_name() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        for (name, value) in [("b.png", 2u8), ("a.png", 1), ("c.png", 3)] {
            let image = Image::<u8, 3>::from_size_val([3, 2].into(), value)?;
            write_image_png_rgb8(tmp_dir.path().join(name), &image)?;
        }
        std::fs::write(tmp_dir.path().join("notes.txt"), "not a frame")?;

        let mut reader = ImageSequenceReader::new(tmp_dir.path())?;
        assert_eq!(reader.len(), 3);

        let mut values = Vec::new();
        while let Some(frame) = reader.read()? {
            values.push(frame.as_slice()[0]);
        }
        assert_eq!(values, vec![1, 2, 3]);
        assert!(reader.read()?.is_none());

        Ok(())
    }

    #[test]
    fn image_sequence_missing_dir() {
        let res = ImageSequenceReader::new("does/not/exist");
        assert!(matches!(res, Err(IoError::FileDoesNotExist(_))));
    }

    #[test]
    fn open_directory_source() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let image = Image::<u8, 3>::from_size_val([3, 2].into(), 7)?;
        write_image_png_rgb8(tmp_dir.path().join("0001.png"), &image)?;

        let mut source = open_frame_source(tmp_dir.path())?;
        assert_eq!(source.read()?, Some(image));
        assert_eq!(source.read()?, None);
        Ok(())
    }

    #[test]
    fn boxed_source() -> Result<(), IoError> {
        let frames = vec![Image::<u8, 3>::from_size_val([1, 1].into(), 0)?; 3];
        let mut source: Box<dyn FrameSource> = Box::new(IterFrameSource::new(frames));

        let mut count = 0;
        while source.read()?.is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
        Ok(())
    }
}
