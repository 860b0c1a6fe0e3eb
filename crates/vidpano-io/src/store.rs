use std::path::{Path, PathBuf};

use vidpano_image::Image;

use crate::{error::IoError, jpeg::write_image_jpeg_rgb8};

/// Writes captured key frames into a directory as `frame{N}.jpg`.
///
/// `N` is the capture ordinal, starting at zero.
///
/// # Example
///
/// ```no_run
/// use vidpano_image::Image;
/// use vidpano_io::store::KeyFrameStore;
///
/// let mut store = KeyFrameStore::new("key_frames", 95).unwrap();
/// let frame = Image::<u8, 3>::from_size_val([64, 48].into(), 0).unwrap();
/// let path = store.save(0, &frame).unwrap();
///
/// assert!(path.ends_with("frame0.jpg"));
/// ```
#[derive(Debug)]
pub struct KeyFrameStore {
    dir: PathBuf,
    quality: u8,
}

impl KeyFrameStore {
    /// Create the store, creating `dir` when missing.
    pub fn new(dir: impl AsRef<Path>, quality: u8) -> Result<Self, IoError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, quality })
    }

    /// Path of the key frame with the given ordinal.
    pub fn frame_path(&self, ordinal: usize) -> PathBuf {
        self.dir.join(format!("frame{ordinal}.jpg"))
    }

    /// Encode and write a key frame.
    pub fn save(&mut self, ordinal: usize, image: &Image<u8, 3>) -> Result<PathBuf, IoError> {
        let path = self.frame_path(ordinal);
        write_image_jpeg_rgb8(&path, image, self.quality)?;
        log::debug!("saved key frame {}", path.display());
        Ok(path)
    }

    /// The directory holding the key frames.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete the directory and everything in it.
    pub fn remove(self) -> Result<(), IoError> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_writes_numbered_frames() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let dir = tmp_dir.path().join("key_frames");

        let mut store = KeyFrameStore::new(&dir, 90)?;
        let frame = Image::<u8, 3>::from_size_val([16, 8].into(), 100)?;
        let first = store.save(0, &frame)?;
        store.save(1, &frame)?;

        assert_eq!(first, dir.join("frame0.jpg"));
        assert!(first.exists());
        assert!(dir.join("frame1.jpg").exists());

        store.remove()?;
        assert!(!dir.exists());
        Ok(())
    }
}
