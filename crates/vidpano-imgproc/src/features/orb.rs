use std::sync::OnceLock;

use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use vidpano_image::{Image, ImageError};

use super::{fast_feature_detector, BinaryDescriptor, Keypoint};
use crate::filter::box_blur_u8;

/// Radius of the patch used to compute the keypoint orientation.
const ORIENTATION_RADIUS: isize = 15;

/// Half size of the square where the test pairs are sampled.
const PATTERN_HALF_SIZE: i32 = 13;

/// Keypoints closer than this to the image border are discarded.
///
/// Large enough to contain both the orientation patch and the rotated pattern.
const EDGE_THRESHOLD: usize = 19;

const PATTERN_SEED: u64 = 0x5eed_0b1e;

/// Parameters of the oriented FAST / steered BRIEF extractor.
#[derive(Clone, Debug)]
pub struct OrbConfig {
    /// Maximum number of keypoints retained, strongest first.
    pub max_features: usize,
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    /// FAST contiguous arc length.
    pub fast_arc_length: u8,
    /// Kernel size of the box blur applied before sampling the descriptor.
    pub blur_kernel_size: usize,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            max_features: 2000,
            fast_threshold: 20,
            fast_arc_length: 9,
            blur_kernel_size: 5,
        }
    }
}

/// Keypoints and their descriptors, index aligned.
#[derive(Clone, Debug, Default)]
pub struct OrbFeatures {
    /// The oriented keypoints.
    pub keypoints: Vec<Keypoint>,
    /// One descriptor per keypoint.
    pub descriptors: Vec<BinaryDescriptor>,
}

impl OrbFeatures {
    /// Number of features.
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    /// Whether no feature was found.
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Oriented FAST keypoint detector with steered BRIEF descriptors.
///
/// # Example
///
/// ```
/// use vidpano_image::{Image, ImageSize};
/// use vidpano_imgproc::features::OrbExtractor;
///
/// let image = Image::<u8, 1>::from_size_val(ImageSize { width: 64, height: 64 }, 0).unwrap();
/// let features = OrbExtractor::default().detect_and_describe(&image).unwrap();
///
/// assert!(features.is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct OrbExtractor {
    config: OrbConfig,
}

impl OrbExtractor {
    /// Create a new extractor.
    pub fn new(config: OrbConfig) -> Self {
        Self { config }
    }

    /// The extractor configuration.
    pub fn config(&self) -> &OrbConfig {
        &self.config
    }

    /// Detect keypoints and compute their descriptors.
    ///
    /// Images too small to contain a full descriptor patch yield no features.
    pub fn detect_and_describe(&self, src: &Image<u8, 1>) -> Result<OrbFeatures, ImageError> {
        let (cols, rows) = (src.cols(), src.rows());
        if cols <= 2 * EDGE_THRESHOLD || rows <= 2 * EDGE_THRESHOLD {
            return Ok(OrbFeatures::default());
        }

        let mut keypoints = fast_feature_detector(
            src,
            self.config.fast_threshold,
            self.config.fast_arc_length,
        )?;

        keypoints.retain(|kp| {
            let (x, y) = (kp.x as usize, kp.y as usize);
            x >= EDGE_THRESHOLD
                && y >= EDGE_THRESHOLD
                && x < cols - EDGE_THRESHOLD
                && y < rows - EDGE_THRESHOLD
        });

        // strongest first, position breaks ties so the order is deterministic
        keypoints.sort_by(|a, b| {
            b.response
                .total_cmp(&a.response)
                .then(a.y.total_cmp(&b.y))
                .then(a.x.total_cmp(&b.x))
        });
        keypoints.truncate(self.config.max_features);

        keypoints
            .par_iter_mut()
            .for_each(|kp| kp.angle = intensity_centroid_angle(src, kp.x as usize, kp.y as usize));

        let mut smoothed = Image::from_size_val(src.size(), 0u8)?;
        box_blur_u8(src, &mut smoothed, self.config.blur_kernel_size)?;

        let descriptors = keypoints
            .par_iter()
            .map(|kp| steered_brief(&smoothed, kp))
            .collect();

        log::trace!("orb: {} features in {}", keypoints.len(), src.size());

        Ok(OrbFeatures {
            keypoints,
            descriptors,
        })
    }
}

/// Orientation of the patch around `(x, y)` from its intensity centroid.
fn intensity_centroid_angle(src: &Image<u8, 1>, x: usize, y: usize) -> f32 {
    let cols = src.cols() as isize;
    let data = src.as_slice();
    let center = (y * src.cols() + x) as isize;

    let mut m01 = 0i64;
    let mut m10 = 0i64;
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        let max_dx = ((ORIENTATION_RADIUS * ORIENTATION_RADIUS - dy * dy) as f32).sqrt() as isize;
        let row = center + dy * cols;
        for dx in -max_dx..=max_dx {
            let v = data[(row + dx) as usize] as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }

    (m01 as f32).atan2(m10 as f32)
}

/// The 256 test pairs `[x1, y1, x2, y2]` shared by every descriptor.
fn brief_pattern() -> &'static [[i8; 4]; 256] {
    static PATTERN: OnceLock<[[i8; 4]; 256]> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let mut pattern = [[0i8; 4]; 256];
        for pair in pattern.iter_mut() {
            for v in pair.iter_mut() {
                *v = rng.random_range(-PATTERN_HALF_SIZE..=PATTERN_HALF_SIZE) as i8;
            }
        }
        pattern
    })
}

fn steered_brief(smoothed: &Image<u8, 1>, kp: &Keypoint) -> BinaryDescriptor {
    let (sin, cos) = kp.angle.sin_cos();
    let cols = smoothed.cols() as isize;
    let data = smoothed.as_slice();
    let center = (kp.y as isize) * cols + kp.x as isize;

    let sample = |px: i8, py: i8| {
        let (px, py) = (px as f32, py as f32);
        let rx = (cos * px - sin * py).round() as isize;
        let ry = (sin * px + cos * py).round() as isize;
        data[(center + ry * cols + rx) as usize]
    };

    let mut descriptor = [0u8; 32];
    for (i, [x1, y1, x2, y2]) in brief_pattern().iter().enumerate() {
        if sample(*x1, *y1) < sample(*x2, *y2) {
            descriptor[i / 8] |= 1 << (i % 8);
        }
    }
    descriptor
}
