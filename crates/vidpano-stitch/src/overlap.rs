use vidpano_image::{Image, ImageError, ImageSize};
use vidpano_imgproc::{crop::crop_image, features::ratio_test};

use crate::{
    config::SelectorConfig,
    correspondence::{
        matched_points, CorrespondenceService, HomographyEstimator, OrbCorrespondence,
        RansacHomographyEstimator,
    },
};

/// Minimum correspondences needed to fit a homography.
pub const MIN_HOMOGRAPHY_CORRESPONDENCES: usize = 4;

/// A soft failure while comparing two frames.
///
/// The selector treats it as "no capture" for that frame.
#[derive(thiserror::Error, Debug)]
pub enum OverlapError {
    /// One of the regions produced no descriptors.
    #[error("No descriptors found in the {0} region")]
    NoDescriptors(Region),

    /// Image manipulation failed.
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Which of the compared strips.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    /// Trailing strip of the last captured frame.
    Last,
    /// Leading strip of the candidate frame.
    Current,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Region::Last => write!(f, "last captured"),
            Region::Current => write!(f, "current"),
        }
    }
}

/// Scores how well the candidate frame continues the last captured one.
pub trait OverlapScorer {
    /// Number of geometrically consistent correspondences between both frames.
    fn score(&self, last: &Image<u8, 3>, current: &Image<u8, 3>) -> Result<usize, OverlapError>;
}

/// Width of an overlap strip: `floor(width * fraction)`, at least one column.
///
/// # Example
///
/// ```
/// use vidpano_stitch::overlap::overlap_strip_width;
///
/// assert_eq!(overlap_strip_width(640, 2.0 / 3.0), 426);
/// assert_eq!(overlap_strip_width(1, 0.5), 1);
/// ```
pub fn overlap_strip_width(width: usize, fraction: f64) -> usize {
    ((width as f64 * fraction).floor() as usize).clamp(1, width.max(1))
}

fn strip(image: &Image<u8, 3>, fraction: f64, trailing: bool) -> Result<Image<u8, 3>, ImageError> {
    let width = overlap_strip_width(image.width(), fraction).min(image.width());
    let x = if trailing { image.width() - width } else { 0 };
    let mut dst = Image::from_size_val(
        ImageSize {
            width,
            height: image.height(),
        },
        0u8,
    )?;
    crop_image(image, &mut dst, x, 0)?;
    Ok(dst)
}

/// The right-most `fraction` of the frame, full height.
pub fn trailing_strip(image: &Image<u8, 3>, fraction: f64) -> Result<Image<u8, 3>, ImageError> {
    strip(image, fraction, true)
}

/// The left-most `fraction` of the frame, full height.
pub fn leading_strip(image: &Image<u8, 3>, fraction: f64) -> Result<Image<u8, 3>, ImageError> {
    strip(image, fraction, false)
}

/// Counts gathered while comparing two overlap strips.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverlapStats {
    /// Query descriptors with at least one candidate match.
    pub correspondences: usize,
    /// Correspondences accepted by the ratio test.
    pub accepted: usize,
    /// Accepted correspondences consistent with the fitted homography.
    pub inliers: usize,
}

/// Scores overlap with local features, a ratio test and a robust homography fit.
///
/// The trailing strip of the last captured frame is matched against the
/// leading strip of the candidate. Fewer than four accepted correspondences
/// score zero.
pub struct FeatureOverlapScorer<S = OrbCorrespondence, H = RansacHomographyEstimator> {
    service: S,
    estimator: H,
    overlap_width_fraction: f64,
    match_ratio_threshold: f32,
    reprojection_tolerance: f64,
}

impl FeatureOverlapScorer {
    /// A scorer with the ORB service and the RANSAC estimator.
    pub fn with_defaults(config: &SelectorConfig) -> Self {
        Self::new(
            OrbCorrespondence::default(),
            RansacHomographyEstimator::default(),
            config,
        )
    }
}

impl<S: CorrespondenceService, H: HomographyEstimator> FeatureOverlapScorer<S, H> {
    /// Create a scorer from its collaborators and the selector parameters.
    pub fn new(service: S, estimator: H, config: &SelectorConfig) -> Self {
        Self {
            service,
            estimator,
            overlap_width_fraction: config.overlap_width_fraction,
            match_ratio_threshold: config.match_ratio_threshold,
            reprojection_tolerance: config.ransac_reprojection_tolerance,
        }
    }

    /// Compare the overlap strips of two frames and report every count.
    pub fn compare(
        &self,
        last: &Image<u8, 3>,
        current: &Image<u8, 3>,
    ) -> Result<OverlapStats, OverlapError> {
        let last_strip = trailing_strip(last, self.overlap_width_fraction)?;
        let current_strip = leading_strip(current, self.overlap_width_fraction)?;

        let last_features = self.service.detect_and_describe(&last_strip)?;
        if last_features.descriptors.is_empty() {
            return Err(OverlapError::NoDescriptors(Region::Last));
        }
        let current_features = self.service.detect_and_describe(&current_strip)?;
        if current_features.descriptors.is_empty() {
            return Err(OverlapError::NoDescriptors(Region::Current));
        }

        let knn = self.service.knn_match(
            &last_features.descriptors,
            &current_features.descriptors,
            2,
        );
        let correspondences = knn.iter().filter(|m| !m.is_empty()).count();
        let accepted = ratio_test(&knn, self.match_ratio_threshold);

        let mut stats = OverlapStats {
            correspondences,
            accepted: accepted.len(),
            inliers: 0,
        };
        if accepted.len() < MIN_HOMOGRAPHY_CORRESPONDENCES {
            return Ok(stats);
        }

        let (points_last, points_current) =
            matched_points(&last_features, &current_features, &accepted);
        if let Some(fit) =
            self.estimator
                .estimate(&points_last, &points_current, self.reprojection_tolerance)
        {
            stats.inliers = fit.inlier_count();
        }

        Ok(stats)
    }
}

impl<S: CorrespondenceService, H: HomographyEstimator> OverlapScorer
    for FeatureOverlapScorer<S, H>
{
    fn score(&self, last: &Image<u8, 3>, current: &Image<u8, 3>) -> Result<usize, OverlapError> {
        let stats = self.compare(last, current)?;
        log::debug!(
            "overlap: {} correspondences, {} accepted, {} inliers",
            stats.correspondences,
            stats.accepted,
            stats.inliers
        );
        Ok(stats.inliers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::KeyFrameSelector;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use vidpano_io::stream::IterFrameSource;

    fn textured_frame(size: ImageSize, seed: u64) -> Result<Image<u8, 3>, ImageError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let block = 4;
        let bw = size.width.div_ceil(block);
        let bh = size.height.div_ceil(block);
        let blocks: Vec<[u8; 3]> = (0..bw * bh).map(|_| rng.random()).collect();
        let data = (0..size.height)
            .flat_map(|y| (0..size.width).map(move |x| (x, y)))
            .flat_map(|(x, y)| blocks[(y / block) * bw + x / block])
            .collect();
        Image::new(size, data)
    }

    /// A `width` wide window of `scene` starting at column `start`.
    fn view(
        scene: &Image<u8, 3>,
        start: usize,
        width: usize,
    ) -> Result<Image<u8, 3>, ImageError> {
        let mut dst = Image::from_size_val(
            ImageSize {
                width,
                height: scene.height(),
            },
            0,
        )?;
        crop_image(scene, &mut dst, start, 0)?;
        Ok(dst)
    }

    #[test]
    fn strip_widths() -> Result<(), ImageError> {
        let image = Image::<u8, 3>::new([3, 1].into(), vec![1, 1, 1, 2, 2, 2, 3, 3, 3])?;

        let trailing = trailing_strip(&image, 2.0 / 3.0)?;
        assert_eq!(trailing.as_slice(), &[2, 2, 2, 3, 3, 3]);

        let leading = leading_strip(&image, 0.1)?;
        assert_eq!(leading.as_slice(), &[1, 1, 1]);

        let full = leading_strip(&image, 1.0)?;
        assert_eq!(full, image);
        Ok(())
    }

    #[test]
    fn identical_regions_all_accepted_are_inliers() -> Result<(), OverlapError> {
        let config = SelectorConfig {
            overlap_width_fraction: 1.0,
            ..Default::default()
        };
        let scorer = FeatureOverlapScorer::with_defaults(&config);
        let frame = textured_frame([160, 120].into(), 5)?;

        let stats = scorer.compare(&frame, &frame)?;
        assert!(stats.accepted >= MIN_HOMOGRAPHY_CORRESPONDENCES);
        assert_eq!(stats.inliers, stats.accepted);
        assert!(stats.accepted <= stats.correspondences);
        Ok(())
    }

    #[test]
    fn flat_region_has_no_descriptors() -> Result<(), ImageError> {
        let scorer = FeatureOverlapScorer::with_defaults(&SelectorConfig::default());
        let flat = Image::<u8, 3>::from_size_val([120, 90].into(), 30)?;

        let res = scorer.score(&flat, &flat);
        assert!(matches!(
            res,
            Err(OverlapError::NoDescriptors(Region::Last))
        ));
        Ok(())
    }

    #[test]
    fn selector_captures_panning_views_by_features() -> Result<(), Box<dyn std::error::Error>> {
        let _ = env_logger::builder().is_test(true).try_init();

        let scene = textured_frame([520, 240].into(), 21)?;
        let unrelated = textured_frame([320, 240].into(), 99)?;
        let frames = vec![
            view(&scene, 0, 320)?,
            view(&scene, 100, 320)?,
            unrelated,
            view(&scene, 200, 320)?,
        ];

        let config = SelectorConfig {
            step_interval: 1,
            min_match_count: 30,
            max_match_count: 100_000,
            force_capture_interval: 1000,
            ..Default::default()
        };
        let selector =
            KeyFrameSelector::new(config.clone(), FeatureOverlapScorer::with_defaults(&config))?;

        let verdict = selector.evaluate(1, &frames[0], &frames[1]);
        assert!(verdict.capture);
        assert!(!verdict.forced);
        assert!(verdict.inliers > config.min_match_count);

        let key_frames = selector.select(&mut IterFrameSource::new(frames), &mut ())?;
        assert_eq!(key_frames.indices(), vec![0, 1, 3]);
        Ok(())
    }
}
