//! Narrow seams to the feature matching and robust geometry collaborators.
//!
//! The selector and the compositor only talk to [`CorrespondenceService`] and
//! [`HomographyEstimator`]; the ORB and RANSAC implementations below are the
//! defaults and can be swapped for any other detector or solver.

use vidpano_geometry::{
    linalg::Mat33,
    ransac::{ransac_homography, RansacParams},
};
use vidpano_image::{Image, ImageError};
use vidpano_imgproc::{
    color::gray_from_rgb_u8_new,
    features::{
        knn_match_hamming, BinaryDescriptor, DescriptorMatch, OrbConfig, OrbExtractor, OrbFeatures,
    },
};

/// Detects, describes and matches local features.
pub trait CorrespondenceService {
    /// Detect keypoints in an RGB region and compute their descriptors.
    ///
    /// Low texture regions may yield no descriptors; that is not an error.
    fn detect_and_describe(&self, region: &Image<u8, 3>) -> Result<OrbFeatures, ImageError>;

    /// For each query descriptor, the `k` closest train descriptors, best first.
    fn knn_match(
        &self,
        query: &[BinaryDescriptor],
        train: &[BinaryDescriptor],
        k: usize,
    ) -> Vec<Vec<DescriptorMatch>>;
}

/// Oriented FAST and steered BRIEF features matched under the Hamming distance.
#[derive(Clone, Debug, Default)]
pub struct OrbCorrespondence {
    extractor: OrbExtractor,
}

impl OrbCorrespondence {
    /// Create a new service from the extractor parameters.
    pub fn new(config: OrbConfig) -> Self {
        Self {
            extractor: OrbExtractor::new(config),
        }
    }
}

impl CorrespondenceService for OrbCorrespondence {
    fn detect_and_describe(&self, region: &Image<u8, 3>) -> Result<OrbFeatures, ImageError> {
        let gray = gray_from_rgb_u8_new(region)?;
        self.extractor.detect_and_describe(&gray)
    }

    fn knn_match(
        &self,
        query: &[BinaryDescriptor],
        train: &[BinaryDescriptor],
        k: usize,
    ) -> Vec<Vec<DescriptorMatch>> {
        knn_match_hamming(query, train, k)
    }
}

/// A homography together with the correspondences consistent with it.
#[derive(Clone, Debug, PartialEq)]
pub struct HomographyFit {
    /// Row-major matrix mapping the first point set onto the second.
    pub matrix: Mat33,
    /// Per-correspondence inlier mask.
    pub inliers: Vec<bool>,
}

impl HomographyFit {
    /// Number of inlier correspondences.
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&inlier| inlier).count()
    }
}

/// Fits a homography robustly to noisy correspondences.
pub trait HomographyEstimator {
    /// Estimate the homography mapping `points_a` onto `points_b`.
    ///
    /// Returns `None` when the correspondences are insufficient or inconsistent.
    fn estimate(
        &self,
        points_a: &[[f64; 2]],
        points_b: &[[f64; 2]],
        tolerance: f64,
    ) -> Option<HomographyFit>;
}

/// RANSAC over the 4-point solver with a least squares refit.
#[derive(Clone, Debug, Default)]
pub struct RansacHomographyEstimator {
    params: RansacParams,
}

impl RansacHomographyEstimator {
    /// Create a new estimator; the threshold of `params` is replaced by the tolerance of each call.
    pub fn new(params: RansacParams) -> Self {
        Self { params }
    }
}

impl HomographyEstimator for RansacHomographyEstimator {
    fn estimate(
        &self,
        points_a: &[[f64; 2]],
        points_b: &[[f64; 2]],
        tolerance: f64,
    ) -> Option<HomographyFit> {
        let params = RansacParams {
            threshold: tolerance,
            ..self.params
        };
        match ransac_homography(points_a, points_b, &params) {
            Ok(result) => Some(HomographyFit {
                matrix: result.model,
                inliers: result.inliers,
            }),
            Err(err) => {
                log::debug!("homography estimation failed: {err}");
                None
            }
        }
    }
}

/// Correspondences accepted by the ratio test, as point pairs.
pub(crate) fn matched_points(
    query: &OrbFeatures,
    train: &OrbFeatures,
    matches: &[DescriptorMatch],
) -> (Vec<[f64; 2]>, Vec<[f64; 2]>) {
    matches
        .iter()
        .map(|m| {
            let q = &query.keypoints[m.query_idx];
            let t = &train.keypoints[m.train_idx];
            ([q.x as f64, q.y as f64], [t.x as f64, t.y as f64])
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_inlier_count() {
        let fit = HomographyFit {
            matrix: vidpano_geometry::linalg::IDENTITY_MAT33,
            inliers: vec![true, false, true, true],
        };
        assert_eq!(fit.inlier_count(), 3);
    }

    #[test]
    fn ransac_estimator_insufficient_points() {
        let estimator = RansacHomographyEstimator::default();
        let points = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        assert!(estimator.estimate(&points, &points, 5.0).is_none());
    }

    #[test]
    fn ransac_estimator_translation() {
        let estimator = RansacHomographyEstimator::default();
        let a: Vec<[f64; 2]> = (0..30)
            .map(|i| [(i % 6) as f64 * 20.0, (i / 6) as f64 * 15.0 + 2.0])
            .collect();
        let b: Vec<[f64; 2]> = a.iter().map(|p| [p[0] - 40.0, p[1] + 1.0]).collect();

        let fit = estimator.estimate(&a, &b, 5.0).expect("fit");
        assert_eq!(fit.inlier_count(), 30);
        approx::assert_relative_eq!(fit.matrix[0][2], -40.0, epsilon = 1e-6);
    }

    #[test]
    fn orb_service_flat_region() -> Result<(), ImageError> {
        let service = OrbCorrespondence::default();
        let region = Image::<u8, 3>::from_size_val([80, 80].into(), 128)?;
        let features = service.detect_and_describe(&region)?;
        assert!(features.descriptors.is_empty());
        Ok(())
    }
}
