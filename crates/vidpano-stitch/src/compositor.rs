use rayon::prelude::*;
use vidpano_geometry::linalg::{
    det_mat33, mat33_mul, mat33_mul_vec3, normalize_mat33_inplace, Mat33, IDENTITY_MAT33,
};
use vidpano_image::{Image, ImageError, ImageSize};
use vidpano_imgproc::{
    features::{ratio_test, OrbFeatures},
    interpolation::InterpolationMode,
    warp::warp_perspective,
};

use crate::{
    config::CompositorConfig,
    correspondence::{
        matched_points, CorrespondenceService, HomographyEstimator, OrbCorrespondence,
        RansacHomographyEstimator,
    },
    overlap::MIN_HOMOGRAPHY_CORRESPONDENCES,
};

/// Why a set of key frames could not be composited.
#[derive(thiserror::Error, Debug)]
pub enum StitchError {
    /// Fewer than two frames were given.
    #[error("Need more images")]
    NeedMoreImages,

    /// Frame `index` could not be registered against frame `index - 1`.
    #[error("Homography estimation failed")]
    HomographyEstimationFailed {
        /// Index of the frame that failed to register.
        index: usize,
    },

    /// The registered frames do not form a usable projection.
    #[error("Camera parameter adjustment failed")]
    CameraParamsAdjustFailed(String),

    /// Any other failure code reported by a compositor.
    #[error("Unknown error {0}")]
    Other(i32),

    /// Image manipulation failed.
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Assembles ordered, overlapping key frames into one composite.
pub trait Compositor {
    /// Stitch at least two frames into a single RGB composite.
    fn stitch(&self, frames: &[Image<u8, 3>]) -> Result<Image<u8, 3>, StitchError>;
}

/// Placement of the composite in the coordinates of the first frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Canvas {
    /// Left edge of the canvas in the first frame's coordinates.
    pub origin_x: f64,
    /// Top edge of the canvas in the first frame's coordinates.
    pub origin_y: f64,
    /// Canvas size in pixels.
    pub size: ImageSize,
}

/// Registers consecutive frames with homographies, then warps every frame
/// into the first frame's plane and averages them with feathered weights.
pub struct HomographyCompositor<S = OrbCorrespondence, H = RansacHomographyEstimator> {
    service: S,
    estimator: H,
    config: CompositorConfig,
}

impl HomographyCompositor {
    /// A compositor with the ORB service and the RANSAC estimator.
    pub fn with_defaults(config: CompositorConfig) -> Self {
        Self::new(
            OrbCorrespondence::default(),
            RansacHomographyEstimator::default(),
            config,
        )
    }
}

impl<S, H> HomographyCompositor<S, H>
where
    S: CorrespondenceService + Sync,
    H: HomographyEstimator,
{
    /// Create a compositor from its collaborators.
    pub fn new(service: S, estimator: H, config: CompositorConfig) -> Self {
        Self {
            service,
            estimator,
            config,
        }
    }

    /// The compositor parameters.
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Homographies mapping frame `i` into frame `i - 1`, for `i >= 1`.
    pub fn pairwise_homographies(
        &self,
        frames: &[Image<u8, 3>],
    ) -> Result<Vec<Mat33>, StitchError> {
        let service = &self.service;
        let features = frames
            .par_iter()
            .map(|frame| service.detect_and_describe(frame))
            .collect::<Result<Vec<OrbFeatures>, ImageError>>()?;

        features
            .windows(2)
            .enumerate()
            .map(|(pair, window)| self.register_pair(pair + 1, &window[1], &window[0]))
            .collect()
    }

    fn register_pair(
        &self,
        index: usize,
        current: &OrbFeatures,
        previous: &OrbFeatures,
    ) -> Result<Mat33, StitchError> {
        let failed = StitchError::HomographyEstimationFailed { index };

        if current.is_empty() || previous.is_empty() {
            log::warn!("frame {index}: no features to register");
            return Err(failed);
        }

        let knn = self
            .service
            .knn_match(&current.descriptors, &previous.descriptors, 2);
        let accepted = ratio_test(&knn, self.config.match_ratio_threshold);
        if accepted.len() < MIN_HOMOGRAPHY_CORRESPONDENCES.max(self.config.min_pair_inliers) {
            log::warn!(
                "frame {index}: only {} correspondences survive the ratio test",
                accepted.len()
            );
            return Err(failed);
        }

        let (points_current, points_previous) = matched_points(current, previous, &accepted);
        let fit = self
            .estimator
            .estimate(
                &points_current,
                &points_previous,
                self.config.ransac_reprojection_tolerance,
            )
            .ok_or_else(|| {
                log::warn!("frame {index}: no homography found");
                StitchError::HomographyEstimationFailed { index }
            })?;

        let inliers = fit.inlier_count();
        log::debug!(
            "frame {index}: {} correspondences, {inliers} inliers",
            accepted.len()
        );
        if inliers < self.config.min_pair_inliers {
            log::warn!(
                "frame {index}: {inliers} inliers, {} required",
                self.config.min_pair_inliers
            );
            return Err(failed);
        }

        Ok(fit.matrix)
    }
}

/// Compose pairwise homographies into transforms to the first frame.
///
/// Element `i` of the result maps frame `i` into frame 0; element 0 is the identity.
pub fn chain_homographies(pairwise: &[Mat33]) -> Result<Vec<Mat33>, StitchError> {
    let mut chain = Vec::with_capacity(pairwise.len() + 1);
    chain.push(IDENTITY_MAT33);

    for (i, h) in pairwise.iter().enumerate() {
        let mut to_ref = mat33_mul(&chain[i], h);
        normalize_mat33_inplace(&mut to_ref);

        if to_ref.iter().flatten().any(|v| !v.is_finite()) {
            return Err(StitchError::CameraParamsAdjustFailed(format!(
                "frame {} has a non-finite transform",
                i + 1
            )));
        }
        if det_mat33(&to_ref).abs() < 1e-8 {
            return Err(StitchError::CameraParamsAdjustFailed(format!(
                "frame {} has a singular transform",
                i + 1
            )));
        }
        chain.push(to_ref);
    }

    Ok(chain)
}

fn frame_corners(size: ImageSize) -> [[f64; 2]; 4] {
    let (w, h) = (
        size.width.saturating_sub(1) as f64,
        size.height.saturating_sub(1) as f64,
    );
    [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
}

fn project_corners(
    index: usize,
    size: ImageSize,
    to_ref: &Mat33,
) -> Result<[[f64; 2]; 4], StitchError> {
    let mut projected = [[0.0; 2]; 4];
    for (dst, corner) in projected.iter_mut().zip(frame_corners(size)) {
        let [x, y, w] = mat33_mul_vec3(to_ref, &[corner[0], corner[1], 1.0]);
        if !(w > 1e-12) {
            return Err(StitchError::CameraParamsAdjustFailed(format!(
                "frame {index} projects behind the camera"
            )));
        }
        *dst = [x / w, y / w];
    }
    Ok(projected)
}

/// Bounds of a set of points, snapped to whole pixels.
fn pixel_bounds(points: impl Iterator<Item = [f64; 2]>) -> ([f64; 2], [f64; 2]) {
    const SNAP: f64 = 1e-6;
    let (mut min, mut max) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
    for p in points {
        for k in 0..2 {
            min[k] = min[k].min(p[k]);
            max[k] = max[k].max(p[k]);
        }
    }
    (
        [(min[0] + SNAP).floor(), (min[1] + SNAP).floor()],
        [(max[0] - SNAP).ceil(), (max[1] - SNAP).ceil()],
    )
}

/// The canvas covering every frame once projected into the first frame.
pub fn canvas_bounds(
    sizes: &[ImageSize],
    to_ref: &[Mat33],
    max_canvas_pixels: usize,
) -> Result<Canvas, StitchError> {
    let mut corners = Vec::with_capacity(sizes.len() * 4);
    for (index, (size, h)) in sizes.iter().zip(to_ref).enumerate() {
        corners.extend(project_corners(index, *size, h)?);
    }

    let (min, max) = pixel_bounds(corners.into_iter());
    let width = max[0] - min[0] + 1.0;
    let height = max[1] - min[1] + 1.0;
    if !width.is_finite() || !height.is_finite() || width * height > max_canvas_pixels as f64 {
        return Err(StitchError::CameraParamsAdjustFailed(format!(
            "canvas of {width}x{height} pixels exceeds the limit of {max_canvas_pixels}"
        )));
    }

    Ok(Canvas {
        origin_x: min[0],
        origin_y: min[1],
        size: ImageSize {
            width: width as usize,
            height: height as usize,
        },
    })
}

/// Premultiplied RGB plus a weight falling off linearly towards the frame border.
fn feathered_rgbw(frame: &Image<u8, 3>) -> Result<Image<f32, 4>, ImageError> {
    let (cols, rows) = (frame.cols(), frame.rows());
    let mut rgbw = Image::from_size_val(frame.size(), 0f32)?;

    rgbw.as_slice_mut()
        .par_chunks_exact_mut(4 * cols)
        .zip(frame.as_slice().par_chunks_exact(3 * cols))
        .enumerate()
        .for_each(|(y, (dst_row, src_row))| {
            let dy = (y + 1).min(rows - y) as f32;
            dst_row
                .chunks_exact_mut(4)
                .zip(src_row.chunks_exact(3))
                .enumerate()
                .for_each(|(x, (dst, src))| {
                    let weight = dy.min((x + 1).min(cols - x) as f32);
                    dst[0] = src[0] as f32 * weight;
                    dst[1] = src[1] as f32 * weight;
                    dst[2] = src[2] as f32 * weight;
                    dst[3] = weight;
                });
        });

    Ok(rgbw)
}

fn to_f32_matrix(m: &Mat33) -> [f32; 9] {
    let mut out = [0f32; 9];
    for (dst, src) in out.iter_mut().zip(m.iter().flatten()) {
        *dst = *src as f32;
    }
    out
}

/// Warp every frame onto the canvas and average the feathered contributions.
pub fn blend_frames(
    frames: &[Image<u8, 3>],
    to_ref: &[Mat33],
    canvas: &Canvas,
) -> Result<Image<u8, 3>, StitchError> {
    let (canvas_cols, canvas_rows) = (canvas.size.width, canvas.size.height);
    let mut accum = vec![0f32; canvas_cols * canvas_rows * 4];

    for (index, (frame, h)) in frames.iter().zip(to_ref).enumerate() {
        let corners = project_corners(index, frame.size(), h)?;
        let (min, max) = pixel_bounds(corners.into_iter());

        // frame footprint on the canvas, clamped
        let x0 = ((min[0] - canvas.origin_x).max(0.0) as usize).min(canvas_cols - 1);
        let y0 = ((min[1] - canvas.origin_y).max(0.0) as usize).min(canvas_rows - 1);
        let x1 = ((max[0] - canvas.origin_x).max(0.0) as usize).min(canvas_cols - 1);
        let y1 = ((max[1] - canvas.origin_y).max(0.0) as usize).min(canvas_rows - 1);
        let footprint = ImageSize {
            width: x1 - x0 + 1,
            height: y1 - y0 + 1,
        };

        let shift = [
            [1.0, 0.0, -(canvas.origin_x + x0 as f64)],
            [0.0, 1.0, -(canvas.origin_y + y0 as f64)],
            [0.0, 0.0, 1.0],
        ];
        let local = to_f32_matrix(&mat33_mul(&shift, h));

        let rgbw = feathered_rgbw(frame)?;
        let mut warped = Image::<f32, 4>::from_size_val(footprint, 0.0)?;
        warp_perspective(&rgbw, &mut warped, &local, InterpolationMode::Bilinear)?;

        for (row, warped_row) in warped
            .as_slice()
            .chunks_exact(4 * footprint.width)
            .enumerate()
        {
            let start = ((y0 + row) * canvas_cols + x0) * 4;
            accum[start..start + warped_row.len()]
                .iter_mut()
                .zip(warped_row)
                .for_each(|(acc, v)| *acc += v);
        }
    }

    let mut composite = Image::<u8, 3>::from_size_val(canvas.size, 0)?;
    composite
        .as_slice_mut()
        .par_chunks_exact_mut(3)
        .zip(accum.par_chunks_exact(4))
        .for_each(|(dst, acc)| {
            let weight = acc[3];
            if weight > 0.0 {
                for k in 0..3 {
                    dst[k] = (acc[k] / weight).round().clamp(0.0, 255.0) as u8;
                }
            }
        });

    Ok(composite)
}

impl<S, H> Compositor for HomographyCompositor<S, H>
where
    S: CorrespondenceService + Sync,
    H: HomographyEstimator,
{
    fn stitch(&self, frames: &[Image<u8, 3>]) -> Result<Image<u8, 3>, StitchError> {
        if frames.len() < 2 {
            return Err(StitchError::NeedMoreImages);
        }

        let pairwise = self.pairwise_homographies(frames)?;
        let to_ref = chain_homographies(&pairwise)?;

        let sizes = frames.iter().map(|f| f.size()).collect::<Vec<_>>();
        let canvas = canvas_bounds(&sizes, &to_ref, self.config.max_canvas_pixels)?;
        log::info!("compositing {} frames onto {}", frames.len(), canvas.size);

        blend_frames(frames, &to_ref, &canvas)
    }
}
