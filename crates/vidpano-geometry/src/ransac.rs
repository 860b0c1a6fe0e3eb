use rand::prelude::*;
use rand::SeedableRng;

use crate::homography::{homography_4pt2d, homography_dlt, homography_reproj_error, GeometryError};
use crate::linalg::Mat33;

/// Parameters for RANSAC model estimation.
#[derive(Clone, Copy, Debug)]
pub struct RansacParams {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Inlier threshold in pixels, compared against the reprojection distance.
    pub threshold: f64,
    /// Minimum number of inliers required for acceptance.
    pub min_inliers: usize,
    /// Stop early once a model is found with this probability, in `(0, 1)`.
    pub confidence: f64,
    /// Re-estimate the model on all inliers of the best hypothesis.
    pub refine: bool,
    /// Optional RNG seed for deterministic runs.
    pub random_seed: Option<u64>,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            threshold: 5.0,
            min_inliers: 4,
            confidence: 0.995,
            refine: true,
            random_seed: Some(0),
        }
    }
}

/// Result of a RANSAC model fit.
#[derive(Clone, Debug)]
pub struct RansacResult<M> {
    /// Estimated model.
    pub model: M,
    /// Per-point inlier mask.
    pub inliers: Vec<bool>,
    /// Total inlier count.
    pub inlier_count: usize,
    /// Sum of inlier errors (lower is better).
    pub score: f64,
}

struct Support {
    inliers: Vec<bool>,
    count: usize,
    score: f64,
}

fn evaluate(h: &Mat33, x1: &[[f64; 2]], x2: &[[f64; 2]], threshold: f64) -> Support {
    let sq_threshold = threshold * threshold;
    let mut inliers = vec![false; x1.len()];
    let mut count = 0usize;
    let mut score = 0.0f64;
    for (i, (p1, p2)) in x1.iter().zip(x2.iter()).enumerate() {
        let d = homography_reproj_error(h, p1, p2);
        if d <= sq_threshold {
            inliers[i] = true;
            count += 1;
            score += d;
        }
    }
    Support {
        inliers,
        count,
        score,
    }
}

/// Iterations needed to draw an all-inlier sample of size 4 with the given confidence.
fn adaptive_iterations(inlier_ratio: f64, confidence: f64, max_iterations: usize) -> usize {
    let w4 = inlier_ratio.powi(4);
    if w4 >= 1.0 {
        return 1;
    }
    if w4 <= f64::EPSILON {
        return max_iterations;
    }
    let n = (1.0 - confidence).ln() / (1.0 - w4).ln();
    if n.is_finite() && n >= 0.0 {
        (n.ceil() as usize).min(max_iterations)
    } else {
        max_iterations
    }
}

/// Estimate a homography with RANSAC using the 4-point solver.
///
/// Hypotheses are drawn from random minimal samples and scored by the number
/// of correspondences whose reprojection distance is within
/// `params.threshold`, ties broken by the lowest sum of squared errors. The
/// best hypothesis is optionally refined with a least squares fit on its
/// inliers.
///
/// # Arguments
///
/// * `x1` - The source points.
/// * `x2` - The destination points, index aligned with `x1`.
/// * `params` - The estimation parameters.
pub fn ransac_homography(
    x1: &[[f64; 2]],
    x2: &[[f64; 2]],
    params: &RansacParams,
) -> Result<RansacResult<Mat33>, GeometryError> {
    if x1.len() != x2.len() || x1.len() < 4 {
        return Err(GeometryError::InvalidInput {
            required: 4,
            got: x1.len().min(x2.len()),
        });
    }

    let mut rng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => {
            let mut tr = rand::rng();
            StdRng::from_rng(&mut tr)
        }
    };

    let n = x1.len();
    let mut best_model = None;
    let mut best = Support {
        inliers: Vec::new(),
        count: 0,
        score: f64::INFINITY,
    };

    let mut max_iterations = params.max_iterations;
    let mut iteration = 0;
    while iteration < max_iterations {
        iteration += 1;

        let sample = rand::seq::index::sample(&mut rng, n, 4);
        let mut s1 = [[0.0; 2]; 4];
        let mut s2 = [[0.0; 2]; 4];
        for (i, idx) in sample.iter().enumerate() {
            s1[i] = x1[idx];
            s2[i] = x2[idx];
        }
        let mut h = [[0.0; 3]; 3];
        if homography_4pt2d(&s1, &s2, &mut h).is_err() {
            continue;
        }

        let support = evaluate(&h, x1, x2, params.threshold);
        if support.count > best.count || (support.count == best.count && support.score < best.score)
        {
            best_model = Some(h);
            best = support;
            max_iterations = adaptive_iterations(
                best.count as f64 / n as f64,
                params.confidence,
                params.max_iterations,
            )
            .max(iteration);
        }
    }

    let mut model = match best_model {
        Some(m) if best.count >= params.min_inliers.max(4) => m,
        _ => return Err(GeometryError::RansacFailure),
    };

    if params.refine {
        let (r1, r2): (Vec<[f64; 2]>, Vec<[f64; 2]>) = best
            .inliers
            .iter()
            .enumerate()
            .filter(|(_, &is_inlier)| is_inlier)
            .map(|(i, _)| (x1[i], x2[i]))
            .unzip();
        if let Ok(refined) = homography_dlt(&r1, &r2) {
            let support = evaluate(&refined, x1, x2, params.threshold);
            if support.count >= best.count {
                model = refined;
                best = support;
            }
        }
    }

    log::trace!(
        "ransac homography: {}/{} inliers after {} iterations",
        best.count,
        n,
        iteration
    );

    Ok(RansacResult {
        model,
        inliers: best.inliers,
        inlier_count: best.count,
        score: best.score,
    })
}
