use crate::linalg::{self, Mat33};

/// Errors returned by the homography solvers.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum GeometryError {
    /// Not enough or mismatched correspondences.
    #[error("Need at least {required} correspondences with equal lengths, got {got}")]
    InvalidInput {
        /// Minimum number of correspondences.
        required: usize,
        /// Number of correspondences provided.
        got: usize,
    },

    /// The points do not constrain a unique homography.
    #[error("Degenerate point configuration")]
    DegenerateConfiguration,

    /// RANSAC did not find a model with enough support.
    #[error("RANSAC failed to find a valid model")]
    RansacFailure,
}

/// Compute the homography matrix from four 2d point correspondences.
///
/// * `x1` - The source 2d points with shape (4, 2).
/// * `x2` - The destination 2d points with shape (4, 2).
/// * `homo` - The output homography matrix from src to dst with shape (3, 3).
pub fn homography_4pt2d(
    x1: &[[f64; 2]; 4],
    x2: &[[f64; 2]; 4],
    homo: &mut Mat33,
) -> Result<(), GeometryError> {
    // construct matrix A
    let mut mat_a = faer::Mat::<f64>::zeros(8, 9);
    for i in 0..4 {
        let (x1_i, x2_i) = (x1[i], x2[i]);
        mat_a.write(2 * i, 0, x1_i[0]);
        mat_a.write(2 * i, 1, x1_i[1]);
        mat_a.write(2 * i, 2, 1.0);
        mat_a.write(2 * i, 6, -x2_i[0] * x1_i[0]);
        mat_a.write(2 * i, 7, -x2_i[0] * x1_i[1]);
        mat_a.write(2 * i, 8, -x2_i[0]);

        mat_a.write(2 * i + 1, 3, x1_i[0]);
        mat_a.write(2 * i + 1, 4, x1_i[1]);
        mat_a.write(2 * i + 1, 5, 1.0);
        mat_a.write(2 * i + 1, 6, -x2_i[1] * x1_i[0]);
        mat_a.write(2 * i + 1, 7, -x2_i[1] * x1_i[1]);
        mat_a.write(2 * i + 1, 8, -x2_i[1]);
    }

    // solve -> h_mat: 8x1 and take the smallest singular value
    let svd = mat_a.svd();
    let h = svd.v().col(8);

    // copy to homography matrix
    homo[0] = [h[0], h[1], h[2]];
    homo[1] = [h[3], h[4], h[5]];
    homo[2] = [h[6], h[7], h[8]];

    // normalize the homography matrix
    linalg::normalize_mat33_inplace(homo);

    if linalg::det_mat33(homo).abs() < 1e-8 {
        return Err(GeometryError::DegenerateConfiguration);
    }

    Ok(())
}

/// Similarity transform moving the centroid to the origin with mean distance sqrt(2).
fn normalization_transform(points: &[[f64; 2]]) -> Option<Mat33> {
    let n = points.len() as f64;
    let (cx, cy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    let (cx, cy) = (cx / n, cy / n);

    let mean_dist = points
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-12 {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some([[s, 0.0, -s * cx], [0.0, s, -s * cy], [0.0, 0.0, 1.0]])
}

/// Least squares homography from four or more correspondences.
///
/// Normalized direct linear transform: both point sets are conditioned to
/// zero mean and unit scale before solving, and the result is mapped back to
/// pixel coordinates.
///
/// # Arguments
///
/// * `x1` - The source 2d points.
/// * `x2` - The destination 2d points.
///
/// # Returns
///
/// The homography mapping `x1` onto `x2`, scaled so that `h[2][2] == 1`.
///
/// # Example
///
/// ```
/// use vidpano_geometry::homography::homography_dlt;
///
/// let x1 = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [10.0, 10.0], [5.0, 3.0]];
/// let x2: Vec<[f64; 2]> = x1.iter().map(|p| [p[0] + 4.0, p[1] - 2.0]).collect();
/// let h = homography_dlt(&x1, &x2).unwrap();
///
/// assert!((h[0][2] - 4.0).abs() < 1e-9);
/// assert!((h[1][2] + 2.0).abs() < 1e-9);
/// ```
pub fn homography_dlt(x1: &[[f64; 2]], x2: &[[f64; 2]]) -> Result<Mat33, GeometryError> {
    if x1.len() != x2.len() || x1.len() < 4 {
        return Err(GeometryError::InvalidInput {
            required: 4,
            got: x1.len().min(x2.len()),
        });
    }

    let t1 = normalization_transform(x1).ok_or(GeometryError::DegenerateConfiguration)?;
    let t2 = normalization_transform(x2).ok_or(GeometryError::DegenerateConfiguration)?;

    // accumulate the normal equations A^T A
    let mut ata = faer::Mat::<f64>::zeros(9, 9);
    for (p1, p2) in x1.iter().zip(x2.iter()) {
        let [u1, v1, _] = linalg::mat33_mul_vec3(&t1, &[p1[0], p1[1], 1.0]);
        let [u2, v2, _] = linalg::mat33_mul_vec3(&t2, &[p2[0], p2[1], 1.0]);

        let rows = [
            [u1, v1, 1.0, 0.0, 0.0, 0.0, -u2 * u1, -u2 * v1, -u2],
            [0.0, 0.0, 0.0, u1, v1, 1.0, -v2 * u1, -v2 * v1, -v2],
        ];
        for r in rows.iter() {
            for i in 0..9 {
                for j in i..9 {
                    let v = ata.read(i, j) + r[i] * r[j];
                    ata.write(i, j, v);
                }
            }
        }
    }
    for i in 0..9 {
        for j in 0..i {
            let v = ata.read(j, i);
            ata.write(i, j, v);
        }
    }

    let svd = ata.svd();
    let h = svd.v().col(8);
    let hn = [[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], h[8]]];

    // denormalize: H = T2^-1 * Hn * T1
    let t2_inv = linalg::inverse_mat33(&t2).ok_or(GeometryError::DegenerateConfiguration)?;
    let mut homo = linalg::mat33_mul(&t2_inv, &linalg::mat33_mul(&hn, &t1));
    linalg::normalize_mat33_inplace(&mut homo);

    if !homo.iter().flatten().all(|v| v.is_finite()) || linalg::det_mat33(&homo).abs() < 1e-8 {
        return Err(GeometryError::DegenerateConfiguration);
    }

    Ok(homo)
}

/// Squared reprojection error of `x1` mapped through `h` against `x2`.
///
/// Points mapped to infinity have an infinite error.
pub fn homography_reproj_error(h: &Mat33, x1: &[f64; 2], x2: &[f64; 2]) -> f64 {
    match linalg::transform_point2d(h, x1) {
        Some([u, v]) => {
            let dx = u - x2[0];
            let dy = v - x2[1];
            dx * dx + dy * dy
        }
        None => f64::INFINITY,
    }
}
