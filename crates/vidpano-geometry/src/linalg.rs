/// A row-major 3x3 matrix.
pub type Mat33 = [[f64; 3]; 3];

/// The 3x3 identity matrix.
pub const IDENTITY_MAT33: Mat33 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Compute the determinant of a 3x3 matrix.
pub fn det_mat33(m: &Mat33) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Scale a homography so that its bottom right element is one.
///
/// When that element vanishes the matrix is scaled to unit Frobenius norm instead.
pub fn normalize_mat33_inplace(m: &mut Mat33) {
    let h22 = m[2][2];
    let scale = if h22.abs() > 1e-12 {
        h22
    } else {
        m.iter().flatten().map(|v| v * v).sum::<f64>().sqrt()
    };
    if scale == 0.0 {
        return;
    }
    m.iter_mut().flatten().for_each(|v| *v /= scale);
}

/// Multiply two 3x3 matrices `a * b`.
pub fn mat33_mul(a: &Mat33, b: &Mat33) -> Mat33 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Multiply a 3x3 matrix by a 3d vector.
pub fn mat33_mul_vec3(m: &Mat33, v: &[f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Invert a 3x3 matrix, returns `None` when it is singular.
pub fn inverse_mat33(m: &Mat33) -> Option<Mat33> {
    let det = det_mat33(m);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}

/// Map a 2d point through a homography.
///
/// Returns `None` for points mapped to infinity.
///
/// # Example
///
/// ```
/// use vidpano_geometry::linalg::transform_point2d;
///
/// let h = [[1.0, 0.0, 2.0], [0.0, 1.0, -1.0], [0.0, 0.0, 1.0]];
/// assert_eq!(transform_point2d(&h, &[1.0, 1.0]), Some([3.0, 0.0]));
/// ```
pub fn transform_point2d(h: &Mat33, p: &[f64; 2]) -> Option<[f64; 2]> {
    let [x, y, w] = mat33_mul_vec3(h, &[p[0], p[1], 1.0]);
    if w.abs() < 1e-12 {
        return None;
    }
    Some([x / w, y / w])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_mat33() {
        let m = [[2.0, 0.0, 1.0], [0.0, 1.0, 3.0], [0.001, 0.0, 1.0]];
        let inv = inverse_mat33(&m).expect("invertible");
        let id = mat33_mul(&m, &inv);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(id[i][j], IDENTITY_MAT33[i][j], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_inverse_singular() {
        let m = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]];
        assert!(inverse_mat33(&m).is_none());
    }

    #[test]
    fn test_normalize_mat33() {
        let mut m = [[2.0, 0.0, 4.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]];
        normalize_mat33_inplace(&mut m);
        assert_eq!(m, [[1.0, 0.0, 2.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    }
}
