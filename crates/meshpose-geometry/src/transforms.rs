//! Rigid 4x4 transform utilities.
//!
//! All transforms in this workspace right-multiply homogeneous column
//! vectors: `p' = M @ [p; 1]`. Composition `compose(m1, m2)` applies `m2`
//! first, then `m1`.

use nalgebra::Matrix3;
use thiserror::Error;

/// Error types for transform computations.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The rotation axis has (near) zero length.
    #[error("cannot compute a rotation matrix from a zero-length axis")]
    ZeroAxis,

    /// The two point sets have different lengths.
    #[error("point sets have different lengths: {left} != {right}")]
    LengthMismatch {
        /// Length of the first point set.
        left: usize,
        /// Length of the second point set.
        right: usize,
    },

    /// Too few point pairs to constrain a rigid transform.
    #[error("rigid fit requires at least 3 point pairs, got {0}")]
    TooFewPoints(usize),

    /// The SVD of the cross-covariance did not converge.
    #[error("svd failed during rigid fit")]
    SvdFailed,
}

/// The identity rigid transform.
pub const IDENTITY: [[f64; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Mirror across the YZ plane (x -> -x), the tool's object-mirroring matrix.
pub const MIRROR_X: [[f64; 4]; 4] = [
    [-1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Assemble a 4x4 rigid transform from a rotation matrix and a translation.
pub fn from_rt(r: &[[f64; 3]; 3], t: &[f64; 3]) -> [[f64; 4]; 4] {
    [
        [r[0][0], r[0][1], r[0][2], t[0]],
        [r[1][0], r[1][1], r[1][2], t[1]],
        [r[2][0], r[2][1], r[2][2], t[2]],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// The top-left 3x3 rotation block of a rigid transform.
pub fn rotation(m: &[[f64; 4]; 4]) -> [[f64; 3]; 3] {
    [
        [m[0][0], m[0][1], m[0][2]],
        [m[1][0], m[1][1], m[1][2]],
        [m[2][0], m[2][1], m[2][2]],
    ]
}

/// The translation column of a rigid transform.
pub fn translation(m: &[[f64; 4]; 4]) -> [f64; 3] {
    [m[0][3], m[1][3], m[2][3]]
}

/// Apply a rigid transform to a single point: `M @ [p; 1]`.
#[inline]
pub fn transform_point(m: &[[f64; 4]; 4], p: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * p[0] + m[0][1] * p[1] + m[0][2] * p[2] + m[0][3],
        m[1][0] * p[0] + m[1][1] * p[1] + m[1][2] * p[2] + m[1][3],
        m[2][0] * p[0] + m[2][1] * p[1] + m[2][2] * p[2] + m[2][3],
    ]
}

/// Apply a rigid transform to a set of points.
pub fn transform_points(m: &[[f64; 4]; 4], points: &[[f64; 3]]) -> Vec<[f64; 3]> {
    points.iter().map(|&p| transform_point(m, p)).collect()
}

/// Compose two transforms: the result applies `m2` first, then `m1`.
pub fn compose(m1: &[[f64; 4]; 4], m2: &[[f64; 4]; 4]) -> [[f64; 4]; 4] {
    let mut out = [[0.0; 4]; 4];
    for (i, row) in m1.iter().enumerate() {
        for j in 0..4 {
            out[i][j] = (0..4).map(|k| row[k] * m2[k][j]).sum();
        }
    }
    out
}

/// Sum of absolute elementwise differences between two 4x4 matrices.
pub fn abs_difference(a: &[[f64; 4]; 4], b: &[[f64; 4]; 4]) -> f64 {
    a.iter()
        .zip(b.iter())
        .flat_map(|(ra, rb)| ra.iter().zip(rb.iter()))
        .map(|(x, y)| (x - y).abs())
        .sum()
}

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation (normalized internally).
/// * `angle` - The angle of rotation in radians.
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], TransformError> {
    let magnitude = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
    if magnitude < 1e-10 {
        return Err(TransformError::ZeroAxis);
    }
    let x = axis[0] / magnitude;
    let y = axis[1] / magnitude;
    let z = axis[2] / magnitude;

    let c = angle.cos();
    let s = angle.sin();
    let t = 1.0 - c;

    Ok([
        [c + x * x * t, x * y * t - z * s, x * z * t + y * s],
        [x * y * t + z * s, c + y * y * t, y * z * t - x * s],
        [x * z * t - y * s, y * z * t + x * s, c + z * z * t],
    ])
}

/// Compute the Rodrigues rotation vector of a rotation matrix.
///
/// The result's direction is the rotation axis and its norm is the angle.
pub fn rotation_matrix_to_axis_angle(r: &[[f64; 3]; 3]) -> [f64; 3] {
    let trace = r[0][0] + r[1][1] + r[2][2];
    let cos_angle = ((trace - 1.0) / 2.0).clamp(-1.0, 1.0);
    let angle = cos_angle.acos();

    if angle < 1e-12 {
        return [0.0, 0.0, 0.0];
    }

    if std::f64::consts::PI - angle < 1e-6 {
        // Near pi the skew part vanishes; recover the axis from the diagonal
        // and fix signs from the symmetric off-diagonal terms.
        let xx = ((r[0][0] - cos_angle) / (1.0 - cos_angle)).max(0.0).sqrt();
        let yy = ((r[1][1] - cos_angle) / (1.0 - cos_angle)).max(0.0).sqrt();
        let zz = ((r[2][2] - cos_angle) / (1.0 - cos_angle)).max(0.0).sqrt();
        let (x, y, z) = if xx >= yy && xx >= zz {
            let y = (r[0][1] + r[1][0]) / (2.0 * (1.0 - cos_angle) * xx);
            let z = (r[0][2] + r[2][0]) / (2.0 * (1.0 - cos_angle) * xx);
            (xx, y, z)
        } else if yy >= zz {
            let x = (r[0][1] + r[1][0]) / (2.0 * (1.0 - cos_angle) * yy);
            let z = (r[1][2] + r[2][1]) / (2.0 * (1.0 - cos_angle) * yy);
            (x, yy, z)
        } else {
            let x = (r[0][2] + r[2][0]) / (2.0 * (1.0 - cos_angle) * zz);
            let y = (r[1][2] + r[2][1]) / (2.0 * (1.0 - cos_angle) * zz);
            (x, y, zz)
        };
        return [x * angle, y * angle, z * angle];
    }

    let scale = angle / (2.0 * angle.sin());
    [
        (r[2][1] - r[1][2]) * scale,
        (r[0][2] - r[2][0]) * scale,
        (r[1][0] - r[0][1]) * scale,
    ]
}

/// Fit the rigid transform mapping point set `a` onto point set `b` in the
/// least-squares sense (Kabsch), with reflection correction so the rotation
/// block is always a proper rotation (determinant +1).
pub fn fit_rigid(a: &[[f64; 3]], b: &[[f64; 3]]) -> Result<[[f64; 4]; 4], TransformError> {
    if a.len() != b.len() {
        return Err(TransformError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.len() < 3 {
        return Err(TransformError::TooFewPoints(a.len()));
    }
    let n = a.len() as f64;

    let mut ca = [0.0; 3];
    let mut cb = [0.0; 3];
    for (pa, pb) in a.iter().zip(b.iter()) {
        for axis in 0..3 {
            ca[axis] += pa[axis] / n;
            cb[axis] += pb[axis] / n;
        }
    }

    // Cross-covariance H = sum (a_i - ca)(b_i - cb)^T.
    let mut h = Matrix3::<f64>::zeros();
    for (pa, pb) in a.iter().zip(b.iter()) {
        for i in 0..3 {
            for j in 0..3 {
                h[(i, j)] += (pa[i] - ca[i]) * (pb[j] - cb[j]);
            }
        }
    }

    let svd = h.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(TransformError::SvdFailed),
    };
    let mut v = v_t.transpose();
    let mut r = v * u.transpose();
    if r.determinant() < 0.0 {
        // Reflection detected, flip the axis of least variance.
        v.set_column(2, &(-v.column(2)));
        r = v * u.transpose();
    }

    let mut rot = [[0.0; 3]; 3];
    for (i, row) in rot.iter_mut().enumerate() {
        for (j, value) in row.iter_mut().enumerate() {
            *value = r[(i, j)];
        }
    }
    let t = [
        cb[0] - (rot[0][0] * ca[0] + rot[0][1] * ca[1] + rot[0][2] * ca[2]),
        cb[1] - (rot[1][0] * ca[0] + rot[1][1] * ca[1] + rot[1][2] * ca[2]),
        cb[2] - (rot[2][0] * ca[0] + rot[2][1] * ca[1] + rot[2][2] * ca[2]),
    ];
    Ok(from_rt(&rot, &t))
}
