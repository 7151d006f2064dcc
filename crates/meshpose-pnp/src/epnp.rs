//! Efficient Perspective-n-Point (EPnP) solver
//! Paper: https://www.tugraz.at/fileadmin/user_upload/Institute/ICG/Images/team_lepetit/publications/lepetit_ijcv08.pdf

use crate::ops::{compute_centroid, gauss_newton, kabsch, rotation_to_rvec};
use crate::pnp::{NumericTol, PnPError, PnPResult, PnPSolver};
use glam::{Mat3, Vec3};
use nalgebra::{DMatrix, DVector, Matrix3, Vector4};

/// Marker type representing the Efficient PnP algorithm.
pub struct EPnP;

impl PnPSolver for EPnP {
    type Param = EPnPParams;

    fn solve(
        points_world: &[[f32; 3]],
        points_image: &[[f32; 2]],
        k: &[[f32; 3]; 3],
        params: &Self::Param,
    ) -> Result<PnPResult, PnPError> {
        solve_epnp(points_world, points_image, k, params)
    }
}

/// Parameters controlling the EPnP solver.
#[derive(Debug, Clone, Default)]
pub struct EPnPParams {
    /// Shared numeric tolerances.
    pub tol: NumericTol,
}

/// Solve Perspective-n-Point (EPnP).
///
/// # Arguments
/// * `points_world` – 3-D coordinates in the world frame, shape *(N,3)* with `N≥4`.
/// * `points_image` – Corresponding pixel coordinates, shape *(N,2)*.
/// * `k` – Camera intrinsics matrix.
///
/// # Returns
/// A [`PnPResult`] whose rotation maps **world → camera**.
pub fn solve_epnp(
    points_world: &[[f32; 3]],
    points_image: &[[f32; 2]],
    k: &[[f32; 3]; 3],
    params: &EPnPParams,
) -> Result<PnPResult, PnPError> {
    let n = points_world.len();
    if n != points_image.len() {
        return Err(PnPError::MismatchedArrayLengths {
            left_name: "world points",
            left_len: n,
            right_name: "image points",
            right_len: points_image.len(),
        });
    }
    if n < 4 {
        return Err(PnPError::InsufficientCorrespondences {
            required: 4,
            actual: n,
        });
    }

    let cw = select_control_points(points_world);

    let alphas = compute_barycentric(points_world, &cw, params.tol.eps);

    // Build the 2N×12 design matrix M
    let m_rows = build_m(&alphas, points_image, k);

    let m_flat: Vec<f32> = m_rows.iter().flat_map(|row| row.iter()).cloned().collect();
    let m_mat = DMatrix::<f32>::from_row_slice(2 * n, 12, &m_flat);

    // Null space of M from the eigenvectors of the 12x12 normal matrix
    // M^T M, ordered smallest eigenvalue first. Unlike a thin SVD of M this
    // stays well defined when M has fewer than 12 rows (n < 6), and the
    // ordering does not rely on how the decomposition sorts its output.
    let mtm = m_mat.transpose() * &m_mat;
    let eigen = mtm.symmetric_eigen();
    let mut order: Vec<usize> = (0..12).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

    let mut null4 = DMatrix::<f32>::zeros(12, 4); // shape 12×4
    for (target, &source) in order.iter().take(4).enumerate() {
        null4.set_column(target, &eigen.eigenvectors.column(source));
    }

    // Build helper matrices for beta initialisation
    let l = build_l6x10(&null4);
    let rho = rho_ctrlpts(&cw);

    let rho_vec = DVector::<f32>::from_column_slice(&rho);

    let mut betas: Vec<[f32; 4]> = Vec::new();
    betas.extend(
        [
            estimate_beta([0, 1, 3, 6], &l, &rho_vec, params.tol.svd),
            estimate_beta([0, 1, 2], &l, &rho_vec, params.tol.svd),
            estimate_beta([0, 1, 2, 3, 4], &l, &rho_vec, params.tol.svd),
        ]
        .into_iter()
        .flatten(),
    );

    let betas_refined: Vec<[f32; 4]> = betas
        .iter()
        .map(|&b| gauss_newton(b, &null4, &rho))
        .collect();

    let mut best_err = f32::INFINITY;
    let mut best_r = [[0.0; 3]; 3];
    let mut best_t = [0.0; 3];
    let mut found = false;

    for bet in &betas_refined {
        let (r_c, t_c) = match pose_from_betas(bet, &null4, &cw, &alphas) {
            Some(pose) => pose,
            None => continue,
        };
        let err = rmse_px(points_world, points_image, &r_c, &t_c, k);
        if err < best_err {
            best_err = err;
            best_r = r_c;
            best_t = t_c;
            found = true;
        }
    }

    if !found {
        return Err(PnPError::SvdFailed(
            "no candidate pose could be recovered".to_string(),
        ));
    }

    let rvec = rotation_to_rvec(&best_r);

    Ok(PnPResult {
        rotation: best_r,
        translation: best_t,
        rvec,
        reproj_rmse: Some(best_err),
    })
}

/// Compute pose (R, t) from a set of betas using the null-space vectors.
fn pose_from_betas(
    betas: &[f32; 4],
    null4: &DMatrix<f32>, // 12×4 matrix (V)
    cw: &[[f32; 3]; 4],   // control points in world frame
    alphas: &[[f32; 4]],  // barycentric coordinates for each world point
) -> Option<([[f32; 3]; 3], [f32; 3])> {
    let beta_vec = Vector4::from_column_slice(betas);
    let cc_flat = null4 * beta_vec; // 12×1 vector

    let mut cc: [[f32; 3]; 4] = [[0.0; 3]; 4];
    for (i, pt) in cc.iter_mut().enumerate() {
        pt[0] = cc_flat[3 * i];
        pt[1] = cc_flat[3 * i + 1];
        pt[2] = cc_flat[3 * i + 2];
    }

    // Fix the global sign so the first point sits in front of the camera.
    let a0 = alphas[0];
    let mut pc0 = [0.0; 3];
    for j in 0..4 {
        pc0[0] += a0[j] * cc[j][0];
        pc0[1] += a0[j] * cc[j][1];
        pc0[2] += a0[j] * cc[j][2];
    }
    if pc0[2] < 0.0 {
        for pt in &mut cc {
            pt[0] *= -1.0;
            pt[1] *= -1.0;
            pt[2] *= -1.0;
        }
    }

    kabsch(cw, &cc)
}

/// Root-mean-square reprojection error in pixels.
fn rmse_px(
    points_world: &[[f32; 3]],
    points_image: &[[f32; 2]],
    r: &[[f32; 3]; 3],
    t: &[f32; 3],
    k: &[[f32; 3]; 3],
) -> f32 {
    let fx = k[0][0];
    let fy = k[1][1];
    let cx = k[0][2];
    let cy = k[1][2];

    let mut sum_sq = 0.0;
    let n = points_world.len() as f32;

    for (p, &img) in points_world.iter().zip(points_image.iter()) {
        // Camera-frame coordinates: Pc = R * Pw + t
        let x_c = r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2] + t[0];
        let y_c = r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2] + t[1];
        let z_c = r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2] + t[2];

        let inv_z = 1.0 / z_c;
        let u_hat = fx * x_c * inv_z + cx;
        let v_hat = fy * y_c * inv_z + cy;

        let du = u_hat - img[0];
        let dv = v_hat - img[1];
        sum_sq += du * du + dv * dv;
    }

    (sum_sq / n).sqrt()
}

/// Control points: centroid plus displacements along the principal axes,
/// each scaled by the standard deviation along that axis.
fn select_control_points(points_world: &[[f32; 3]]) -> [[f32; 3]; 4] {
    let n = points_world.len();
    let c = compute_centroid(points_world);

    let mut cov = Matrix3::<f32>::zeros();
    for p in points_world {
        let diff = [p[0] - c[0], p[1] - c[1], p[2] - c[2]];
        for i in 0..3 {
            for j in 0..3 {
                cov[(i, j)] += diff[i] * diff[j];
            }
        }
    }
    cov /= n as f32;

    let eigen = cov.symmetric_eigen();
    let mut axes_sig: Vec<(f32, [f32; 3])> = (0..3)
        .map(|i| {
            let axis = eigen.eigenvectors.column(i);
            (
                eigen.eigenvalues[i].max(0.0).sqrt(),
                [axis[0], axis[1], axis[2]],
            )
        })
        .collect();
    axes_sig.sort_by(|a, b| b.0.total_cmp(&a.0));

    // Assemble control points: centroid + principal-axis displacements
    let mut cw = [[0.0; 3]; 4];
    cw[0] = c;
    for (i, (sigma, axis)) in axes_sig.iter().enumerate() {
        cw[i + 1][0] = c[0] + sigma * axis[0];
        cw[i + 1][1] = c[1] + sigma * axis[1];
        cw[i + 1][2] = c[2] + sigma * axis[2];
    }

    cw
}

/// Compute barycentric coordinates of world-space points with respect to the
/// 4 control points returned by `select_control_points`.
///
/// Each result element is `[α0, α1, α2, α3]` such that `α0 + α1 + α2 + α3 = 1`
/// and `pw_i = Σ αj Cw_j`. If the control-point tetrahedron is degenerate (the
/// determinant falls below `eps`) a Moore-Penrose pseudo-inverse is used.
fn compute_barycentric(points_world: &[[f32; 3]], cw: &[[f32; 3]; 4], eps: f32) -> Vec<[f32; 4]> {
    // Build B = [C1 - C0, C2 - C0, C3 - C0].
    let c0 = Vec3::new(cw[0][0], cw[0][1], cw[0][2]);
    let d1 = Vec3::new(cw[1][0] - c0.x, cw[1][1] - c0.y, cw[1][2] - c0.z);
    let d2 = Vec3::new(cw[2][0] - c0.x, cw[2][1] - c0.y, cw[2][2] - c0.z);
    let d3 = Vec3::new(cw[3][0] - c0.x, cw[3][1] - c0.y, cw[3][2] - c0.z);

    let b = Mat3::from_cols(d1, d2, d3);

    let b_inv = if b.determinant().abs() > eps {
        b.inverse()
    } else {
        // Moore-Penrose pseudo-inverse: B⁺ = V Σ⁺ Uᵀ
        let b_na = Matrix3::<f32>::new(
            b.x_axis.x, b.y_axis.x, b.z_axis.x, //
            b.x_axis.y, b.y_axis.y, b.z_axis.y, //
            b.x_axis.z, b.y_axis.z, b.z_axis.z,
        );
        let pinv = b_na.pseudo_inverse(eps).unwrap_or_else(|_| Matrix3::zeros());
        Mat3::from_cols(
            Vec3::new(pinv[(0, 0)], pinv[(1, 0)], pinv[(2, 0)]),
            Vec3::new(pinv[(0, 1)], pinv[(1, 1)], pinv[(2, 1)]),
            Vec3::new(pinv[(0, 2)], pinv[(1, 2)], pinv[(2, 2)]),
        )
    };

    points_world
        .iter()
        .map(|p| {
            let diff = Vec3::new(p[0] - c0.x, p[1] - c0.y, p[2] - c0.z);
            let lamb = b_inv * diff;
            [1.0 - (lamb.x + lamb.y + lamb.z), lamb.x, lamb.y, lamb.z]
        })
        .collect()
}

/// Construct the 2N×12 design matrix **M** used by EPnP.
///
/// The output is a vector of length `2*N` where each element is the 12-vector
/// corresponding to a row of **M**.
fn build_m(alphas: &[[f32; 4]], points_image: &[[f32; 2]], k: &[[f32; 3]; 3]) -> Vec<[f32; 12]> {
    let n = alphas.len();

    let fu = k[0][0];
    let fv = k[1][1];
    let uc = k[0][2];
    let vc = k[1][2];

    let mut m = vec![[0.0f32; 12]; 2 * n];

    for (i, (a, &uv)) in alphas.iter().zip(points_image.iter()).enumerate() {
        let u = uv[0];
        let v = uv[1];

        let row_x = 2 * i;
        let row_y = row_x + 1;

        for (j, &alpha) in a.iter().enumerate() {
            let base = 3 * j;
            m[row_x][base] = alpha * fu;
            m[row_x][base + 2] = alpha * (uc - u);
            m[row_y][base + 1] = alpha * fv;
            m[row_y][base + 2] = alpha * (vc - v);
        }
    }

    m
}

/// Build the 6×10 matrix **L** used in EPnP from the 4-dimensional null-space
/// matrix `V` (shape 12×4).
fn build_l6x10(null4: &DMatrix<f32>) -> [[f32; 10]; 6] {
    // v_cp[i] holds the 4 control-point blocks of null-space column i, in
    // the same order the betas index them.
    let mut v_cp: Vec<[Vec3; 4]> = Vec::with_capacity(4);
    for c in 0..4 {
        let col = null4.column(c);
        let mut blocks = [Vec3::ZERO; 4];
        for (k, block) in blocks.iter_mut().enumerate() {
            *block = Vec3::new(col[3 * k], col[3 * k + 1], col[3 * k + 2]);
        }
        v_cp.push(blocks);
    }

    // Differences between control-point vectors for each null-space component.
    let dv_arr: Vec<Vec<Vec3>> = (0..4)
        .map(|i| {
            CP_PAIRS
                .iter()
                .map(|&(a, b)| v_cp[i][a] - v_cp[i][b])
                .collect::<Vec<_>>()
        })
        .collect();

    let mut l = [[0.0f32; 10]; 6];
    for (j, row) in l.iter_mut().enumerate() {
        row[0] = dv_arr[0][j].dot(dv_arr[0][j]);
        row[1] = 2.0 * dv_arr[0][j].dot(dv_arr[1][j]);
        row[2] = dv_arr[1][j].dot(dv_arr[1][j]);
        row[3] = 2.0 * dv_arr[0][j].dot(dv_arr[2][j]);
        row[4] = 2.0 * dv_arr[1][j].dot(dv_arr[2][j]);
        row[5] = dv_arr[2][j].dot(dv_arr[2][j]);
        row[6] = 2.0 * dv_arr[0][j].dot(dv_arr[3][j]);
        row[7] = 2.0 * dv_arr[1][j].dot(dv_arr[3][j]);
        row[8] = 2.0 * dv_arr[2][j].dot(dv_arr[3][j]);
        row[9] = dv_arr[3][j].dot(dv_arr[3][j]);
    }

    l
}

/// Extracts a 6×k `DMatrix` by picking the specified columns from the 6×10 `L` matrix.
fn l_submatrix(l: &[[f32; 10]; 6], cols: &[usize]) -> DMatrix<f32> {
    let data: Vec<f32> = cols
        .iter()
        .flat_map(|&c| (0..6).map(move |r| l[r][c]))
        .collect();
    DMatrix::<f32>::from_column_slice(6, cols.len(), &data)
}

/// Solve for a beta vector given a column subset of the 6×10 L matrix.
/// Returns `None` if the least-squares solve fails.
fn estimate_beta<const K: usize>(
    cols: [usize; K],
    l: &[[f32; 10]; 6],
    rho: &DVector<f32>,
    tol_svd: f32,
) -> Option<[f32; 4]> {
    let l_sub = l_submatrix(l, &cols);
    let sol = l_sub.svd(true, true).solve(rho, tol_svd).ok()?;
    let x = sol.column(0);

    match K {
        4 => {
            let scale = x[0].abs().sqrt();
            if scale < 1e-12 {
                return None;
            }
            let mut beta = [scale, x[1] / scale, x[2] / scale, x[3] / scale];
            if x[0] < 0.0 {
                for v in &mut beta {
                    *v = -*v;
                }
            }
            Some(beta)
        }
        3 => {
            let mut beta = [0.0; 4];
            if x[0] < 0.0 {
                beta[0] = (-x[0]).sqrt();
                beta[1] = if x[2] > 0.0 { 0.0 } else { (-x[2]).sqrt() };
            } else {
                beta[0] = x[0].sqrt();
                beta[1] = if x[2] < 0.0 { 0.0 } else { x[2].sqrt() };
            }
            if x[1] < 0.0 {
                beta[0] = -beta[0];
            }
            Some(beta)
        }
        5 => {
            let mut beta = [0.0; 4];
            if x[0] < 0.0 {
                beta[0] = (-x[0]).sqrt();
                beta[1] = if x[2] > 0.0 { 0.0 } else { (-x[2]).sqrt() };
                beta[2] = x[3] / (-x[0]).sqrt();
            } else {
                beta[0] = x[0].sqrt();
                beta[1] = if x[2] < 0.0 { 0.0 } else { x[2].sqrt() };
                beta[2] = x[3] / x[0].sqrt();
            }
            if x[1] < 0.0 {
                beta[0] = -beta[0];
            }
            Some(beta)
        }
        _ => None,
    }
}

const CP_PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Compute the six squared distances (ρ vector) between the 4 control points.
fn rho_ctrlpts(cw: &[[f32; 3]; 4]) -> [f32; 6] {
    CP_PAIRS.map(|(i, j)| {
        cw[i]
            .iter()
            .zip(cw[j].iter())
            .map(|(&a, &b)| (a - b).powi(2))
            .sum::<f32>()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rotation_about(axis: [f32; 3], angle: f32) -> [[f32; 3]; 3] {
        let norm = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
        let (x, y, z) = (axis[0] / norm, axis[1] / norm, axis[2] / norm);
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        [
            [c + x * x * t, x * y * t - z * s, x * z * t + y * s],
            [x * y * t + z * s, c + y * y * t, y * z * t - x * s],
            [x * z * t - y * s, y * z * t + x * s, c + z * z * t],
        ]
    }

    fn project(p: [f32; 3], r: &[[f32; 3]; 3], t: &[f32; 3], k: &[[f32; 3]; 3]) -> [f32; 2] {
        let x = r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2] + t[0];
        let y = r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2] + t[1];
        let z = r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2] + t[2];
        [k[0][0] * x / z + k[0][2], k[1][1] * y / z + k[1][2]]
    }

    fn test_scene() -> (Vec<[f32; 3]>, [[f32; 3]; 3], [f32; 3], [[f32; 3]; 3]) {
        let world = vec![
            [-0.1, -0.1, -0.1],
            [0.1, -0.1, -0.1],
            [0.1, 0.1, -0.1],
            [-0.1, 0.1, -0.1],
            [-0.1, -0.1, 0.1],
            [0.1, -0.1, 0.1],
            [0.1, 0.1, 0.1],
            [-0.1, 0.1, 0.1],
            [0.03, -0.05, 0.02],
            [-0.07, 0.02, 0.06],
        ];
        let r = rotation_about([0.2, 1.0, 0.5], 0.4);
        let t = [0.05, -0.1, 0.8];
        let k = [[800.0, 0.0, 640.0], [0.0, 800.0, 480.0], [0.0, 0.0, 1.0]];
        (world, r, t, k)
    }

    #[test]
    fn test_barycentric_reconstruction() {
        let (world, _, _, _) = test_scene();
        let cw = select_control_points(&world);
        let alphas = compute_barycentric(&world, &cw, 1e-12);

        for (p, alpha) in world.iter().zip(alphas.iter()) {
            let mut recon = [0.0; 3];
            for j in 0..4 {
                recon[0] += alpha[j] * cw[j][0];
                recon[1] += alpha[j] * cw[j][1];
                recon[2] += alpha[j] * cw[j][2];
            }
            for axis in 0..3 {
                assert_relative_eq!(recon[axis], p[axis], epsilon = 1e-5);
            }
            assert_relative_eq!(alpha.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_design_matrix_shape() {
        let (world, r, t, k) = test_scene();
        let image: Vec<[f32; 2]> = world.iter().map(|&p| project(p, &r, &t, &k)).collect();
        let cw = select_control_points(&world);
        let alphas = compute_barycentric(&world, &cw, 1e-12);

        let m = build_m(&alphas, &image, &k);
        assert_eq!(m.len(), 2 * world.len());
    }

    #[test]
    fn test_solve_epnp_recovers_pose() -> Result<(), PnPError> {
        let (world, r, t, k) = test_scene();
        let image: Vec<[f32; 2]> = world.iter().map(|&p| project(p, &r, &t, &k)).collect();

        let result = solve_epnp(&world, &image, &k, &EPnPParams::default())?;

        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(result.rotation[i][j], r[i][j], epsilon = 1e-3);
            }
            assert_relative_eq!(result.translation[i], t[i], epsilon = 1e-3);
        }
        assert!(result.reproj_rmse.unwrap_or(f32::INFINITY) < 0.5);
        Ok(())
    }

    #[test]
    fn test_solve_epnp_five_points() -> Result<(), PnPError> {
        // The robust wrapper solves minimal sets of 5, which give the design
        // matrix only 10 rows; the solver must still recover the pose.
        let (world, r, t, k) = test_scene();
        let world = world[..5].to_vec();
        let image: Vec<[f32; 2]> = world.iter().map(|&p| project(p, &r, &t, &k)).collect();

        let result = solve_epnp(&world, &image, &k, &EPnPParams::default())?;
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(result.rotation[i][j], r[i][j], epsilon = 1e-2);
            }
            assert_relative_eq!(result.translation[i], t[i], epsilon = 1e-2);
        }
        assert!(result.reproj_rmse.unwrap_or(f32::INFINITY) < 0.5);
        Ok(())
    }

    #[test]
    fn test_solve_epnp_four_points_nonplanar() -> Result<(), PnPError> {
        let (world, r, t, k) = test_scene();
        // Three base corners plus one lifted corner.
        let world = vec![world[0], world[1], world[2], world[4]];
        let image: Vec<[f32; 2]> = world.iter().map(|&p| project(p, &r, &t, &k)).collect();

        let result = solve_epnp(&world, &image, &k, &EPnPParams::default())?;
        assert!(result.reproj_rmse.unwrap_or(f32::INFINITY) < 0.5);
        for i in 0..3 {
            assert_relative_eq!(result.translation[i], t[i], epsilon = 1e-2);
        }
        Ok(())
    }

    #[test]
    fn test_solve_epnp_rejects_short_input() {
        let world = [[0.0, 0.0, 1.0], [0.1, 0.0, 1.0], [0.0, 0.1, 1.0]];
        let image = [[640.0, 480.0], [720.0, 480.0], [640.0, 560.0]];
        let k = [[800.0, 0.0, 640.0], [0.0, 800.0, 480.0], [0.0, 0.0, 1.0]];

        assert!(matches!(
            solve_epnp(&world, &image, &k, &EPnPParams::default()),
            Err(PnPError::InsufficientCorrespondences {
                required: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_solve_epnp_mismatched_lengths() {
        let world = [[0.0, 0.0, 1.0]; 5];
        let image = [[640.0, 480.0]; 4];
        let k = [[800.0, 0.0, 640.0], [0.0, 800.0, 480.0], [0.0, 0.0, 1.0]];

        assert!(matches!(
            solve_epnp(&world, &image, &k, &EPnPParams::default()),
            Err(PnPError::MismatchedArrayLengths { .. })
        ));
    }
}
