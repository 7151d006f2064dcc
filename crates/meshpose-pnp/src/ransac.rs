//! RANSAC-based robust wrapper for PnP solvers.

use crate::ops::{intrinsics_as_vectors, pose_to_rt, project_sq_error};
use crate::pnp::{PnPError, PnPResult};
use crate::{solve_pnp, PnPMethod};
use glam::Vec3;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// Parameters for RANSAC over PnP.
#[derive(Debug, Clone)]
pub struct RansacParams {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Pixel error threshold to classify an observation as an inlier.
    pub reproj_threshold_px: f32,
    /// Desired probability that at least one sample set is outlier-free.
    pub confidence: f32,
    /// Optional fixed seed for reproducible sampling.
    pub random_seed: Option<u64>,
    /// Whether to refit on all inliers using the base solver.
    pub refine: bool,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            reproj_threshold_px: 8.0,
            confidence: 0.999,
            random_seed: None,
            refine: true,
        }
    }
}

/// RANSAC result for PnP.
#[derive(Debug, Clone)]
pub struct PnPRansacResult {
    /// Best pose found by RANSAC.
    pub pose: PnPResult,
    /// Indices of inlier correspondences.
    pub inliers: Vec<usize>,
}

/// Solve PnP robustly using a RANSAC loop around a base PnP method.
///
/// - Minimal sample size is 5 for EPnP (4 when only 4 points available).
/// - Scoring uses Euclidean pixel reprojection error.
/// - Iterations adapt from the current inlier ratio and desired confidence.
pub fn solve_pnp_ransac(
    world: &[[f32; 3]],
    image: &[[f32; 2]],
    k: &[[f32; 3]; 3],
    base: PnPMethod,
    params: &RansacParams,
) -> Result<PnPRansacResult, PnPError> {
    let n = world.len();
    if n != image.len() {
        return Err(PnPError::MismatchedArrayLengths {
            left_name: "world points",
            left_len: world.len(),
            right_name: "image points",
            right_len: image.len(),
        });
    }
    if n < 4 {
        return Err(PnPError::InsufficientCorrespondences {
            required: 4,
            actual: n,
        });
    }

    // Minimal set size: EPnP uses 5 points (unless only 4 points available)
    let sample_size: usize = if n == 4 { 4 } else { 5 };

    let (intr_x, intr_y) = intrinsics_as_vectors(k);

    let mut rng: StdRng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut indices: Vec<usize> = (0..n).collect();
    let mut best_inliers: Vec<usize> = Vec::new();
    let mut best_pose: Option<PnPResult> = None;

    let mut iter: usize = 0;
    let mut required_iters = params.max_iterations;

    while iter < required_iters && iter < params.max_iterations {
        iter += 1;

        // Sample k unique indices without replacement.
        indices.shuffle(&mut rng);
        let sample = &indices[..sample_size];

        let mut w_min: Vec<[f32; 3]> = Vec::with_capacity(sample_size);
        let mut i_min: Vec<[f32; 2]> = Vec::with_capacity(sample_size);
        for &idx in sample.iter() {
            w_min.push(world[idx]);
            i_min.push(image[idx]);
        }

        // Estimate pose on the minimal set
        let pose_min = match solve_pnp(&w_min, &i_min, k, base.clone()) {
            Ok(p) => p,
            Err(e) => {
                log::debug!("minimal-set solve failed on iteration {iter}: {e}");
                continue;
            }
        };

        // Quick cheirality check on the minimal set (all positive depths)
        if !sample_all_positive_depths(&pose_min.rotation, &pose_min.translation, &w_min) {
            continue;
        }

        // Score the model on all points
        let inliers = classify_inliers(
            world,
            image,
            &pose_min.rotation,
            &pose_min.translation,
            &intr_x,
            &intr_y,
            params.reproj_threshold_px,
        );

        if inliers.len() > best_inliers.len() {
            best_inliers = inliers;
            best_pose = Some(pose_min);

            // Update required iterations based on the inlier ratio and sample size
            if best_inliers.len() >= sample_size {
                let w = best_inliers.len() as f32 / n as f32;
                let s = sample_size as f32;

                if w > 1e-6 {
                    let ws = w.powf(s);
                    if ws < 1.0 - 1e-12 && ws > 1e-12 {
                        let log_conf = (1.0 - params.confidence).max(1e-12).ln();
                        let log_denom = (1.0 - ws).ln();
                        if log_denom.is_finite() && log_denom != 0.0 {
                            let est = (log_conf / log_denom).ceil();
                            if est.is_finite() && est > 0.0 {
                                let est_usize = est.min(params.max_iterations as f32) as usize;
                                if est_usize < required_iters {
                                    required_iters = est_usize;
                                }
                            }
                        }
                    } else if w >= 0.95 {
                        // Very high inlier ratio, stop early
                        required_iters = iter;
                    }
                }
            }
        }
    }

    let best_pose = match best_pose {
        Some(pose) if best_inliers.len() >= 4 => pose,
        _ => {
            return Err(PnPError::InsufficientInliers {
                required: 4,
                actual: best_inliers.len(),
            })
        }
    };

    let mut final_pose = if params.refine {
        // Refit on all inliers using the base solver.
        let mut w_all = Vec::with_capacity(best_inliers.len());
        let mut i_all = Vec::with_capacity(best_inliers.len());
        for &idx in &best_inliers {
            w_all.push(world[idx]);
            i_all.push(image[idx]);
        }
        solve_pnp(&w_all, &i_all, k, base)?
    } else {
        best_pose
    };

    // Recompute reprojection error on inliers only
    let (r_mat, t_vec) = pose_to_rt(&final_pose.rotation, &final_pose.translation);
    let sum_sq: f32 = best_inliers
        .iter()
        .filter_map(|&idx| {
            project_sq_error(
                &world[idx],
                &image[idx],
                &r_mat,
                &t_vec,
                &intr_x,
                &intr_y,
                false,
            )
        })
        .sum();
    final_pose.reproj_rmse = Some((sum_sq / best_inliers.len() as f32).sqrt());

    log::debug!(
        "ransac converged after {iter} iterations with {}/{n} inliers",
        best_inliers.len()
    );

    Ok(PnPRansacResult {
        pose: final_pose,
        inliers: best_inliers,
    })
}

fn sample_all_positive_depths(r: &[[f32; 3]; 3], t: &[f32; 3], world: &[[f32; 3]]) -> bool {
    let (r_mat, t_vec) = pose_to_rt(r, t);
    world.iter().all(|pw| {
        let pc = r_mat * Vec3::from_array(*pw) + t_vec;
        pc.z > 0.0
    })
}

fn classify_inliers(
    world: &[[f32; 3]],
    image: &[[f32; 2]],
    r: &[[f32; 3]; 3],
    t: &[f32; 3],
    intr_x: &Vec3,
    intr_y: &Vec3,
    thresh_px: f32,
) -> Vec<usize> {
    let (r_mat, t_vec) = pose_to_rt(r, t);
    let thresh_sq = thresh_px * thresh_px;

    world
        .iter()
        .zip(image.iter())
        .enumerate()
        .filter_map(|(idx, (pw, uv))| {
            let err2 = project_sq_error(pw, uv, &r_mat, &t_vec, intr_x, intr_y, true)?;
            (err2 < thresh_sq).then_some(idx)
        })
        .collect()
}
