#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Efficient Perspective-n-Point (EPnP) solver implementation.
///
/// A fast and accurate method for computing camera pose from 2D-3D
/// correspondences.
pub mod epnp;

/// Common data types and traits for PnP solvers.
pub mod pnp;

/// RANSAC-based robust PnP pose estimation.
///
/// Handles outliers in point correspondences through random sampling
/// consensus.
pub mod ransac;

pub use epnp::{EPnP, EPnPParams};
pub use pnp::{PnPError, PnPResult, PnPSolver};
pub use ransac::{solve_pnp_ransac, PnPRansacResult, RansacParams};

mod ops;

/// Enumeration of the Perspective-n-Point algorithms available in this crate.
#[derive(Debug, Clone)]
pub enum PnPMethod {
    /// Efficient PnP solver with a user-supplied parameter object.
    EPnP(EPnPParams),
    /// Efficient PnP solver with the crate's default parameters.
    EPnPDefault,
}

/// Dispatch function that routes to the chosen PnP solver.
pub fn solve_pnp(
    world: &[[f32; 3]],
    image: &[[f32; 2]],
    k: &[[f32; 3]; 3],
    method: PnPMethod,
) -> Result<PnPResult, PnPError> {
    match method {
        PnPMethod::EPnP(params) => EPnP::solve(world, image, k, &params),
        PnPMethod::EPnPDefault => EPnP::solve(world, image, k, &EPnPParams::default()),
    }
}
