#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The pipeline encodes a mesh surface with an invertible color signal
//! (normalized coordinates or an angular atlas), renders it under a camera
//! and pose, decodes the rendered pixels back into 3D surface points, and
//! recovers the pose from the resulting 2D-3D correspondences with a robust
//! EPnP solver.

/// 2D-3D correspondence extraction from rendered color masks.
pub mod correspondence;

/// End-to-end pose evaluation against a reference pose.
pub mod evaluator;

/// Explicit session state: camera, meshes, transforms, pose history.
pub mod session;

#[doc(inline)]
pub use meshpose_geometry as geometry;

#[doc(inline)]
pub use meshpose_io as io;

#[doc(inline)]
pub use meshpose_pnp as pnp;

#[doc(inline)]
pub use meshpose_render as render;

pub use correspondence::{extract_correspondences, Correspondences, SurfaceDecoder};
pub use evaluator::{
    evaluate_pose, evaluate_rendered, solve_pose_correspondences, EvalError, PoseReport,
};
pub use session::{EncodingKind, MeshEntry, Session, SessionError};
