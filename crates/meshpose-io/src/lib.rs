#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Per-vertex angular atlas files.
pub mod atlas_file;

/// The legacy binary triangle-mesh format.
pub mod mesh_format;

/// Binary 4x4 pose files.
pub mod pose_file;
