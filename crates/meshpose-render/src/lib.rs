#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Pinhole camera model with look-at extrinsics.
pub mod camera;

/// Floating-point RGB frames and binary masks.
pub mod frame;

/// Software rasterization of colored meshes.
pub mod raster;
