#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Per-vertex angular (longitude, latitude) atlases.
pub mod atlas;

/// Surface color encodings and their inverses.
pub mod encoding;

/// Triangle mesh types.
pub mod mesh;

/// Rigid transform utilities.
pub mod transforms;
