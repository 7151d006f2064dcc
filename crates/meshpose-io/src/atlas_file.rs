//! Per-vertex angular atlas files.
//!
//! Layout is little-endian: a `u32` vertex count followed by one
//! `(longitude, latitude)` pair of `f64` values per vertex. Undefined
//! vertices carry negative sentinel coordinates, matching
//! [`meshpose_geometry::atlas::VertexAtlas`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use meshpose_geometry::atlas::VertexAtlas;
use thiserror::Error;

/// Error types for atlas file parsing.
#[derive(Debug, Error)]
pub enum AtlasIoError {
    /// An error occurred while reading or writing the file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parse an atlas from a reader.
pub fn read_atlas<R: Read>(reader: &mut R) -> Result<VertexAtlas, AtlasIoError> {
    let mut count_bytes = [0u8; 4];
    reader.read_exact(&mut count_bytes)?;
    let count = u32::from_le_bytes(count_bytes) as usize;

    let mut coords = Vec::with_capacity(count);
    let mut bytes = [0u8; 8];
    for _ in 0..count {
        reader.read_exact(&mut bytes)?;
        let lon = f64::from_le_bytes(bytes);
        reader.read_exact(&mut bytes)?;
        let lat = f64::from_le_bytes(bytes);
        coords.push([lon, lat]);
    }
    Ok(VertexAtlas::new(coords))
}

/// Parse an atlas from a file.
pub fn read_atlas_file(path: impl AsRef<Path>) -> Result<VertexAtlas, AtlasIoError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_atlas(&mut reader)
}

/// Serialize an atlas into a writer.
pub fn write_atlas<W: Write>(writer: &mut W, atlas: &VertexAtlas) -> Result<(), AtlasIoError> {
    writer.write_all(&(atlas.len() as u32).to_le_bytes())?;
    for coord in atlas.coords() {
        writer.write_all(&coord[0].to_le_bytes())?;
        writer.write_all(&coord[1].to_le_bytes())?;
    }
    Ok(())
}

/// Serialize an atlas into a file.
pub fn write_atlas_file(path: impl AsRef<Path>, atlas: &VertexAtlas) -> Result<(), AtlasIoError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_atlas(&mut writer, atlas)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() -> Result<(), AtlasIoError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("surface.atlas");

        let atlas = VertexAtlas::new(vec![[0.0, 0.5], [0.25, 1.0], [-1.0, -1.0]]);
        write_atlas_file(&path, &atlas)?;
        let parsed = read_atlas_file(&path)?;

        assert_eq!(parsed.coords(), atlas.coords());
        assert!(parsed.is_defined(0));
        assert!(!parsed.is_defined(2));
        Ok(())
    }

    #[test]
    fn test_truncated_file_errors() {
        let mut buffer = Vec::new();
        write_atlas(&mut buffer, &VertexAtlas::new(vec![[0.0, 0.5]; 4])).unwrap();
        buffer.truncate(buffer.len() - 1);
        assert!(matches!(
            read_atlas(&mut buffer.as_slice()),
            Err(AtlasIoError::Io(_))
        ));
    }
}
