//! Binary 4x4 pose files: sixteen little-endian `f64` values, row-major.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Error types for pose file parsing.
#[derive(Debug, Error)]
pub enum PoseIoError {
    /// An error occurred while reading or writing the file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The last matrix row is not `(0, 0, 0, 1)`.
    #[error("pose file bottom row is not (0, 0, 0, 1)")]
    NotRigid,
}

/// Parse a 4x4 pose from a reader.
pub fn read_pose<R: Read>(reader: &mut R) -> Result<[[f64; 4]; 4], PoseIoError> {
    let mut pose = [[0.0; 4]; 4];
    let mut bytes = [0u8; 8];
    for row in &mut pose {
        for value in row.iter_mut() {
            reader.read_exact(&mut bytes)?;
            *value = f64::from_le_bytes(bytes);
        }
    }
    if pose[3] != [0.0, 0.0, 0.0, 1.0] {
        return Err(PoseIoError::NotRigid);
    }
    Ok(pose)
}

/// Parse a 4x4 pose from a file.
pub fn read_pose_file(path: impl AsRef<Path>) -> Result<[[f64; 4]; 4], PoseIoError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_pose(&mut reader)
}

/// Serialize a 4x4 pose into a writer.
pub fn write_pose<W: Write>(writer: &mut W, pose: &[[f64; 4]; 4]) -> Result<(), PoseIoError> {
    for row in pose {
        for value in row {
            writer.write_all(&value.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Serialize a 4x4 pose into a file.
pub fn write_pose_file(path: impl AsRef<Path>, pose: &[[f64; 4]; 4]) -> Result<(), PoseIoError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_pose(&mut writer, pose)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() -> Result<(), PoseIoError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pose.bin");

        let pose = [
            [0.0, -1.0, 0.0, 1.5],
            [1.0, 0.0, 0.0, -2.5],
            [0.0, 0.0, 1.0, 10.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        write_pose_file(&path, &pose)?;
        let parsed = read_pose_file(&path)?;
        assert_eq!(parsed, pose);
        Ok(())
    }

    #[test]
    fn test_non_rigid_bottom_row_rejected() {
        let mut pose = [[0.0; 4]; 4];
        pose[3] = [0.0, 0.0, 0.1, 1.0];

        let mut buffer = Vec::new();
        write_pose(&mut buffer, &pose).unwrap();
        assert!(matches!(
            read_pose(&mut buffer.as_slice()),
            Err(PoseIoError::NotRigid)
        ));
    }

    #[test]
    fn test_truncated_file_errors() {
        let buffer = vec![0u8; 100];
        assert!(matches!(
            read_pose(&mut buffer.as_slice()),
            Err(PoseIoError::Io(_))
        ));
    }
}
