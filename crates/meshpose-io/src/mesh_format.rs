//! Reader and writer for the legacy binary mesh format.
//!
//! The layout is little-endian: an `i32` id, the vertex and triangle counts,
//! then a discriminator `i32`. A value of `-1` announces a full header
//! (orientation, dimensions, voxel sizes and color); any other value is the
//! first component of a bare color record. Vertex coordinates follow as
//! `f32` triples, then triangle indices as `i32` triples.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use meshpose_geometry::mesh::{MeshError, TriMesh};
use thiserror::Error;

/// Error types for mesh file parsing.
#[derive(Debug, Error)]
pub enum MeshIoError {
    /// An error occurred while reading or writing the file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The file declares a negative vertex or triangle count.
    #[error("invalid mesh counts: {num_verts} vertices, {num_tris} triangles")]
    InvalidCounts {
        /// Declared vertex count.
        num_verts: i32,
        /// Declared triangle count.
        num_tris: i32,
    },

    /// A triangle references a negative vertex index.
    #[error("triangle {triangle} holds negative vertex index {index}")]
    NegativeIndex {
        /// Index of the offending triangle.
        triangle: usize,
        /// The negative vertex index.
        index: i32,
    },

    /// The mesh data is inconsistent.
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// The optional block after the counts in a mesh file.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshHeaderBlock {
    /// Full header: orientation signs, grid dimensions, voxel sizes and color.
    Full {
        /// Per-axis orientation, the sign times the axis ordinal.
        orient: [i32; 3],
        /// Grid dimensions.
        dim: [i32; 3],
        /// Per-axis voxel sizes.
        sz: [f32; 3],
        /// RGB color triple.
        color: [i32; 3],
    },
    /// Bare color record with no geometry metadata.
    ColorOnly {
        /// RGB color triple.
        color: [i32; 3],
    },
}

/// A mesh exactly as stored on disk, before any normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMesh {
    /// File format id.
    pub id: i32,
    /// The header block following the counts.
    pub header: MeshHeaderBlock,
    /// Vertex positions, one `f32` triple per vertex.
    pub vertices: Vec<[f32; 3]>,
    /// Triangle indices, one `i32` triple per triangle.
    pub triangles: Vec<[i32; 3]>,
}

impl RawMesh {
    /// The per-axis scale applied when normalizing vertices to world units.
    ///
    /// Full headers scale each axis by `sz * orient / (1, 2, 3)`, undoing the
    /// ordinal encoded into the orientation signs. Bare color headers carry
    /// no geometry metadata and scale by one.
    pub fn scale_factors(&self) -> [f64; 3] {
        match &self.header {
            MeshHeaderBlock::Full { orient, sz, .. } => [
                sz[0] as f64 * orient[0] as f64 / 1.0,
                sz[1] as f64 * orient[1] as f64 / 2.0,
                sz[2] as f64 * orient[2] as f64 / 3.0,
            ],
            MeshHeaderBlock::ColorOnly { .. } => [1.0, 1.0, 1.0],
        }
    }

    /// Convert to a validated [`TriMesh`] with normalized world-unit vertices.
    pub fn to_tri_mesh(&self) -> Result<TriMesh, MeshIoError> {
        let scale = self.scale_factors();
        let vertices = self
            .vertices
            .iter()
            .map(|v| {
                [
                    v[0] as f64 * scale[0],
                    v[1] as f64 * scale[1],
                    v[2] as f64 * scale[2],
                ]
            })
            .collect();

        let mut faces = Vec::with_capacity(self.triangles.len());
        for (triangle, tri) in self.triangles.iter().enumerate() {
            let mut face = [0u32; 3];
            for (slot, &index) in face.iter_mut().zip(tri.iter()) {
                if index < 0 {
                    return Err(MeshIoError::NegativeIndex { triangle, index });
                }
                *slot = index as u32;
            }
            faces.push(face);
        }

        Ok(TriMesh::new(vertices, faces)?)
    }
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32, MeshIoError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_le_bytes(bytes))
}

fn read_f32<R: Read>(reader: &mut R) -> Result<f32, MeshIoError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(f32::from_le_bytes(bytes))
}

/// Parse a mesh from a reader.
pub fn read_mesh<R: Read>(reader: &mut R) -> Result<RawMesh, MeshIoError> {
    let id = read_i32(reader)?;
    let num_verts = read_i32(reader)?;
    let num_tris = read_i32(reader)?;
    if num_verts < 0 || num_tris < 0 {
        return Err(MeshIoError::InvalidCounts {
            num_verts,
            num_tris,
        });
    }

    let discriminator = read_i32(reader)?;
    let header = if discriminator == -1 {
        let mut orient = [0i32; 3];
        let mut dim = [0i32; 3];
        let mut sz = [0f32; 3];
        let mut color = [0i32; 3];
        for v in &mut orient {
            *v = read_i32(reader)?;
        }
        for v in &mut dim {
            *v = read_i32(reader)?;
        }
        for v in &mut sz {
            *v = read_f32(reader)?;
        }
        for v in &mut color {
            *v = read_i32(reader)?;
        }
        MeshHeaderBlock::Full {
            orient,
            dim,
            sz,
            color,
        }
    } else {
        MeshHeaderBlock::ColorOnly {
            color: [discriminator, read_i32(reader)?, read_i32(reader)?],
        }
    };

    let mut vertices = Vec::with_capacity(num_verts as usize);
    for _ in 0..num_verts {
        vertices.push([read_f32(reader)?, read_f32(reader)?, read_f32(reader)?]);
    }

    let mut triangles = Vec::with_capacity(num_tris as usize);
    for _ in 0..num_tris {
        triangles.push([read_i32(reader)?, read_i32(reader)?, read_i32(reader)?]);
    }

    Ok(RawMesh {
        id,
        header,
        vertices,
        triangles,
    })
}

/// Parse a mesh from a file.
pub fn read_mesh_file(path: impl AsRef<Path>) -> Result<RawMesh, MeshIoError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_mesh(&mut reader)
}

/// Serialize a mesh into a writer, byte-for-byte inverse of [`read_mesh`].
pub fn write_mesh<W: Write>(writer: &mut W, mesh: &RawMesh) -> Result<(), MeshIoError> {
    writer.write_all(&mesh.id.to_le_bytes())?;
    writer.write_all(&(mesh.vertices.len() as i32).to_le_bytes())?;
    writer.write_all(&(mesh.triangles.len() as i32).to_le_bytes())?;

    match &mesh.header {
        MeshHeaderBlock::Full {
            orient,
            dim,
            sz,
            color,
        } => {
            writer.write_all(&(-1i32).to_le_bytes())?;
            for v in orient {
                writer.write_all(&v.to_le_bytes())?;
            }
            for v in dim {
                writer.write_all(&v.to_le_bytes())?;
            }
            for v in sz {
                writer.write_all(&v.to_le_bytes())?;
            }
            for v in color {
                writer.write_all(&v.to_le_bytes())?;
            }
        }
        MeshHeaderBlock::ColorOnly { color } => {
            for v in color {
                writer.write_all(&v.to_le_bytes())?;
            }
        }
    }

    for vertex in &mesh.vertices {
        for v in vertex {
            writer.write_all(&v.to_le_bytes())?;
        }
    }
    for triangle in &mesh.triangles {
        for v in triangle {
            writer.write_all(&v.to_le_bytes())?;
        }
    }

    Ok(())
}

/// Serialize a mesh into a file.
pub fn write_mesh_file(path: impl AsRef<Path>, mesh: &RawMesh) -> Result<(), MeshIoError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_mesh(&mut writer, mesh)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_mesh() -> RawMesh {
        RawMesh {
            id: 7,
            header: MeshHeaderBlock::Full {
                orient: [1, 2, 3],
                dim: [64, 64, 32],
                sz: [0.5, 0.5, 1.0],
                color: [255, 128, 0],
            },
            vertices: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
        }
    }

    #[test]
    fn test_round_trip_full_header() -> Result<(), MeshIoError> {
        let mesh = sample_mesh();
        let mut buffer = Vec::new();
        write_mesh(&mut buffer, &mesh)?;

        let parsed = read_mesh(&mut buffer.as_slice())?;
        assert_eq!(parsed, mesh);
        Ok(())
    }

    #[test]
    fn test_round_trip_color_only_header() -> Result<(), MeshIoError> {
        let mesh = RawMesh {
            header: MeshHeaderBlock::ColorOnly {
                color: [10, 20, 30],
            },
            ..sample_mesh()
        };
        let mut buffer = Vec::new();
        write_mesh(&mut buffer, &mesh)?;

        let parsed = read_mesh(&mut buffer.as_slice())?;
        assert_eq!(parsed, mesh);
        Ok(())
    }

    #[test]
    fn test_round_trip_file() -> Result<(), MeshIoError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sample.mesh");

        let mesh = sample_mesh();
        write_mesh_file(&path, &mesh)?;
        let parsed = read_mesh_file(&path)?;
        assert_eq!(parsed, mesh);
        Ok(())
    }

    #[test]
    fn test_normalization_scales_axes() -> Result<(), MeshIoError> {
        let mesh = sample_mesh();
        // orient (1, 2, 3) cancels the ordinal, leaving the voxel sizes.
        assert_eq!(mesh.scale_factors(), [0.5, 0.5, 1.0]);

        let tri = mesh.to_tri_mesh()?;
        assert_relative_eq!(tri.vertices()[1][0], 0.5);
        assert_relative_eq!(tri.vertices()[2][1], 0.5);
        assert_relative_eq!(tri.vertices()[3][2], 1.0);
        Ok(())
    }

    #[test]
    fn test_negative_index_rejected() {
        let mesh = RawMesh {
            triangles: vec![[0, -1, 2]],
            ..sample_mesh()
        };
        assert!(matches!(
            mesh.to_tri_mesh(),
            Err(MeshIoError::NegativeIndex {
                triangle: 0,
                index: -1
            })
        ));
    }

    #[test]
    fn test_truncated_file_errors() {
        let mesh = sample_mesh();
        let mut buffer = Vec::new();
        write_mesh(&mut buffer, &mesh).unwrap();
        buffer.truncate(buffer.len() - 3);

        assert!(matches!(
            read_mesh(&mut buffer.as_slice()),
            Err(MeshIoError::Io(_))
        ));
    }
}
