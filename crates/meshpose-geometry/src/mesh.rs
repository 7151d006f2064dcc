use glam::DVec3;
use thiserror::Error;

/// Error types for mesh construction and validation.
#[derive(Debug, Error)]
pub enum MeshError {
    /// A face references a vertex index outside the vertex array.
    #[error("face {face} references vertex {index} but the mesh has {num_vertices} vertices")]
    FaceIndexOutOfBounds {
        /// Index of the offending face.
        face: usize,
        /// The out-of-bounds vertex index.
        index: u32,
        /// Number of vertices in the mesh.
        num_vertices: usize,
    },

    /// The mesh has no vertices.
    #[error("mesh has no vertices")]
    EmptyMesh,
}

/// An immutable triangle mesh: vertex positions and triangular faces.
///
/// Face indices are validated at construction time so downstream code can
/// index the vertex array without bounds failures.
#[derive(Debug, Clone)]
pub struct TriMesh {
    // The vertex positions.
    vertices: Vec<[f64; 3]>,
    // Vertex-index triples, one per triangle.
    faces: Vec<[u32; 3]>,
}

impl TriMesh {
    /// Create a new mesh from vertices and faces, validating face indices.
    pub fn new(vertices: Vec<[f64; 3]>, faces: Vec<[u32; 3]>) -> Result<Self, MeshError> {
        if vertices.is_empty() {
            return Err(MeshError::EmptyMesh);
        }
        let num_vertices = vertices.len();
        for (face, tri) in faces.iter().enumerate() {
            for &index in tri.iter() {
                if index as usize >= num_vertices {
                    return Err(MeshError::FaceIndexOutOfBounds {
                        face,
                        index,
                        num_vertices,
                    });
                }
            }
        }
        Ok(Self { vertices, faces })
    }

    /// Get the number of vertices in the mesh.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of triangular faces in the mesh.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Get as reference the vertex positions.
    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    /// Get as reference the face index triples.
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// Get the three vertex positions of a face.
    #[inline]
    pub fn face_vertices(&self, face: usize) -> [[f64; 3]; 3] {
        let [a, b, c] = self.faces[face];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    /// Per-axis minimum and maximum bounds of the vertex positions.
    pub fn extents(&self) -> ([f64; 3], [f64; 3]) {
        let first = DVec3::from_array(self.vertices[0]);
        let (min, max) = self
            .vertices
            .iter()
            .map(|&v| DVec3::from_array(v))
            .fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        (min.to_array(), max.to_array())
    }

    /// An axis-aligned cube centered at `center` with half-extent `half`,
    /// triangulated into 12 faces.
    pub fn cube(center: [f64; 3], half: f64) -> Self {
        let [cx, cy, cz] = center;
        let vertices = vec![
            [cx - half, cy - half, cz - half],
            [cx + half, cy - half, cz - half],
            [cx + half, cy + half, cz - half],
            [cx - half, cy + half, cz - half],
            [cx - half, cy - half, cz + half],
            [cx + half, cy - half, cz + half],
            [cx + half, cy + half, cz + half],
            [cx - half, cy + half, cz + half],
        ];
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [1, 2, 6],
            [1, 6, 5],
            [3, 0, 4],
            [3, 4, 7],
        ];
        // Indices are constructed in range, so validation cannot fail.
        Self { vertices, faces }
    }
}
