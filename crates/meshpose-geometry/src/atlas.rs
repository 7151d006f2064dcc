use crate::mesh::TriMesh;

/// A precomputed angular parameterization of a mesh surface: one
/// (longitude, latitude) pair per vertex, both in `[0, 1]`.
///
/// Vertices without a defined parameterization (seams, poles) carry negative
/// sentinel values on one or both coordinates.
#[derive(Debug, Clone)]
pub struct VertexAtlas {
    // (longitude, latitude) per vertex, keyed by the mesh vertex index.
    coords: Vec<[f64; 2]>,
}

impl VertexAtlas {
    /// Create an atlas from per-vertex (longitude, latitude) pairs.
    pub fn new(coords: Vec<[f64; 2]>) -> Self {
        Self { coords }
    }

    /// Number of vertices covered by the atlas.
    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Check if the atlas is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Get as reference the per-vertex (longitude, latitude) pairs.
    pub fn coords(&self) -> &[[f64; 2]] {
        &self.coords
    }

    /// The (longitude, latitude) pair of a vertex.
    #[inline]
    pub fn lonlat(&self, vertex: usize) -> [f64; 2] {
        self.coords[vertex]
    }

    /// Whether a vertex has defined angular coordinates (both non-negative).
    #[inline]
    pub fn is_defined(&self, vertex: usize) -> bool {
        let [lon, lat] = self.coords[vertex];
        lon >= 0.0 && lat >= 0.0
    }

    /// Per-face validity mask: a face is valid iff all three of its vertices
    /// have defined angular coordinates.
    ///
    /// The atlas must cover the mesh; callers check the vertex counts first
    /// (see [`crate::encoding::encode_latlon`]).
    pub fn face_validity(&self, mesh: &TriMesh) -> Vec<bool> {
        mesh.faces()
            .iter()
            .map(|&[a, b, c]| {
                self.is_defined(a as usize)
                    && self.is_defined(b as usize)
                    && self.is_defined(c as usize)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_validity() {
        let mesh = TriMesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [1.0, 1.0, 0.0],
            ],
            vec![[0, 1, 2], [1, 3, 2]],
        )
        .unwrap();
        // Vertex 3 sits on a seam: negative longitude sentinel.
        let atlas = VertexAtlas::new(vec![
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [-1.0, 1.0],
        ]);

        let valid = atlas.face_validity(&mesh);
        assert_eq!(valid, vec![true, false]);
    }
}
