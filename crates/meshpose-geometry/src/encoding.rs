use thiserror::Error;

use crate::atlas::VertexAtlas;
use crate::mesh::TriMesh;

/// Error types for surface encoding.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The atlas does not cover the mesh vertex range.
    #[error("atlas covers {atlas} vertices but the mesh has {mesh}")]
    AtlasSizeMismatch {
        /// Number of vertices in the atlas.
        atlas: usize,
        /// Number of vertices in the mesh.
        mesh: usize,
    },
}

/// Per-axis bounds recorded at NOCS encode time, used to invert the encoding.
#[derive(Debug, Clone, Copy)]
pub struct NocsExtents {
    /// Per-axis minimum vertex coordinate.
    pub min: [f64; 3],
    /// Per-axis maximum vertex coordinate.
    pub max: [f64; 3],
}

impl NocsExtents {
    /// Record the per-axis bounds of a mesh.
    pub fn from_mesh(mesh: &TriMesh) -> Self {
        let (min, max) = mesh.extents();
        Self { min, max }
    }

    /// Map a vertex position into `[0, 1]` per axis.
    ///
    /// A degenerate axis (max == min, e.g. a planar mesh) encodes to a
    /// constant 0 on that axis rather than dividing by zero.
    #[inline]
    pub fn encode_point(&self, p: [f64; 3]) -> [f64; 3] {
        let mut c = [0.0; 3];
        for axis in 0..3 {
            let span = self.max[axis] - self.min[axis];
            if span > 0.0 {
                c[axis] = (p[axis] - self.min[axis]) / span;
            }
        }
        c
    }

    /// Invert [`Self::encode_point`]: map a color back to a position.
    ///
    /// On a degenerate axis every color decodes to the shared coordinate, so
    /// the inverse stays exact and NaN-free.
    #[inline]
    pub fn decode_color(&self, c: [f64; 3]) -> [f64; 3] {
        let mut p = [0.0; 3];
        for axis in 0..3 {
            p[axis] = c[axis] * (self.max[axis] - self.min[axis]) + self.min[axis];
        }
        p
    }
}

/// Encode a mesh with NOCS colors.
///
/// Returns one RGB color per vertex together with the extents needed to
/// invert the encoding. Deterministic: encoding the same mesh twice yields
/// identical colors.
pub fn encode_nocs(mesh: &TriMesh) -> (Vec<[f64; 3]>, NocsExtents) {
    let extents = NocsExtents::from_mesh(mesh);
    let colors = mesh
        .vertices()
        .iter()
        .map(|&v| extents.encode_point(v))
        .collect();
    (colors, extents)
}

/// Encode a mesh with its precomputed angular atlas.
///
/// The first two color channels carry (longitude, latitude); the third is 0.
/// Fails if the atlas vertex count does not match the mesh.
pub fn encode_latlon(mesh: &TriMesh, atlas: &VertexAtlas) -> Result<Vec<[f64; 3]>, EncodingError> {
    if atlas.len() != mesh.num_vertices() {
        return Err(EncodingError::AtlasSizeMismatch {
            atlas: atlas.len(),
            mesh: mesh.num_vertices(),
        });
    }
    Ok((0..mesh.num_vertices())
        .map(|i| {
            let [lon, lat] = atlas.lonlat(i);
            [lon, lat, 0.0]
        })
        .collect())
}

/// Whether a color set carries a usable gradient (not all colors identical).
pub fn has_gradient(colors: &[[f64; 3]]) -> bool {
    match colors.first() {
        Some(first) => colors.iter().any(|c| c != first),
        None => false,
    }
}

/// Invert the lat/lon encoding for one decoded color sample.
///
/// Scans faces in index order, keeping only faces marked valid, and tests
/// `(gx, gy)` against the triangle formed by the face's (longitude, latitude)
/// vertex pairs. On containment the same barycentric weights are applied to
/// the face's 3D vertices. When several faces contain the sample (shared
/// edges/vertices) the first face in index order wins. Returns `None` when no
/// valid face brackets the sample.
pub fn invert_latlon(
    mesh: &TriMesh,
    atlas: &VertexAtlas,
    valid_faces: &[bool],
    gx: f64,
    gy: f64,
) -> Option<[f64; 3]> {
    const EPS: f64 = 1e-9;

    for (face, tri) in mesh.faces().iter().enumerate() {
        if !valid_faces[face] {
            continue;
        }
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let [ax, ay] = atlas.lonlat(a);
        let [bx, by] = atlas.lonlat(b);
        let [cx, cy] = atlas.lonlat(c);

        let det = (bx - ax) * (cy - ay) - (cx - ax) * (by - ay);
        if det.abs() < EPS {
            continue;
        }
        let wb = ((gx - ax) * (cy - ay) - (cx - ax) * (gy - ay)) / det;
        let wc = ((bx - ax) * (gy - ay) - (gx - ax) * (by - ay)) / det;
        let wa = 1.0 - wb - wc;
        if wa < -EPS || wb < -EPS || wc < -EPS {
            continue;
        }

        let [va, vb, vc] = mesh.face_vertices(face);
        return Some([
            wa * va[0] + wb * vb[0] + wc * vc[0],
            wa * va[1] + wb * vb[1] + wc * vc[1],
            wa * va[2] + wb * vb[2] + wc * vc[2],
        ]);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad_mesh() -> TriMesh {
        TriMesh::new(
            vec![
                [0.0, 0.0, 4.0],
                [2.0, 0.0, 5.0],
                [0.0, 2.0, 5.0],
                [2.0, 2.0, 6.0],
            ],
            vec![[0, 1, 2], [1, 3, 2]],
        )
        .unwrap()
    }

    #[test]
    fn test_nocs_round_trip() {
        let mesh = TriMesh::cube([0.3, -1.2, 7.0], 0.8);
        let (colors, extents) = encode_nocs(&mesh);
        for (color, &vertex) in colors.iter().zip(mesh.vertices().iter()) {
            let decoded = extents.decode_color(*color);
            for axis in 0..3 {
                assert_relative_eq!(decoded[axis], vertex[axis], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_nocs_deterministic() {
        let mesh = TriMesh::cube([0.0, 0.0, 0.0], 1.0);
        let (a, _) = encode_nocs(&mesh);
        let (b, _) = encode_nocs(&mesh);
        assert_eq!(a, b);
    }

    #[test]
    fn test_nocs_degenerate_axis() {
        // Planar mesh: all z coordinates equal.
        let mesh = TriMesh::new(
            vec![[0.0, 0.0, 2.0], [1.0, 0.0, 2.0], [0.0, 1.0, 2.0]],
            vec![[0, 1, 2]],
        )
        .unwrap();
        let (colors, extents) = encode_nocs(&mesh);
        for color in &colors {
            assert_eq!(color[2], 0.0);
            assert!(color.iter().all(|c| c.is_finite()));
        }
        let decoded = extents.decode_color(colors[0]);
        assert!(decoded.iter().all(|p| p.is_finite()));
        assert_relative_eq!(decoded[2], 2.0);
    }

    #[test]
    fn test_latlon_size_mismatch() {
        let mesh = quad_mesh();
        let atlas = VertexAtlas::new(vec![[0.0, 0.0]; 3]);
        assert!(matches!(
            encode_latlon(&mesh, &atlas),
            Err(EncodingError::AtlasSizeMismatch { atlas: 3, mesh: 4 })
        ));
    }

    #[test]
    fn test_invert_latlon_inside_face() {
        let mesh = quad_mesh();
        let atlas = VertexAtlas::new(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let valid = atlas.face_validity(&mesh);

        // Sample at the centroid of face 0 in angular space.
        let point = invert_latlon(&mesh, &atlas, &valid, 1.0 / 3.0, 1.0 / 3.0).unwrap();
        let expected = [2.0 / 3.0, 2.0 / 3.0, 14.0 / 3.0];
        for axis in 0..3 {
            assert_relative_eq!(point[axis], expected[axis], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_invert_latlon_tie_break_first_face() {
        let mesh = quad_mesh();
        // Non-injective atlas: the two angular triangles overlap, so the
        // sample below is bracketed by both faces.
        let atlas = VertexAtlas::new(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.2, 0.2]]);
        let valid = atlas.face_validity(&mesh);

        let point = invert_latlon(&mesh, &atlas, &valid, 0.3, 0.3).unwrap();
        // Face 0 wins: weights (0.4, 0.3, 0.3) over its 3D vertices.
        let expected = [0.6, 0.6, 4.6];
        for axis in 0..3 {
            assert_relative_eq!(point[axis], expected[axis], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_invert_latlon_no_match() {
        let mesh = quad_mesh();
        let atlas = VertexAtlas::new(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let valid = atlas.face_validity(&mesh);
        assert!(invert_latlon(&mesh, &atlas, &valid, 5.0, 5.0).is_none());
    }

    #[test]
    fn test_invert_latlon_skips_invalid_faces() {
        let mesh = quad_mesh();
        // Vertex 0 undefined: face 0 invalid, face 1 still decodable.
        let atlas = VertexAtlas::new(vec![[-1.0, -1.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let valid = atlas.face_validity(&mesh);
        assert_eq!(valid, vec![false, true]);

        assert!(invert_latlon(&mesh, &atlas, &valid, 0.1, 0.1).is_none());
        assert!(invert_latlon(&mesh, &atlas, &valid, 0.9, 0.9).is_some());
    }

    #[test]
    fn test_has_gradient() {
        assert!(!has_gradient(&[]));
        assert!(!has_gradient(&[[0.5, 0.5, 0.5]; 4]));
        assert!(has_gradient(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]));
    }
}
