use thiserror::Error;

use meshpose_geometry::mesh::TriMesh;
use meshpose_geometry::transforms;

use crate::camera::{Camera, CameraError};
use crate::frame::RgbFrame;

/// Points closer than this to the camera plane are not rasterized.
const NEAR_PLANE: f64 = 1e-6;

/// Error types for mesh rasterization.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The color array does not cover the mesh vertices.
    #[error("got {colors} colors for a mesh with {vertices} vertices")]
    ColorCountMismatch {
        /// Number of supplied per-vertex colors.
        colors: usize,
        /// Number of vertices in the mesh.
        vertices: usize,
    },

    /// The face filter does not cover the mesh faces.
    #[error("face filter covers {filter} faces but the mesh has {faces}")]
    FaceFilterMismatch {
        /// Length of the supplied filter.
        filter: usize,
        /// Number of faces in the mesh.
        faces: usize,
    },

    /// The camera extrinsics are degenerate.
    #[error(transparent)]
    Camera(#[from] CameraError),
}

/// Render a mesh with per-vertex colors into an RGB frame.
///
/// Vertices are transformed by `pose`, mapped into the camera frame and
/// projected through the pinhole model. Triangles are rasterized with a
/// z-buffer and perspective-correct barycentric color interpolation, sampled
/// at pixel centers. Both triangle winding orders are rendered; faces with a
/// vertex at or behind the camera plane are skipped. When `face_filter` is
/// given, only faces marked `true` are drawn.
///
/// Pixels no triangle covers keep the black background, so downstream code
/// can separate surface from background by testing for non-zero channels.
pub fn render(
    mesh: &TriMesh,
    colors: &[[f64; 3]],
    camera: &Camera,
    pose: &[[f64; 4]; 4],
    face_filter: Option<&[bool]>,
) -> Result<RgbFrame, RenderError> {
    if colors.len() != mesh.num_vertices() {
        return Err(RenderError::ColorCountMismatch {
            colors: colors.len(),
            vertices: mesh.num_vertices(),
        });
    }
    if let Some(filter) = face_filter {
        if filter.len() != mesh.num_faces() {
            return Err(RenderError::FaceFilterMismatch {
                filter: filter.len(),
                faces: mesh.num_faces(),
            });
        }
    }

    let width = camera.width();
    let height = camera.height();
    let mut frame = RgbFrame::new(width, height);
    let mut depth = vec![f64::INFINITY; width * height];

    // Per-vertex camera-frame positions and continuous pixel projections.
    let mut cam_points = Vec::with_capacity(mesh.num_vertices());
    let mut projections = Vec::with_capacity(mesh.num_vertices());
    for &vertex in mesh.vertices() {
        let posed = transforms::transform_point(pose, vertex);
        let p_cam = camera.world_to_camera(posed)?;
        projections.push(camera.project(p_cam));
        cam_points.push(p_cam);
    }

    let mut drawn = 0usize;
    for (face, tri) in mesh.faces().iter().enumerate() {
        if let Some(filter) = face_filter {
            if !filter[face] {
                continue;
            }
        }
        let idx = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (pa, pb, pc) = match (projections[idx[0]], projections[idx[1]], projections[idx[2]]) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => continue,
        };
        let z = [
            cam_points[idx[0]][2],
            cam_points[idx[1]][2],
            cam_points[idx[2]][2],
        ];
        if z.iter().any(|&zi| zi <= NEAR_PLANE) {
            continue;
        }

        // Signed twice-area; dividing the edge functions by it makes the
        // weights orientation-independent, so both windings rasterize.
        let area = (pb[0] - pa[0]) * (pc[1] - pa[1]) - (pc[0] - pa[0]) * (pb[1] - pa[1]);
        if area.abs() < 1e-12 {
            continue;
        }

        let min_col = pa[0].min(pb[0]).min(pc[0]).floor().max(0.0) as usize;
        let max_col = (pa[0].max(pb[0]).max(pc[0]).ceil() as usize).min(width.saturating_sub(1));
        let min_row = pa[1].min(pb[1]).min(pc[1]).floor().max(0.0) as usize;
        let max_row = (pa[1].max(pb[1]).max(pc[1]).ceil() as usize).min(height.saturating_sub(1));
        if min_col > max_col || min_row > max_row {
            continue;
        }

        let ca = colors[idx[0]];
        let cb = colors[idx[1]];
        let cc = colors[idx[2]];
        drawn += 1;

        for row in min_row..=max_row {
            let sy = row as f64 + 0.5;
            for col in min_col..=max_col {
                let sx = col as f64 + 0.5;

                let wb = ((sx - pa[0]) * (pc[1] - pa[1]) - (pc[0] - pa[0]) * (sy - pa[1])) / area;
                let wc = ((pb[0] - pa[0]) * (sy - pa[1]) - (sx - pa[0]) * (pb[1] - pa[1])) / area;
                let wa = 1.0 - wb - wc;
                if wa < 0.0 || wb < 0.0 || wc < 0.0 {
                    continue;
                }

                // Perspective-correct interpolation via 1/z weighting.
                let inv_z = wa / z[0] + wb / z[1] + wc / z[2];
                let sample_depth = 1.0 / inv_z;
                let buffer_index = row * width + col;
                if sample_depth >= depth[buffer_index] {
                    continue;
                }
                depth[buffer_index] = sample_depth;

                let qa = wa / z[0] / inv_z;
                let qb = wb / z[1] / inv_z;
                let qc = wc / z[2] / inv_z;
                frame.put_pixel(
                    col,
                    row,
                    [
                        (qa * ca[0] + qb * cb[0] + qc * cc[0]) as f32,
                        (qa * ca[1] + qb * cb[1] + qc * cc[1]) as f32,
                        (qa * ca[2] + qb * cb[2] + qc * cc[2]) as f32,
                    ],
                );
            }
        }
    }

    log::debug!(
        "rasterized {drawn}/{} faces into a {width}x{height} frame",
        mesh.num_faces()
    );
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use meshpose_geometry::transforms::IDENTITY;

    fn test_camera() -> Camera {
        Camera::centered(
            100.0,
            64,
            64,
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, -1.0, 0.0],
        )
        .unwrap()
    }

    fn facing_triangle() -> TriMesh {
        TriMesh::new(
            vec![[-2.0, -2.0, 10.0], [2.0, -2.0, 10.0], [0.0, 2.0, 10.0]],
            vec![[0, 1, 2]],
        )
        .unwrap()
    }

    #[test]
    fn test_render_interpolates_vertex_colors() {
        let mesh = facing_triangle();
        let colors = vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let frame = render(&mesh, &colors, &test_camera(), &IDENTITY, None).unwrap();

        assert!(frame.is_foreground(32, 32));
        // All vertices share a depth, so the weights sum to one exactly.
        let pixel = frame.pixel(32, 32);
        let total: f32 = pixel.iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-5);

        // Corners away from the triangle stay background.
        assert!(!frame.is_foreground(0, 0));
        assert!(!frame.is_foreground(63, 63));
    }

    #[test]
    fn test_render_color_count_mismatch() {
        let mesh = facing_triangle();
        let colors = vec![[1.0, 0.0, 0.0]; 2];
        assert!(matches!(
            render(&mesh, &colors, &test_camera(), &IDENTITY, None),
            Err(RenderError::ColorCountMismatch {
                colors: 2,
                vertices: 3
            })
        ));
    }

    #[test]
    fn test_render_zbuffer_occlusion() {
        // Same triangle twice, the second copy closer to the camera.
        let mesh = TriMesh::new(
            vec![
                [-2.0, -2.0, 10.0],
                [2.0, -2.0, 10.0],
                [0.0, 2.0, 10.0],
                [-1.0, -1.0, 5.0],
                [1.0, -1.0, 5.0],
                [0.0, 1.0, 5.0],
            ],
            vec![[0, 1, 2], [3, 4, 5]],
        )
        .unwrap();
        let mut colors = vec![[1.0, 0.0, 0.0]; 3];
        colors.extend(vec![[1.0, 1.0, 1.0]; 3]);

        let frame = render(&mesh, &colors, &test_camera(), &IDENTITY, None).unwrap();
        let pixel = frame.pixel(32, 32);
        assert_relative_eq!(pixel[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(pixel[1], 1.0, epsilon = 1e-5);
        assert_relative_eq!(pixel[2], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_render_both_windings() {
        let mesh = TriMesh::new(
            vec![[-2.0, -2.0, 10.0], [2.0, -2.0, 10.0], [0.0, 2.0, 10.0]],
            vec![[0, 2, 1]],
        )
        .unwrap();
        let colors = vec![[0.5, 0.5, 0.5]; 3];
        let frame = render(&mesh, &colors, &test_camera(), &IDENTITY, None).unwrap();
        assert!(frame.is_foreground(32, 32));
    }

    #[test]
    fn test_render_face_filter() {
        let mesh = facing_triangle();
        let colors = vec![[0.5, 0.5, 0.5]; 3];
        let frame = render(&mesh, &colors, &test_camera(), &IDENTITY, Some(&[false])).unwrap();
        assert_eq!(frame.num_foreground(), 0);

        assert!(matches!(
            render(&mesh, &colors, &test_camera(), &IDENTITY, Some(&[true, true])),
            Err(RenderError::FaceFilterMismatch {
                filter: 2,
                faces: 1
            })
        ));
    }

    #[test]
    fn test_render_behind_camera_is_blank() {
        let mesh = TriMesh::new(
            vec![[-2.0, -2.0, -10.0], [2.0, -2.0, -10.0], [0.0, 2.0, -10.0]],
            vec![[0, 1, 2]],
        )
        .unwrap();
        let colors = vec![[0.5, 0.5, 0.5]; 3];
        let frame = render(&mesh, &colors, &test_camera(), &IDENTITY, None).unwrap();
        assert_eq!(frame.num_foreground(), 0);
    }
}
