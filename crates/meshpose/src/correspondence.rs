use thiserror::Error;

use meshpose_geometry::atlas::VertexAtlas;
use meshpose_geometry::encoding::{invert_latlon, NocsExtents};
use meshpose_geometry::mesh::TriMesh;
use meshpose_render::frame::{BinaryMask, RgbFrame};

/// Error types for correspondence extraction.
#[derive(Debug, Error)]
pub enum CorrespondenceError {
    /// The segmentation mask does not match the frame dimensions.
    #[error("mask is {mask_width}x{mask_height} but the frame is {frame_width}x{frame_height}")]
    MaskDimensionMismatch {
        /// Mask width in pixels.
        mask_width: usize,
        /// Mask height in pixels.
        mask_height: usize,
        /// Frame width in pixels.
        frame_width: usize,
        /// Frame height in pixels.
        frame_height: usize,
    },
}

/// Inverse of the surface color encoding used for a render.
///
/// Carries whatever context the decode needs; one decoder is used for all
/// pixels of a single extraction and encodings are never mixed.
#[derive(Debug)]
pub enum SurfaceDecoder<'a> {
    /// Invert per-axis normalized coordinates with the extents recorded at
    /// encode time.
    Nocs(NocsExtents),
    /// Invert an angular (longitude, latitude) encoding by locating the
    /// sampled face.
    LatLon {
        /// The mesh the colors were encoded from.
        mesh: &'a TriMesh,
        /// The per-vertex angular atlas.
        atlas: &'a VertexAtlas,
        /// Per-face validity, from [`VertexAtlas::face_validity`].
        valid_faces: &'a [bool],
    },
}

impl SurfaceDecoder<'_> {
    fn decode(&self, color: [f32; 3]) -> Option<[f64; 3]> {
        match self {
            SurfaceDecoder::Nocs(extents) => {
                Some(extents.decode_color([color[0] as f64, color[1] as f64, color[2] as f64]))
            }
            SurfaceDecoder::LatLon {
                mesh,
                atlas,
                valid_faces,
            } => invert_latlon(mesh, atlas, valid_faces, color[0] as f64, color[1] as f64),
        }
    }
}

/// Paired pixel and surface coordinates extracted from a rendered frame.
///
/// Pixels are `(x = column, y = row)` in row-major scan order; `points` holds
/// the decoded 3D surface point for each pixel.
#[derive(Debug, Clone, Default)]
pub struct Correspondences {
    pixels: Vec<[f32; 2]>,
    points: Vec<[f64; 3]>,
}

impl Correspondences {
    /// Number of extracted pairs.
    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Check if no pair was extracted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Get as reference the pixel coordinates.
    pub fn pixels(&self) -> &[[f32; 2]] {
        &self.pixels
    }

    /// Get as reference the decoded 3D surface points.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }
}

/// Extract 2D-3D correspondences from a rendered color frame.
///
/// Scans the frame row-major. A pixel contributes a pair when it carries
/// surface color (any non-zero channel), passes the optional segmentation
/// mask, and its color decodes to a surface point. Pixels whose color does
/// not decode (e.g. a lat/lon sample outside every valid face) are skipped,
/// so the result never exceeds the foreground pixel count.
///
/// The NOCS color of the per-axis minimum corner is exactly black, so a
/// pixel sampling that corner is indistinguishable from background and is
/// dropped with it.
pub fn extract_correspondences(
    frame: &RgbFrame,
    mask: Option<&BinaryMask>,
    decoder: &SurfaceDecoder<'_>,
) -> Result<Correspondences, CorrespondenceError> {
    if let Some(mask) = mask {
        if mask.width() != frame.width() || mask.height() != frame.height() {
            return Err(CorrespondenceError::MaskDimensionMismatch {
                mask_width: mask.width(),
                mask_height: mask.height(),
                frame_width: frame.width(),
                frame_height: frame.height(),
            });
        }
    }

    let mut pairs = Correspondences::default();
    for row in 0..frame.height() {
        for col in 0..frame.width() {
            if !frame.is_foreground(col, row) {
                continue;
            }
            if let Some(mask) = mask {
                if !mask.get(col, row) {
                    continue;
                }
            }
            if let Some(point) = decoder.decode(frame.pixel(col, row)) {
                pairs.pixels.push([col as f32, row as f32]);
                pairs.points.push(point);
            }
        }
    }

    log::debug!(
        "extracted {} correspondences from {} foreground pixels",
        pairs.len(),
        frame.num_foreground()
    );
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use meshpose_geometry::encoding::encode_nocs;

    fn frame_with_pixels(pixels: &[(usize, usize, [f32; 3])]) -> RgbFrame {
        let mut frame = RgbFrame::new(8, 6);
        for &(col, row, color) in pixels {
            frame.put_pixel(col, row, color);
        }
        frame
    }

    #[test]
    fn test_extract_decodes_nocs_colors() {
        let mesh = TriMesh::cube([1.0, 2.0, 3.0], 0.5);
        let (colors, extents) = encode_nocs(&mesh);

        // Vertex 6 is the max corner, whose color (1, 1, 1) survives the
        // foreground test.
        let frame = frame_with_pixels(&[(3, 2, [colors[6][0] as f32, colors[6][1] as f32, colors[6][2] as f32])]);
        let decoder = SurfaceDecoder::Nocs(extents);
        let pairs = extract_correspondences(&frame, None, &decoder).unwrap();

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs.pixels()[0], [3.0, 2.0]);
        for axis in 0..3 {
            assert_relative_eq!(pairs.points()[0][axis], mesh.vertices()[6][axis], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_nocs_min_corner_reads_as_background() {
        let mesh = TriMesh::cube([1.0, 2.0, 3.0], 0.5);
        let (colors, extents) = encode_nocs(&mesh);

        // The min corner encodes to exactly (0, 0, 0) and cannot be told
        // apart from an empty pixel.
        assert_eq!(colors[0], [0.0, 0.0, 0.0]);
        let frame = frame_with_pixels(&[(3, 2, [colors[0][0] as f32, colors[0][1] as f32, colors[0][2] as f32])]);
        let pairs = extract_correspondences(&frame, None, &SurfaceDecoder::Nocs(extents)).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_extract_respects_mask() {
        let frame = frame_with_pixels(&[(1, 1, [0.5; 3]), (2, 1, [0.5; 3])]);
        let extents = NocsExtents {
            min: [0.0; 3],
            max: [1.0; 3],
        };
        let decoder = SurfaceDecoder::Nocs(extents);

        let mask = BinaryMask::from_fn(8, 6, |col, _| col == 2);
        let pairs = extract_correspondences(&frame, Some(&mask), &decoder).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs.pixels()[0], [2.0, 1.0]);
    }

    #[test]
    fn test_extract_mask_dimension_mismatch() {
        let frame = RgbFrame::new(8, 6);
        let extents = NocsExtents {
            min: [0.0; 3],
            max: [1.0; 3],
        };
        let mask = BinaryMask::full(4, 4);
        assert!(matches!(
            extract_correspondences(&frame, Some(&mask), &SurfaceDecoder::Nocs(extents)),
            Err(CorrespondenceError::MaskDimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_extract_count_bounded_by_foreground() {
        // One of the two foreground pixels carries a color no face decodes.
        let mesh = TriMesh::new(
            vec![[0.0, 0.0, 4.0], [2.0, 0.0, 5.0], [0.0, 2.0, 5.0]],
            vec![[0, 1, 2]],
        )
        .unwrap();
        let atlas = VertexAtlas::new(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let valid = atlas.face_validity(&mesh);
        let decoder = SurfaceDecoder::LatLon {
            mesh: &mesh,
            atlas: &atlas,
            valid_faces: &valid,
        };

        let frame = frame_with_pixels(&[
            (0, 0, [0.25, 0.25, 0.0]),
            (1, 0, [0.9, 0.9, 0.0]), // outside the angular triangle
        ]);
        let pairs = extract_correspondences(&frame, None, &decoder).unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs.len() <= frame.num_foreground());
    }

    #[test]
    fn test_extract_row_major_order() {
        let frame = frame_with_pixels(&[(5, 3, [0.1; 3]), (1, 0, [0.2; 3]), (4, 0, [0.3; 3])]);
        let extents = NocsExtents {
            min: [0.0; 3],
            max: [1.0; 3],
        };
        let pairs =
            extract_correspondences(&frame, None, &SurfaceDecoder::Nocs(extents)).unwrap();
        let pixels: Vec<[f32; 2]> = pairs.pixels().to_vec();
        assert_eq!(pixels, vec![[1.0, 0.0], [4.0, 0.0], [5.0, 3.0]]);
    }
}
