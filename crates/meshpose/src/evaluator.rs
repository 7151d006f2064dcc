use serde::{Deserialize, Serialize};
use thiserror::Error;

use meshpose_geometry::encoding::{encode_latlon, encode_nocs, has_gradient, EncodingError, NocsExtents};
use meshpose_geometry::transforms::{self, IDENTITY};
use meshpose_pnp::{solve_pnp_ransac, PnPMethod, RansacParams};
use meshpose_render::camera::Camera;
use meshpose_render::frame::{BinaryMask, RgbFrame};
use meshpose_render::raster::{render, RenderError};

use crate::correspondence::{
    extract_correspondences, CorrespondenceError, SurfaceDecoder,
};
use crate::session::{EncodingKind, Session, SessionError};

/// Error types for pose evaluation.
///
/// Failures surface before any session state is touched; the session is
/// read-only for the whole evaluation.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Session lookup failed (missing mesh or reference).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The reference mesh carries no color gradient to invert.
    #[error("reference surface colors are flat, nothing to invert")]
    FlatColoring,

    /// Lat/lon evaluation was requested for a mesh without an atlas.
    #[error("mesh {0:?} has no angular atlas registered")]
    MissingAtlas(String),

    /// The rendered or supplied mask contains no foreground pixels.
    #[error("color mask is blank")]
    BlankMask,

    /// No pixel decoded to a surface point.
    #[error("no 2D-3D correspondences could be extracted")]
    NoCorrespondences,

    /// Rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Surface encoding failed.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// Correspondence extraction failed.
    #[error(transparent)]
    Correspondence(#[from] CorrespondenceError),
}

/// Outcome of one pose evaluation, as plain data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseReport {
    /// The pose recovered from the correspondences.
    pub predicted_pose: [[f64; 4]; 4],
    /// The reference pose the prediction is compared against.
    pub reference_pose: [[f64; 4]; 4],
    /// Sum of absolute elementwise differences between the two poses.
    pub discrepancy: f64,
    /// Whether the solver produced a pose (false leaves the identity).
    pub success: bool,
    /// Number of 2D-3D correspondences fed to the solver.
    pub num_correspondences: usize,
}

/// Recover a pose from 2D-3D correspondences with RANSAC-wrapped EPnP.
///
/// Fewer than 4 pairs is a degenerate input, not an error: the identity pose
/// is returned with `false`. Solver failures degrade the same way. The
/// solved translation is corrected by the camera position so the pose is
/// expressed in world coordinates.
pub fn solve_pose_correspondences(
    pixels: &[[f32; 2]],
    points: &[[f64; 3]],
    camera: &Camera,
) -> ([[f64; 4]; 4], bool) {
    if pixels.len() < 4 || points.len() != pixels.len() {
        log::warn!(
            "not enough correspondences to solve a pose ({} pairs)",
            pixels.len()
        );
        return (IDENTITY, false);
    }

    let world: Vec<[f32; 3]> = points
        .iter()
        .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
        .collect();
    let k64 = camera.intrinsics();
    let mut k = [[0.0f32; 3]; 3];
    for (row, row64) in k.iter_mut().zip(k64.iter()) {
        for (value, &value64) in row.iter_mut().zip(row64.iter()) {
            *value = value64 as f32;
        }
    }

    let result = solve_pnp_ransac(
        &world,
        pixels,
        &k,
        PnPMethod::EPnPDefault,
        &RansacParams::default(),
    );
    let solved = match result {
        Ok(res) => res.pose,
        Err(e) => {
            log::warn!("pose solve failed: {e}");
            return (IDENTITY, false);
        }
    };

    let position = camera.position();
    let mut rotation = [[0.0f64; 3]; 3];
    for (row, row32) in rotation.iter_mut().zip(solved.rotation.iter()) {
        for (value, &value32) in row.iter_mut().zip(row32.iter()) {
            *value = value32 as f64;
        }
    }
    let translation = [
        solved.translation[0] as f64 + position[0],
        solved.translation[1] as f64 + position[1],
        solved.translation[2] as f64 + position[2],
    ];
    (transforms::from_rt(&rotation, &translation), true)
}

/// Evaluate the reference mesh's pose by the full render/extract/solve flow.
///
/// The reference mesh is colored with the requested encoding, rendered under
/// its current pose, decoded back to 2D-3D correspondences (optionally
/// intersected with a segmentation mask), and the recovered pose is compared
/// against the reference pose. The stages run strictly in order and the
/// first failing one aborts the evaluation; the session is never modified.
pub fn evaluate_pose(
    session: &Session,
    encoding: EncodingKind,
    seg_mask: Option<&BinaryMask>,
) -> Result<PoseReport, EvalError> {
    let entry = session.reference()?;
    let mesh = entry.mesh();

    if let Some(mask) = seg_mask {
        if mask.is_blank() {
            return Err(EvalError::BlankMask);
        }
    }

    // Stage 1: encode the surface and reject flat colorings.
    let (colors, extents, valid_faces) = match encoding {
        EncodingKind::Nocs => {
            let (colors, extents) = encode_nocs(mesh);
            (colors, Some(extents), None)
        }
        EncodingKind::LatLon => {
            let atlas = entry
                .atlas()
                .ok_or_else(|| EvalError::MissingAtlas("reference".to_string()))?;
            let colors = encode_latlon(mesh, atlas)?;
            (colors, None, Some(atlas.face_validity(mesh)))
        }
    };
    if !has_gradient(&colors) {
        return Err(EvalError::FlatColoring);
    }
    log::debug!("encoded {} vertex colors", colors.len());

    // Stage 2: render the color mask under the reference pose.
    let frame = render(
        mesh,
        &colors,
        session.camera(),
        &entry.transform(),
        valid_faces.as_deref(),
    )?;

    let decoder = match encoding {
        EncodingKind::Nocs => SurfaceDecoder::Nocs(match extents {
            Some(extents) => extents,
            None => NocsExtents::from_mesh(mesh),
        }),
        EncodingKind::LatLon => SurfaceDecoder::LatLon {
            mesh,
            // Stage 1 already established the atlas exists.
            atlas: match entry.atlas() {
                Some(atlas) => atlas,
                None => return Err(EvalError::MissingAtlas("reference".to_string())),
            },
            valid_faces: match &valid_faces {
                Some(valid) => valid.as_slice(),
                None => &[],
            },
        },
    };

    evaluate_rendered(session, &frame, &decoder, seg_mask)
}

/// Evaluate the reference pose from an already rendered color mask.
///
/// Used when the caller produced the raster elsewhere; the stages after
/// rendering are identical to [`evaluate_pose`].
pub fn evaluate_rendered(
    session: &Session,
    frame: &RgbFrame,
    decoder: &SurfaceDecoder<'_>,
    seg_mask: Option<&BinaryMask>,
) -> Result<PoseReport, EvalError> {
    let entry = session.reference()?;

    // Stage 3: reject blank masks before spending time on extraction.
    if frame.num_foreground() == 0 {
        return Err(EvalError::BlankMask);
    }

    // Stage 4: decode pixels back to surface points.
    let pairs = extract_correspondences(frame, seg_mask, decoder)?;
    if pairs.is_empty() {
        return Err(EvalError::NoCorrespondences);
    }
    log::debug!("solving pose from {} correspondences", pairs.len());

    // Stage 5: solve and report.
    let (predicted_pose, success) =
        solve_pose_correspondences(pairs.pixels(), pairs.points(), session.camera());
    let reference_pose = entry.transform();
    let discrepancy = transforms::abs_difference(&predicted_pose, &reference_pose);

    Ok(PoseReport {
        predicted_pose,
        reference_pose,
        discrepancy,
        success,
        num_correspondences: pairs.len(),
    })
}
