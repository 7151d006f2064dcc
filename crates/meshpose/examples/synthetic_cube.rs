//! Renders a synthetic cube under a known pose, recovers the pose from the
//! rendered colors and prints the evaluation report.
//!
//! Run with `RUST_LOG=debug` to see the per-stage progress.

use meshpose::{evaluate_pose, EncodingKind, Session};
use meshpose_geometry::mesh::TriMesh;
use meshpose_render::camera::Camera;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let camera = Camera::centered(
        2015.0,
        1920,
        1080,
        [0.0, 0.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.0, -1.0, 0.0],
    )?;

    let pose = [
        [0.64706274, -0.59506601, -0.47666158, 0.0],
        [0.01325321, 0.63386593, -0.77332939, 0.0],
        [0.76232156, 0.49407533, 0.41803756, 5.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    let mut session = Session::new(camera);
    session.insert_mesh("cube", TriMesh::cube([0.0, 0.0, 0.0], 0.25));
    session.set_transform("cube", pose)?;
    session.set_reference("cube")?;

    let report = evaluate_pose(&session, EncodingKind::Nocs, None)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
