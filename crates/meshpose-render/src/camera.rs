use glam::DVec3;
use thiserror::Error;

/// Error types for camera construction and use.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The camera position coincides with its focal point.
    #[error("camera position and focal point coincide")]
    DegenerateViewDirection,

    /// The view-up vector is parallel to the view direction.
    #[error("view-up vector is parallel to the view direction")]
    DegenerateViewUp,

    /// The image plane has a zero dimension.
    #[error("image dimensions must be non-zero, got {width}x{height}")]
    ZeroImageSize {
        /// Requested image width in pixels.
        width: usize,
        /// Requested image height in pixels.
        height: usize,
    },
}

/// A pinhole camera: square-pixel intrinsics plus look-at extrinsics.
///
/// The camera frame follows the computer-vision convention: +z points from
/// the camera toward the scene along the view direction, +x right, +y down.
/// With the camera at the origin looking toward `(0, 0, 1)` with view-up
/// `(0, -1, 0)` the world-to-camera rotation is the identity.
#[derive(Debug, Clone)]
pub struct Camera {
    focal_length: f64,
    principal_point: [f64; 2],
    width: usize,
    height: usize,
    position: [f64; 3],
    focal_point: [f64; 3],
    view_up: [f64; 3],
}

impl Camera {
    /// Create a camera from its intrinsic and extrinsic parameters.
    ///
    /// # Arguments
    ///
    /// * `focal_length` - Focal length in pixels, shared by both axes.
    /// * `principal_point` - Principal point `(cx, cy)` in pixels.
    /// * `width` - Image width in pixels.
    /// * `height` - Image height in pixels.
    /// * `position` - Camera center in world coordinates.
    /// * `focal_point` - World point the camera looks at.
    /// * `view_up` - Approximate up direction in world coordinates.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        focal_length: f64,
        principal_point: [f64; 2],
        width: usize,
        height: usize,
        position: [f64; 3],
        focal_point: [f64; 3],
        view_up: [f64; 3],
    ) -> Result<Self, CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::ZeroImageSize { width, height });
        }
        let camera = Self {
            focal_length,
            principal_point,
            width,
            height,
            position,
            focal_point,
            view_up,
        };
        // Validate the extrinsics eagerly so render calls cannot fail late.
        camera.view_rotation()?;
        Ok(camera)
    }

    /// A camera with the principal point at the image center.
    pub fn centered(
        focal_length: f64,
        width: usize,
        height: usize,
        position: [f64; 3],
        focal_point: [f64; 3],
        view_up: [f64; 3],
    ) -> Result<Self, CameraError> {
        Self::new(
            focal_length,
            [width as f64 / 2.0, height as f64 / 2.0],
            width,
            height,
            position,
            focal_point,
            view_up,
        )
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Camera center in world coordinates.
    #[inline]
    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    /// The 3x3 intrinsics matrix `K`.
    pub fn intrinsics(&self) -> [[f64; 3]; 3] {
        let [cx, cy] = self.principal_point;
        [
            [self.focal_length, 0.0, cx],
            [0.0, self.focal_length, cy],
            [0.0, 0.0, 1.0],
        ]
    }

    /// The world-to-camera rotation derived from the look-at parameters.
    ///
    /// Rows are the camera's x (right), y (down) and z (forward) axes
    /// expressed in world coordinates.
    pub fn view_rotation(&self) -> Result<[[f64; 3]; 3], CameraError> {
        let position = DVec3::from_array(self.position);
        let focal_point = DVec3::from_array(self.focal_point);
        let view_up = DVec3::from_array(self.view_up);

        let forward = focal_point - position;
        if forward.length_squared() < 1e-20 {
            return Err(CameraError::DegenerateViewDirection);
        }
        let z = forward.normalize();

        // Image-down is the negated view-up, orthogonalized against forward.
        let down = -view_up - (-view_up).dot(z) * z;
        if down.length_squared() < 1e-20 {
            return Err(CameraError::DegenerateViewUp);
        }
        let y = down.normalize();
        let x = y.cross(z);

        Ok([x.to_array(), y.to_array(), z.to_array()])
    }

    /// Map a world point into the camera frame.
    pub fn world_to_camera(&self, p: [f64; 3]) -> Result<[f64; 3], CameraError> {
        let r = self.view_rotation()?;
        let d = [
            p[0] - self.position[0],
            p[1] - self.position[1],
            p[2] - self.position[2],
        ];
        Ok([
            r[0][0] * d[0] + r[0][1] * d[1] + r[0][2] * d[2],
            r[1][0] * d[0] + r[1][1] * d[1] + r[1][2] * d[2],
            r[2][0] * d[0] + r[2][1] * d[1] + r[2][2] * d[2],
        ])
    }

    /// Project a camera-frame point to continuous pixel coordinates.
    ///
    /// Returns `None` for points at or behind the camera plane.
    #[inline]
    pub fn project(&self, p_cam: [f64; 3]) -> Option<[f64; 2]> {
        if p_cam[2] <= 1e-6 {
            return None;
        }
        let [cx, cy] = self.principal_point;
        Some([
            self.focal_length * p_cam[0] / p_cam[2] + cx,
            self.focal_length * p_cam[1] / p_cam[2] + cy,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reference_camera() -> Camera {
        Camera::centered(
            2015.0,
            1920,
            1080,
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, -1.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_reference_orientation_is_identity() {
        let camera = reference_camera();
        let r = camera.view_rotation().unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(r[i][j], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_project_principal_ray() {
        let camera = reference_camera();
        let pixel = camera.project([0.0, 0.0, 5.0]).unwrap();
        assert_relative_eq!(pixel[0], 960.0);
        assert_relative_eq!(pixel[1], 540.0);
    }

    #[test]
    fn test_project_behind_camera() {
        let camera = reference_camera();
        assert!(camera.project([0.0, 0.0, -1.0]).is_none());
        assert!(camera.project([0.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_degenerate_look_at_rejected() {
        let err = Camera::centered(
            100.0,
            64,
            64,
            [1.0, 2.0, 3.0],
            [1.0, 2.0, 3.0],
            [0.0, -1.0, 0.0],
        );
        assert!(matches!(err, Err(CameraError::DegenerateViewDirection)));

        let err = Camera::centered(
            100.0,
            64,
            64,
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 1.0],
        );
        assert!(matches!(err, Err(CameraError::DegenerateViewUp)));
    }

    #[test]
    fn test_world_to_camera_translated_camera() {
        let camera = Camera::centered(
            100.0,
            64,
            64,
            [0.0, 0.0, -2.0],
            [0.0, 0.0, 1.0],
            [0.0, -1.0, 0.0],
        )
        .unwrap();
        let p = camera.world_to_camera([0.5, -0.5, 1.0]).unwrap();
        assert_relative_eq!(p[0], 0.5);
        assert_relative_eq!(p[1], -0.5);
        assert_relative_eq!(p[2], 3.0);
    }
}
