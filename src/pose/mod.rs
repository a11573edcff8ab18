//! Head pose from facial correspondences.

use std::ops::Sub;

use crate::features::FacialCorrespondence;

pub mod camera;
pub mod euler;
mod pnp;

pub use camera::CameraModel;
pub use pnp::{solve_pnp, PnpError, PnpSolution};

/// Head orientation in whole degrees.
///
/// `pitch` is positive when the head tilts up, negative when it tilts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoseEstimate {
    pub pitch: i32,
    pub yaw: i32,
    pub roll: i32,
}

impl PoseEstimate {
    pub fn new(pitch: i32, yaw: i32, roll: i32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Truncates fractional degrees toward zero.
    pub fn from_degrees(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self::new(pitch as i32, yaw as i32, roll as i32)
    }

    /// Component-wise offset from `baseline`.
    pub fn relative_to(&self, baseline: &PoseEstimate) -> PoseEstimate {
        *self - *baseline
    }
}

impl Sub for PoseEstimate {
    type Output = PoseEstimate;

    fn sub(self, rhs: Self) -> Self::Output {
        PoseEstimate::new(self.pitch - rhs.pitch, self.yaw - rhs.yaw, self.roll - rhs.roll)
    }
}

/// Moves the x angle of a camera-facing model from around +-180 to around 0.
pub fn wrap_pitch(x: f64) -> f64 {
    if x > 0.0 {
        180.0 - x
    } else {
        -180.0 - x
    }
}

/// Solves the head pose for one face.
pub fn solve_pose(
    correspondence: &FacialCorrespondence,
    camera: &CameraModel,
) -> Result<PoseEstimate, PnpError> {
    let solution = solve_pnp(&correspondence.model, &correspondence.image, camera)?;
    let (x, y, z) = euler::rq_euler_degrees(&solution.rotation);

    log::trace!(
        "pnp: rvec {:?}, t {:?}, rms {:.3}px",
        solution.rotation_vector().as_slice(),
        solution.translation.as_slice(),
        solution.rms_error
    );

    Ok(PoseEstimate::from_degrees(wrap_pitch(x), y, z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::face_model;
    use nalgebra::{Point2, Rotation3, Vector3};
    use std::f64::consts::PI;

    fn correspondence(camera: &CameraModel, rotation: Rotation3<f64>, z: f64) -> FacialCorrespondence {
        let translation = Vector3::new(0.0, 0.0, z);
        let image = face_model().map(|p| camera.project(&(rotation * p + translation)).unwrap());
        FacialCorrespondence::new(image)
    }

    #[test]
    fn wraps_pitch_around_half_turn() {
        assert_eq!(wrap_pitch(170.0), 10.0);
        assert_eq!(wrap_pitch(-170.0), -10.0);
        assert_eq!(wrap_pitch(180.0), 0.0);
        assert_eq!(wrap_pitch(0.0), -180.0);
    }

    #[test]
    fn head_tilted_up() {
        let camera = CameraModel::from_frame(640, 480);
        let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), PI - 0.2);

        let pose = solve_pose(&correspondence(&camera, rotation, 2000.0), &camera).unwrap();

        // 0.2 rad = 11.46 degrees
        assert_eq!(pose, PoseEstimate::new(11, 0, 0));
    }

    #[test]
    fn head_tilted_down() {
        let camera = CameraModel::from_frame(640, 480);
        let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), PI + 0.2);

        let pose = solve_pose(&correspondence(&camera, rotation, 2000.0), &camera).unwrap();

        assert_eq!(pose, PoseEstimate::new(-11, 0, 0));
    }

    #[test]
    fn whole_pixel_input_stays_in_range() {
        let camera = CameraModel::from_frame(1280, 720);
        let rotation = Rotation3::from_euler_angles(PI - 0.1, 0.3, 0.05);
        let mut corr = correspondence(&camera, rotation, 1500.0);
        corr.image = corr.image.map(|p| Point2::new(p.x.trunc(), p.y.trunc()));

        let pose = solve_pose(&corr, &camera).unwrap();

        for angle in [pose.pitch, pose.yaw, pose.roll] {
            assert!((-180..=180).contains(&angle));
        }
        assert!((pose.yaw - 17).abs() <= 2);
    }

    #[test]
    fn collinear_points_fail() {
        let camera = CameraModel::from_frame(640, 480);
        let image = [0, 1, 2, 3, 4, 5].map(|i| Point2::new(10.0 * i as f64, 10.0 * i as f64));

        assert!(solve_pose(&FacialCorrespondence::new(image), &camera).is_err());
    }

    #[test]
    fn relative_pose() {
        let baseline = PoseEstimate::new(5, -3, 2);
        assert_eq!(baseline.relative_to(&baseline), PoseEstimate::default());
        assert_eq!(
            PoseEstimate::new(-10, 4, 0).relative_to(&baseline),
            PoseEstimate::new(-15, 7, -2)
        );
    }
}
