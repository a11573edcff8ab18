//! Iterative Perspective-n-Point solver.
//!
//! A normalized DLT gives the initial pose for a non-coplanar model, then
//! Levenberg-Marquardt refines rotation vector and translation against the
//! pixel reprojection error.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::storage::Owned;
use nalgebra::{
    DMatrix, DVector, Dyn, Matrix3, Matrix3x4, Matrix4, Point2, Point3, Rotation3, Vector2, Vector3,
};
use thiserror::Error;

use super::camera::CameraModel;

const MIN_POINTS: usize = 6;
// bounds the solver to `MAX_ITERATIONS * (6 + 1)` residual evaluations
const MAX_ITERATIONS: usize = 20;

// smallest/largest variance of the image points below this is a line
const COLLINEARITY_RATIO: f64 = 1e-4;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PnpError {
    #[error("need at least 6 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point correspondences contain non-finite values")]
    NonFinite,
    #[error("degenerate point configuration")]
    DegeneratePoints,
    #[error("svd failed in PnP DLT")]
    SvdFailed,
    #[error("solution places the model behind the camera")]
    BehindCamera,
    #[error("refinement did not converge")]
    NotConverged,
}

/// Model-to-camera transform found by [`solve_pnp`].
#[derive(Debug, Clone, Copy)]
pub struct PnpSolution {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    /// Root mean square reprojection error in pixels.
    pub rms_error: f64,
}

impl PnpSolution {
    pub fn rotation_vector(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }
}

pub fn solve_pnp(
    model: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
) -> Result<PnpSolution, PnpError> {
    validate(model, image)?;

    let (rotation, translation) = dlt(model, image, camera)?;
    let initial = pack(&rotation, &translation);

    let (params, cost) = refine(model, image, camera, initial)?;
    let (rotation, translation) = unpack(&params);

    if !params.iter().all(|v| v.is_finite()) || !cost.is_finite() {
        return Err(PnpError::NotConverged);
    }
    if translation.z <= 0.0 {
        return Err(PnpError::BehindCamera);
    }

    Ok(PnpSolution {
        rotation,
        translation,
        rms_error: (cost / model.len() as f64).sqrt(),
    })
}

fn validate(model: &[Point3<f64>], image: &[Point2<f64>]) -> Result<(), PnpError> {
    if model.len() < MIN_POINTS || image.len() != model.len() {
        return Err(PnpError::NotEnoughPoints(model.len().min(image.len())));
    }

    let finite = model.iter().all(|p| p.coords.iter().all(|v| v.is_finite()))
        && image.iter().all(|p| p.coords.iter().all(|v| v.is_finite()));
    if !finite {
        return Err(PnpError::NonFinite);
    }

    // image points must span an area
    let n = image.len() as f64;
    let centroid = image.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in image {
        let dx = p.x - centroid.x;
        let dy = p.y - centroid.y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let half_trace = (sxx + syy) / 2.0;
    let spread = (((sxx - syy) / 2.0).powi(2) + sxy * sxy).sqrt();
    let largest = half_trace + spread;
    let smallest = half_trace - spread;

    if largest <= f64::EPSILON || smallest <= COLLINEARITY_RATIO * largest {
        return Err(PnpError::DegeneratePoints);
    }

    Ok(())
}

/// Normalized direct linear transform for a non-coplanar model.
fn dlt(
    model: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
) -> Result<(Rotation3<f64>, Vector3<f64>), PnpError> {
    let n = model.len();
    let centroid = model.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n as f64;
    let mean_dist = model.iter().map(|p| (p.coords - centroid).norm()).sum::<f64>() / n as f64;
    if mean_dist <= f64::EPSILON {
        return Err(PnpError::DegeneratePoints);
    }

    let scale = 3.0_f64.sqrt() / mean_dist;
    #[rustfmt::skip]
    let t_world = Matrix4::new(
        scale, 0.0, 0.0, -scale * centroid.x,
        0.0, scale, 0.0, -scale * centroid.y,
        0.0, 0.0, scale, -scale * centroid.z,
        0.0, 0.0, 0.0, 1.0,
    );

    // 2n x 12 system for P = [R | t] in normalized image coordinates
    let mut a = DMatrix::<f64>::zeros(2 * n, 12);
    for (i, (pw, pi)) in model.iter().zip(image.iter()).enumerate() {
        let w = (pw.coords - centroid) * scale;
        let uv = camera.normalize(pi);

        let r0 = 2 * i;
        let r1 = 2 * i + 1;
        for (k, v) in [w.x, w.y, w.z, 1.0].into_iter().enumerate() {
            a[(r0, k)] = v;
            a[(r1, 4 + k)] = v;
            a[(r0, 8 + k)] = -uv.x * v;
            a[(r1, 8 + k)] = -uv.y * v;
        }
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(PnpError::SvdFailed)?;
    let row = v_t.row(svd.singular_values.imin());
    let p_norm = Matrix3x4::from_row_slice(&row.iter().copied().collect::<Vec<_>>());

    let p_mtx = p_norm * t_world;
    let m: Matrix3<f64> = p_mtx.fixed_view::<3, 3>(0, 0).into_owned();

    let mut s = (m.row(0).norm() + m.row(1).norm() + m.row(2).norm()) / 3.0;
    if s <= f64::EPSILON {
        return Err(PnpError::DegeneratePoints);
    }
    if m.determinant() < 0.0 {
        s = -s;
    }

    let rotation = nearest_rotation(&(m / s))?;
    let translation = p_mtx.column(3).into_owned() / s;

    // every model point has to end up in front of the camera
    if model.iter().any(|p| (rotation * p).z + translation.z <= 0.0) {
        return Err(PnpError::BehindCamera);
    }

    Ok((rotation, translation))
}

/// Projects a 3x3 matrix onto SO(3).
fn nearest_rotation(m: &Matrix3<f64>) -> Result<Rotation3<f64>, PnpError> {
    let svd = m.svd(true, true);
    let u = svd.u.ok_or(PnpError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(PnpError::SvdFailed)?;

    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r = u_flipped * v_t;
    }
    Ok(Rotation3::from_matrix_unchecked(r))
}

fn pack(rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> DVector<f64> {
    let r = rotation.scaled_axis();
    DVector::from_column_slice(&[r.x, r.y, r.z, translation.x, translation.y, translation.z])
}

fn unpack(params: &DVector<f64>) -> (Rotation3<f64>, Vector3<f64>) {
    let rotation = Rotation3::from_scaled_axis(Vector3::new(params[0], params[1], params[2]));
    let translation = Vector3::new(params[3], params[4], params[5]);
    (rotation, translation)
}

/// Pixel reprojection error over `(rotation vector, translation)`.
struct ReprojectionProblem<'a> {
    model: &'a [Point3<f64>],
    image: &'a [Point2<f64>],
    camera: &'a CameraModel,
    params: DVector<f64>,
}

impl ReprojectionProblem<'_> {
    /// Residuals `[du0, dv0, du1, ...]`; `None` if a point falls behind the camera.
    fn residuals_at(&self, params: &DVector<f64>) -> Option<DVector<f64>> {
        let (rotation, translation) = unpack(params);
        let mut out = DVector::zeros(2 * self.model.len());

        for (i, (pw, pi)) in self.model.iter().zip(self.image.iter()).enumerate() {
            let uv = self.camera.project(&(rotation * pw + translation))?;
            out[2 * i] = uv.x - pi.x;
            out[2 * i + 1] = uv.y - pi.y;
        }
        Some(out)
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for ReprojectionProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.residuals_at(&self.params)
    }

    // central differences
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let mut jacobian = DMatrix::zeros(2 * self.model.len(), self.params.len());

        for k in 0..self.params.len() {
            let h = 1e-6 * self.params[k].abs().max(1.0);
            let mut plus = self.params.clone();
            let mut minus = self.params.clone();
            plus[k] += h;
            minus[k] -= h;

            let column = (self.residuals_at(&plus)? - self.residuals_at(&minus)?) / (2.0 * h);
            jacobian.set_column(k, &column);
        }

        Some(jacobian)
    }
}

/// Runs Levenberg-Marquardt from `initial`. Returns the refined parameters
/// and their squared reprojection error.
fn refine(
    model: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
    initial: DVector<f64>,
) -> Result<(DVector<f64>, f64), PnpError> {
    let problem = ReprojectionProblem {
        model,
        image,
        camera,
        params: initial,
    };
    if problem.residuals().is_none() {
        return Err(PnpError::BehindCamera);
    }

    let (problem, report) = LevenbergMarquardt::new()
        .with_patience(MAX_ITERATIONS)
        .minimize(problem);

    // tolerances below machine precision still leave a usable minimum
    let converged = report.termination.was_successful()
        || matches!(report.termination, TerminationReason::NoImprovementPossible(_));
    if !converged {
        log::trace!("PnP refinement stopped: {:?}", report.termination);
        return Err(PnpError::NotConverged);
    }

    let cost = problem
        .residuals()
        .map(|r| r.norm_squared())
        .ok_or(PnpError::BehindCamera)?;
    if !cost.is_finite() {
        return Err(PnpError::NotConverged);
    }
    Ok((problem.params, cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::face_model;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn project_all(
        camera: &CameraModel,
        rotation: &Rotation3<f64>,
        translation: &Vector3<f64>,
    ) -> Vec<Point2<f64>> {
        face_model()
            .iter()
            .map(|p| camera.project(&(rotation * p + translation)).unwrap())
            .collect()
    }

    fn rotation_error(a: &Rotation3<f64>, b: &Rotation3<f64>) -> f64 {
        a.rotation_to(b).angle()
    }

    #[test]
    fn recovers_synthetic_pose() {
        let camera = CameraModel::from_frame(640, 480);
        let rotation = Rotation3::from_euler_angles(PI - 0.15, 0.2, -0.05);
        let translation = Vector3::new(20.0, -10.0, 2500.0);
        let image = project_all(&camera, &rotation, &translation);

        let solution = solve_pnp(&face_model(), &image, &camera).unwrap();

        assert!(rotation_error(&solution.rotation, &rotation) < 1e-6);
        assert_relative_eq!(solution.translation, translation, epsilon = 1e-3);
        assert!(solution.rms_error < 1e-6);
    }

    #[test]
    fn refines_noisy_pixels() {
        let camera = CameraModel::from_frame(1280, 720);
        let rotation = Rotation3::from_euler_angles(PI + 0.1, -0.25, 0.1);
        let translation = Vector3::new(-40.0, 30.0, 2000.0);
        let image: Vec<_> = project_all(&camera, &rotation, &translation)
            .into_iter()
            .map(|p| Point2::new(p.x.trunc(), p.y.trunc()))
            .collect();

        let solution = solve_pnp(&face_model(), &image, &camera).unwrap();

        assert!(solution.rms_error < 1.0);
        assert!(rotation_error(&solution.rotation, &rotation) < 0.1);
    }

    #[test]
    fn refinement_converges_from_a_perturbed_start() {
        let camera = CameraModel::from_frame(640, 480);
        let rotation = Rotation3::from_euler_angles(PI - 0.2, 0.1, 0.05);
        let translation = Vector3::new(-15.0, 25.0, 2200.0);
        let image = project_all(&camera, &rotation, &translation);

        let start = Rotation3::from_euler_angles(PI - 0.1, 0.0, 0.0);
        let initial = pack(&start, &Vector3::new(0.0, 0.0, 2000.0));
        let (params, cost) = refine(&face_model(), &image, &camera, initial).unwrap();
        let (refined, moved) = unpack(&params);

        assert!(cost < 1e-8);
        assert!(rotation_error(&refined, &rotation) < 1e-6);
        assert_relative_eq!(moved, translation, epsilon = 1e-3);
    }

    #[test]
    fn refinement_rejects_a_start_behind_the_camera() {
        let camera = CameraModel::from_frame(640, 480);
        let image = project_all(
            &camera,
            &Rotation3::from_euler_angles(PI, 0.0, 0.0),
            &Vector3::new(0.0, 0.0, 2000.0),
        );

        let initial = pack(&Rotation3::identity(), &Vector3::new(0.0, 0.0, -2000.0));
        assert_eq!(
            refine(&face_model(), &image, &camera, initial).unwrap_err(),
            PnpError::BehindCamera
        );
    }

    #[test]
    fn rejects_collinear_image_points() {
        let camera = CameraModel::from_frame(640, 480);
        let image: Vec<_> = (0..6).map(|i| Point2::new(100.0 + 10.0 * i as f64, 200.0)).collect();

        assert_eq!(
            solve_pnp(&face_model(), &image, &camera).unwrap_err(),
            PnpError::DegeneratePoints
        );
    }

    #[test]
    fn rejects_coincident_image_points() {
        let camera = CameraModel::from_frame(640, 480);
        let image = vec![Point2::new(320.0, 240.0); 6];

        assert_eq!(
            solve_pnp(&face_model(), &image, &camera).unwrap_err(),
            PnpError::DegeneratePoints
        );
    }

    #[test]
    fn rejects_bad_input() {
        let camera = CameraModel::from_frame(640, 480);
        let mut image = project_all(
            &camera,
            &Rotation3::from_euler_angles(PI, 0.0, 0.0),
            &Vector3::new(0.0, 0.0, 2000.0),
        );

        assert_eq!(
            solve_pnp(&face_model()[..5], &image[..5], &camera).unwrap_err(),
            PnpError::NotEnoughPoints(5)
        );

        image[3].x = f64::NAN;
        assert_eq!(
            solve_pnp(&face_model(), &image, &camera).unwrap_err(),
            PnpError::NonFinite
        );
    }
}
