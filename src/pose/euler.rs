//! RQ-style Euler decomposition of rotation matrices.

use nalgebra::{Matrix3, Rotation3};

/// Decomposes `r` into angles `(x, y, z)` in degrees such that
/// `r = Rz(z) * Ry(y) * Rx(x)`.
///
/// Three Givens rotations zero the sub-diagonal of `r` (x first, then y,
/// then z), the same order as an RQ decomposition. For an orthonormal input
/// the remaining upper-triangular factor is the identity, so no sign
/// ambiguity has to be resolved.
///
/// Each angle is `atan2(s, c)` of its Givens rotation, except that a zero
/// sine of either sign counts as positive. An exact half turn therefore
/// reads +180, while a sine that rounds to a tiny negative value reads close
/// to -180. Both wrap to the same pitch.
pub fn rq_euler_degrees(r: &Rotation3<f64>) -> (f64, f64, f64) {
    let mut m: Matrix3<f64> = *r.matrix();

    // x: zero m[2][1]
    let (cx, sx) = givens(m[(2, 2)], m[(2, 1)]);
    let qx = Matrix3::new(
        1.0, 0.0, 0.0, //
        0.0, cx, sx, //
        0.0, -sx, cx,
    );
    m *= qx;

    // y: zero m[2][0]
    let (cy, sy) = givens(m[(2, 2)], -m[(2, 0)]);
    let qy = Matrix3::new(
        cy, 0.0, -sy, //
        0.0, 1.0, 0.0, //
        sy, 0.0, cy,
    );
    m *= qy;

    // z: zero m[1][0]
    let (cz, sz) = givens(m[(1, 1)], m[(1, 0)]);

    (angle(cx, sx), angle(cy, sy), angle(cz, sz))
}

fn givens(c: f64, s: f64) -> (f64, f64) {
    let z = 1.0 / (c * c + s * s + f64::EPSILON).sqrt();
    (c * z, s * z)
}

// a zero sine of either sign counts as positive
fn angle(c: f64, s: f64) -> f64 {
    if s == 0.0 {
        return if c < 0.0 { 180.0 } else { 0.0 };
    }
    s.atan2(c).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::wrap_pitch;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::f64::consts::PI;

    #[test]
    fn identity_has_zero_angles() {
        let (x, y, z) = rq_euler_degrees(&Rotation3::identity());
        assert_relative_eq!(x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn recovers_zyx_composition() {
        let r = Rotation3::from_euler_angles(0.3, -0.2, 0.1);
        let (x, y, z) = rq_euler_degrees(&r);

        assert_relative_eq!(x, 0.3f64.to_degrees(), epsilon = 1e-6);
        assert_relative_eq!(y, (-0.2f64).to_degrees(), epsilon = 1e-6);
        assert_relative_eq!(z, 0.1f64.to_degrees(), epsilon = 1e-6);
    }

    #[test]
    fn exact_half_turn_reads_positive() {
        let r = Rotation3::from_matrix_unchecked(Matrix3::new(
            1.0, 0.0, 0.0, //
            0.0, -1.0, 0.0, //
            0.0, 0.0, -1.0,
        ));
        let (x, y, z) = rq_euler_degrees(&r);

        assert_relative_eq!(x, 180.0, epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(z, 0.0, epsilon = 1e-6);
        assert_relative_eq!(wrap_pitch(x), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn either_side_of_a_half_turn_wraps_to_the_same_pitch() {
        let below = Rotation3::from_axis_angle(&Vector3::x_axis(), PI - 1e-9);
        let above = Rotation3::from_axis_angle(&Vector3::x_axis(), PI + 1e-9);

        let (x_below, _, _) = rq_euler_degrees(&below);
        let (x_above, _, _) = rq_euler_degrees(&above);

        assert!(x_below > 179.0);
        assert!(x_above < -179.0);
        assert_relative_eq!(wrap_pitch(x_below), 0.0, epsilon = 1e-6);
        assert_relative_eq!(wrap_pitch(x_above), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn face_towards_camera_is_near_half_turn() {
        let r = Rotation3::from_axis_angle(&Vector3::x_axis(), PI - 0.2);
        let (x, y, z) = rq_euler_degrees(&r);

        assert_relative_eq!(x, 180.0 - 0.2f64.to_degrees(), epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(z, 0.0, epsilon = 1e-6);
    }
}
