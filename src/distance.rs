//! Monocular head-to-camera distance from pupil spacing.

use crate::features::Pupils;

/// Population average pupillary distance in centimetres.
pub const AVERAGE_PUPILLARY_DISTANCE_CM: f64 = 6.3;

/// Estimates the head distance in centimetres using similar triangles with
/// the frame width as focal length.
///
/// Returns `None` when the pupils coincide or the spacing is not finite.
pub fn estimate(pupils: &Pupils, frame_width: u32, pupillary_distance_cm: f64) -> Option<f64> {
    let eye_px = nalgebra::distance(&pupils.left, &pupils.right);
    if !eye_px.is_finite() || eye_px <= f64::EPSILON {
        return None;
    }

    Some(frame_width as f64 / eye_px * pupillary_distance_cm)
}
