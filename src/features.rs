//! Turns a face's landmarks into the inputs of the pose and distance estimators.

use nalgebra::{Point2, Point3};

use crate::face::{LandmarkRole, LandmarkSet};

/// Landmarks paired with the rigid face model, in this order.
pub const MODEL_ROLES: [LandmarkRole; 6] = [
    LandmarkRole::LeftEyeOuterCorner,
    LandmarkRole::RightEyeOuterCorner,
    LandmarkRole::NoseTip,
    LandmarkRole::LeftMouthCorner,
    LandmarkRole::RightMouthCorner,
    LandmarkRole::Chin,
];

/// Rigid anthropometric face model (millimetre scale, origin at the nose
/// tip), index-matched to [`MODEL_ROLES`].
pub const FACE_MODEL_POINTS: [[f64; 3]; 6] = [
    [-165.0, 170.0, -135.0],
    [165.0, 170.0, -135.0],
    [0.0, 0.0, 0.0],
    [-150.0, -150.0, -125.0],
    [150.0, -150.0, -125.0],
    [0.0, -330.0, -65.0],
];

/// 2D pixel points and their 3D model counterparts, matched by index.
#[derive(Debug, Clone, PartialEq)]
pub struct FacialCorrespondence {
    pub image: [Point2<f64>; 6],
    pub model: [Point3<f64>; 6],
}

impl FacialCorrespondence {
    /// Pairs pixel points with the face model.
    pub fn new(image: [Point2<f64>; 6]) -> Self {
        Self {
            image,
            model: face_model(),
        }
    }
}

pub fn face_model() -> [Point3<f64>; 6] {
    FACE_MODEL_POINTS.map(|[x, y, z]| Point3::new(x, y, z))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pupils {
    pub left: Point2<f64>,
    pub right: Point2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacialFeatures {
    pub correspondence: FacialCorrespondence,
    pub pupils: Pupils,
}

/// Extracts the pose correspondence and the pupil positions for one face in
/// a `width` x `height` frame.
///
/// Pose points are truncated to whole pixels; pupils keep sub-pixel precision.
pub fn extract(landmarks: &LandmarkSet, width: u32, height: u32) -> FacialFeatures {
    let image = MODEL_ROLES.map(|role| {
        let p = landmarks.pixel(role, width, height);
        Point2::new(p.x.trunc(), p.y.trunc())
    });

    FacialFeatures {
        correspondence: FacialCorrespondence::new(image),
        pupils: Pupils {
            left: landmarks.pixel(LandmarkRole::LeftPupil, width, height),
            right: landmarks.pixel(LandmarkRole::RightPupil, width, height),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::tests::centred_landmarks;

    #[test]
    fn pose_points_follow_model_order_and_truncate() {
        let mut points = centred_landmarks();
        points[LandmarkRole::LeftEyeOuterCorner.index()] = Point3::new(0.4, 0.4, 0.0);
        points[LandmarkRole::Chin.index()] = Point3::new(0.5, 0.799, 0.0);
        let landmarks = LandmarkSet::new(points).unwrap();

        let features = extract(&landmarks, 640, 480);
        let image = features.correspondence.image;

        assert_eq!(image[0], Point2::new(256.0, 192.0));
        assert_eq!(image[2], Point2::new(320.0, 240.0));
        // 0.799 * 480 = 383.52
        assert_eq!(image[5], Point2::new(320.0, 383.0));
        assert_eq!(features.correspondence.model[5], Point3::new(0.0, -330.0, -65.0));
    }

    #[test]
    fn pupils_keep_subpixel_precision() {
        let mut points = centred_landmarks();
        points[LandmarkRole::LeftPupil.index()] = Point3::new(0.6, 0.5, 0.0);
        points[LandmarkRole::RightPupil.index()] = Point3::new(0.3, 0.5, 0.0);
        let landmarks = LandmarkSet::new(points).unwrap();

        let pupils = extract(&landmarks, 101, 100).pupils;

        assert!((pupils.left.x - 60.6).abs() < 1e-4);
        assert!((pupils.right.x - 30.3).abs() < 1e-4);
    }

    #[test]
    fn model_is_nose_centred() {
        let model = face_model();
        assert_eq!(model[2], Point3::origin());
        assert_eq!(model.len(), MODEL_ROLES.len());
    }
}
