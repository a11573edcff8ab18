use nalgebra::{Point2, Point3};

use crate::error::{Error, Result};

/// Number of points in a MediaPipe face mesh with refined irises.
pub const MEDIAPIPE_TOPOLOGY_LEN: usize = 478;

// Semantic landmark roles used by the posture pipeline.
//
// The MediaPipe indices are only known here, so a different detector only
// needs a different `index()` mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkRole {
    LeftEyeOuterCorner,
    RightEyeOuterCorner,
    NoseTip,
    LeftMouthCorner,
    RightMouthCorner,
    Chin,
    LeftPupil,
    RightPupil,
}

impl LandmarkRole {
    pub fn index(self) -> usize {
        match self {
            LandmarkRole::LeftEyeOuterCorner => 33,
            LandmarkRole::RightEyeOuterCorner => 263,
            LandmarkRole::NoseTip => 1,
            LandmarkRole::LeftMouthCorner => 61,
            LandmarkRole::RightMouthCorner => 291,
            LandmarkRole::Chin => 199,
            LandmarkRole::LeftPupil => 473,
            LandmarkRole::RightPupil => 468,
        }
    }
}

/// Landmarks of one detected face, normalized to the frame.
///
/// `x` and `y` are in `[0, 1]` relative to the frame width and height, `z`
/// is the detector's relative depth. Lives for one frame.
#[derive(Debug, Clone)]
pub struct LandmarkSet {
    points: Vec<Point3<f32>>,
}

impl LandmarkSet {
    /// Wraps detector output, checking it against the MediaPipe topology.
    pub fn new(points: Vec<Point3<f32>>) -> Result<Self> {
        if points.len() < MEDIAPIPE_TOPOLOGY_LEN {
            return Err(Error::LandmarkTopology {
                required: MEDIAPIPE_TOPOLOGY_LEN,
                actual: points.len(),
            });
        }
        Ok(Self { points })
    }

    pub fn point(&self, role: LandmarkRole) -> Point3<f32> {
        self.points[role.index()]
    }

    /// Pixel position of a landmark in a `width` x `height` frame.
    pub fn pixel(&self, role: LandmarkRole, width: u32, height: u32) -> Point2<f64> {
        let p = self.point(role);
        Point2::new(p.x as f64 * width as f64, p.y as f64 * height as f64)
    }

    /// Bounding box `(x, y, w, h)` in pixels around all points.
    pub fn pixel_bbox(&self, width: u32, height: u32) -> (f32, f32, f32, f32) {
        let mut x_min = f32::MAX;
        let mut y_min = f32::MAX;
        let mut x_max = f32::MIN;
        let mut y_max = f32::MIN;

        for p in self.points.iter() {
            x_min = x_min.min(p.x);
            y_min = y_min.min(p.y);
            x_max = x_max.max(p.x);
            y_max = y_max.max(p.y);
        }

        let (w, h) = (width as f32, height as f32);
        (x_min * w, y_min * h, (x_max - x_min) * w, (y_max - y_min) * h)
    }
}
