use nalgebra::{Matrix3, Point2, Point3, Vector3, Vector4};

// fixed-point passes when removing lens distortion
const UNDISTORT_ITERATIONS: usize = 5;

/// Approximate pinhole intrinsics derived from the frame size.
///
/// The focal length is the frame width. The principal point puts half the
/// frame *height* in the x slot and half the *width* in the y slot; the
/// posture thresholds are tuned against this layout, so keep it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    pub focal: f64,
    pub cx: f64,
    pub cy: f64,
    /// Brown-Conrady `(k1, k2, p1, p2)`.
    pub distortion: Vector4<f64>,
}

impl CameraModel {
    /// Intrinsics for a `width` x `height` frame, with no lens distortion.
    pub fn from_frame(width: u32, height: u32) -> Self {
        Self {
            focal: width as f64,
            cx: height as f64 / 2.0,
            cy: width as f64 / 2.0,
            distortion: Vector4::zeros(),
        }
    }

    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal, 0.0, self.cx, //
            0.0, self.focal, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Projects a camera-frame point to pixels. `None` on or behind the image plane.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= f64::EPSILON {
            return None;
        }
        let distorted = self.distort(&Point2::new(p.x / p.z, p.y / p.z));
        let px = self.k_matrix() * Vector3::new(distorted.x, distorted.y, 1.0);
        Some(Point2::new(px.x, px.y))
    }

    /// Pixel to normalized, undistorted image coordinates.
    pub fn normalize(&self, p: &Point2<f64>) -> Point2<f64> {
        let k = self.k_matrix();
        let distorted = Point2::new((p.x - k[(0, 2)]) / k[(0, 0)], (p.y - k[(1, 2)]) / k[(1, 1)]);
        self.undistort(&distorted)
    }

    fn distort(&self, p: &Point2<f64>) -> Point2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.distortion[0] + r2 * self.distortion[1]);
        let (dx, dy) = self.tangential(x, y, r2);
        Point2::new(x * radial + dx, y * radial + dy)
    }

    // inverts `distort` by fixed-point iteration, exact when there is no distortion
    fn undistort(&self, distorted: &Point2<f64>) -> Point2<f64> {
        let mut p = *distorted;
        if self.distortion == Vector4::zeros() {
            return p;
        }
        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = p.x * p.x + p.y * p.y;
            let radial = 1.0 + r2 * (self.distortion[0] + r2 * self.distortion[1]);
            let (dx, dy) = self.tangential(p.x, p.y, r2);
            p = Point2::new((distorted.x - dx) / radial, (distorted.y - dy) / radial);
        }
        p
    }

    fn tangential(&self, x: f64, y: f64, r2: f64) -> (f64, f64) {
        let (p1, p2) = (self.distortion[2], self.distortion[3]);
        (
            2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
            p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y,
        )
    }
}
