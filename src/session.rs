//! Per-frame pipeline: landmarks, pose, distance, calibration, verdict, timer.

use std::time::{Duration, Instant};

use image::RgbImage;
use nalgebra::Point2;

use crate::calibration::CalibrationState;
use crate::config::MonitorConfig;
use crate::distance;
use crate::error::Result;
use crate::face::{LandmarkRole, LandmarkSet};
use crate::face_landmarks::LandmarkProvider;
use crate::features::{self, MODEL_ROLES};
use crate::pose::{self, CameraModel, PoseEstimate};
use crate::posture::{self, PostureHooks, PostureTimer};

/// What was measured for one face.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceReport {
    /// Raw pose; `None` when the solver failed.
    pub pose: Option<PoseEstimate>,
    /// `None` when the pupils were degenerate.
    pub distance_cm: Option<f64>,
    /// Pose relative to the baseline, once calibrated.
    pub adjusted: Option<PoseEstimate>,
    /// Verdict, once calibrated and measured.
    pub bad: Option<bool>,
    /// Pixel positions of the pose and pupil landmarks, for drawing.
    pub landmarks_px: Vec<Point2<f32>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub faces: Vec<FaceReport>,
    pub calibrated: bool,
    pub calibration_pending: bool,
    pub bad_posture_time: Duration,
}

/// Owns the landmark provider and all per-session state.
///
/// Frames must be fed in capture order; the baseline is written at most once.
pub struct PostureMonitor<P, H> {
    provider: P,
    hooks: H,
    config: MonitorConfig,
    calibration: CalibrationState,
    timer: PostureTimer,
    calibration_pending: bool,
}

impl<P: LandmarkProvider, H: PostureHooks> PostureMonitor<P, H> {
    pub fn new(provider: P, hooks: H, config: MonitorConfig) -> Self {
        let timer = PostureTimer::new(config.sustained_after());
        Self {
            provider,
            hooks,
            config,
            calibration: CalibrationState::default(),
            timer,
            calibration_pending: false,
        }
    }

    pub fn calibration(&self) -> &CalibrationState {
        &self.calibration
    }

    pub fn timer(&self) -> &PostureTimer {
        &self.timer
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Asks for a baseline. It is taken from the next face with a valid pose
    /// and distance.
    pub fn request_calibration(&mut self) {
        if self.calibration.is_calibrated() {
            log::debug!("Already calibrated, ignoring request");
            return;
        }
        if !self.calibration_pending {
            log::info!("Calibration requested");
        }
        self.calibration_pending = true;
    }

    /// Processes one frame taken at `now`.
    ///
    /// Only fatal errors are returned. A failing provider call is logged and
    /// the frame skipped.
    pub fn process_frame(&mut self, frame: &RgbImage, now: Instant) -> Result<FrameReport> {
        let faces = match self.provider.detect(frame) {
            Ok(faces) => faces,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("Landmark detection failed, skipping frame: {}", e);
                Vec::new()
            }
        };

        let (width, height) = frame.dimensions();
        let camera = CameraModel::from_frame(width, height);

        let faces = faces
            .iter()
            .map(|landmarks| self.process_face(landmarks, &camera, width, height, now))
            .collect();

        Ok(FrameReport {
            faces,
            calibrated: self.calibration.is_calibrated(),
            calibration_pending: self.calibration_pending,
            bad_posture_time: self.timer.elapsed(),
        })
    }

    fn process_face(
        &mut self,
        landmarks: &LandmarkSet,
        camera: &CameraModel,
        width: u32,
        height: u32,
        now: Instant,
    ) -> FaceReport {
        let features = features::extract(landmarks, width, height);

        let mut report = FaceReport {
            landmarks_px: drawn_roles()
                .map(|role| {
                    let p = landmarks.pixel(role, width, height);
                    Point2::new(p.x as f32, p.y as f32)
                })
                .collect(),
            ..Default::default()
        };

        report.pose = match pose::solve_pose(&features.correspondence, camera) {
            Ok(pose) => Some(pose),
            Err(e) => {
                log::debug!("No pose for face: {}", e);
                None
            }
        };
        report.distance_cm =
            distance::estimate(&features.pupils, width, self.config.pupillary_distance_cm);
        if report.distance_cm.is_none() {
            log::debug!("Degenerate pupil distance");
        }

        let (Some(pose), Some(distance_cm)) = (report.pose, report.distance_cm) else {
            return report;
        };

        if self.calibration_pending {
            self.calibration.calibrate(pose, distance_cm);
            self.calibration_pending = false;
        }

        if let Some(baseline) = self.calibration.baseline().copied() {
            let adjusted = pose.relative_to(&baseline.pose);
            let bad = posture::is_bad(
                &adjusted,
                distance_cm,
                baseline.distance_cm,
                &self.config.thresholds,
            );
            self.timer.update(bad, now, &mut self.hooks);

            report.adjusted = Some(adjusted);
            report.bad = Some(bad);
        }

        report
    }
}

fn drawn_roles() -> impl Iterator<Item = LandmarkRole> {
    MODEL_ROLES
        .into_iter()
        .chain([LandmarkRole::LeftPupil, LandmarkRole::RightPupil])
}
