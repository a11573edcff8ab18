use crate::pose::PoseEstimate;

/// Reference "good posture" reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationBaseline {
    pub pose: PoseEstimate,
    pub distance_cm: f64,
}

/// One-shot calibration. Once calibrated the baseline never changes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum CalibrationState {
    #[default]
    Uncalibrated,
    Calibrated(CalibrationBaseline),
}

impl CalibrationState {
    pub fn is_calibrated(&self) -> bool {
        matches!(self, CalibrationState::Calibrated(_))
    }

    pub fn baseline(&self) -> Option<&CalibrationBaseline> {
        match self {
            CalibrationState::Uncalibrated => None,
            CalibrationState::Calibrated(baseline) => Some(baseline),
        }
    }

    /// Captures the baseline. Returns `false` if a baseline already exists,
    /// in which case nothing changes.
    pub fn calibrate(&mut self, pose: PoseEstimate, distance_cm: f64) -> bool {
        if self.is_calibrated() {
            return false;
        }

        log::info!(
            "Calibrated at pitch {}, yaw {}, roll {}, distance {:.1} cm",
            pose.pitch,
            pose.yaw,
            pose.roll,
            distance_cm
        );
        *self = CalibrationState::Calibrated(CalibrationBaseline { pose, distance_cm });
        true
    }

    /// Pose relative to the baseline; `None` while uncalibrated.
    pub fn adjust(&self, pose: &PoseEstimate) -> Option<PoseEstimate> {
        self.baseline().map(|b| pose.relative_to(&b.pose))
    }
}
