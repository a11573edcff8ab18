use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::distance::AVERAGE_PUPILLARY_DISTANCE_CM;
use crate::error::{Error, Result};
use crate::posture::PostureThresholds;

/// Tuning knobs, read from an optional TOML file. Missing keys keep their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub thresholds: PostureThresholds,
    pub pupillary_distance_cm: f64,
    /// Bad posture lasting longer than this triggers the sustained hook.
    pub sustained_bad_posture_secs: f64,
    /// Minimum face-presence score for the landmark model.
    pub face_confidence: f32,
    /// Flip frames horizontally before processing.
    pub mirror: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            thresholds: PostureThresholds::default(),
            pupillary_distance_cm: AVERAGE_PUPILLARY_DISTANCE_CM,
            sustained_bad_posture_secs: 15.0,
            face_confidence: 0.5,
            mirror: true,
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the classifier and timer cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str| Err(Error::InvalidConfig(what.to_string()));

        if !self.sustained_bad_posture_secs.is_finite() || self.sustained_bad_posture_secs < 0.0 {
            return invalid("sustained_bad_posture_secs must be a finite number >= 0");
        }
        if !self.pupillary_distance_cm.is_finite() || self.pupillary_distance_cm <= 0.0 {
            return invalid("pupillary_distance_cm must be a finite number > 0");
        }
        if !(0.0..=1.0).contains(&self.face_confidence) {
            return invalid("face_confidence must be between 0 and 1");
        }
        if self.thresholds.max_pitch_drop_deg < 0 {
            return invalid("thresholds.max_pitch_drop_deg must be >= 0");
        }
        if !self.thresholds.max_lean_in_cm.is_finite() || self.thresholds.max_lean_in_cm <= 0.0 {
            return invalid("thresholds.max_lean_in_cm must be a finite number > 0");
        }
        Ok(())
    }

    /// Saturates instead of panicking on values `validate` would reject.
    pub fn sustained_after(&self) -> Duration {
        Duration::try_from_secs_f64(self.sustained_bad_posture_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}
