//! DMS configuration

use serde::{Deserialize, Serialize};

use crate::landmarks::Eye;
use crate::DmsError;

/// Which ratio decides whether the eyes are open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeMetric {
    /// Eye aspect ratio against `eye_aspect_ratio_threshold`
    #[default]
    AspectRatio,
    /// Weighted ratio against `magic_ratio_threshold`
    MagicRatio,
    /// Eye aspect ratio against each eye's calibrated threshold
    Calibrated,
}

/// DMS configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Ratio used for the eyes-open decision
    pub eye_metric: EyeMetric,

    /// Eyes count as open at or above this aspect ratio
    pub eye_aspect_ratio_threshold: f64,

    /// Eyes count as open at or above this magic ratio. Square pixels, so
    /// it depends on the distance to the camera; 500 matches an aspect
    /// ratio of 0.2 for a 50 px wide eye.
    pub magic_ratio_threshold: f64,

    /// Per-eye thresholds from calibration
    pub calibrated_threshold_left: Option<f64>,
    pub calibrated_threshold_right: Option<f64>,

    /// Mouth counts as yawning above this aspect ratio
    pub mouth_aspect_ratio_threshold: f64,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            eye_metric: EyeMetric::AspectRatio,
            eye_aspect_ratio_threshold: 0.2,
            magic_ratio_threshold: 500.0,
            calibrated_threshold_left: None,
            calibrated_threshold_right: None,
            mouth_aspect_ratio_threshold: 0.6,
        }
    }
}

impl DmsConfig {
    /// Create strict config (flags narrower eyes and smaller yawns)
    pub fn strict() -> Self {
        Self {
            eye_aspect_ratio_threshold: 0.25,
            magic_ratio_threshold: 625.0,
            mouth_aspect_ratio_threshold: 0.5,
            ..Default::default()
        }
    }

    /// Create lenient config
    pub fn lenient() -> Self {
        Self {
            eye_aspect_ratio_threshold: 0.15,
            magic_ratio_threshold: 375.0,
            mouth_aspect_ratio_threshold: 0.7,
            ..Default::default()
        }
    }

    /// Threshold the calibrated metric applies to one eye. Falls back to
    /// the aspect ratio threshold until that eye is calibrated.
    pub fn calibrated_threshold(&self, eye: Eye) -> f64 {
        let calibrated = match eye {
            Eye::Left => self.calibrated_threshold_left,
            Eye::Right => self.calibrated_threshold_right,
        };
        calibrated.unwrap_or(self.eye_aspect_ratio_threshold)
    }

    pub fn set_calibrated_threshold(&mut self, eye: Eye, threshold: Option<f64>) {
        match eye {
            Eye::Left => self.calibrated_threshold_left = threshold,
            Eye::Right => self.calibrated_threshold_right = threshold,
        }
    }

    /// Reject thresholds that can never classify sensibly
    pub fn validate(&self) -> Result<(), DmsError> {
        check_threshold("eye_aspect_ratio_threshold", self.eye_aspect_ratio_threshold)?;
        check_threshold("magic_ratio_threshold", self.magic_ratio_threshold)?;
        check_threshold("mouth_aspect_ratio_threshold", self.mouth_aspect_ratio_threshold)?;
        if let Some(t) = self.calibrated_threshold_left {
            check_threshold("calibrated_threshold_left", t)?;
        }
        if let Some(t) = self.calibrated_threshold_right {
            check_threshold("calibrated_threshold_right", t)?;
        }
        Ok(())
    }
}

pub(crate) fn check_threshold(name: &str, value: f64) -> Result<(), DmsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DmsError::Config(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )))
    }
}
