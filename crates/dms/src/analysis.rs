//! DMS analysis results and per-frame classification

use alerting::{Condition, MonitorEvent};
use serde::{Deserialize, Serialize};

use crate::config::{DmsConfig, EyeMetric};
use crate::landmarks::Eye;
use crate::ratio::RatioSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouthState {
    Normal,
    Yawning,
}

/// Calibration progress reported while frames are analysed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CalibrationEvent {
    /// Provisional ratio; unreliable early in the session
    Progress { eye: Eye, ratio: f64 },
    /// Session finished; `ratio` is the new threshold for `eye`
    Completed { eye: Eye, ratio: f64 },
}

impl CalibrationEvent {
    pub fn eye(&self) -> Eye {
        match self {
            CalibrationEvent::Progress { eye, .. } | CalibrationEvent::Completed { eye, .. } => *eye,
        }
    }

    pub fn ratio(&self) -> f64 {
        match self {
            CalibrationEvent::Progress { ratio, .. } | CalibrationEvent::Completed { ratio, .. } => {
                *ratio
            }
        }
    }
}

/// Eyes are open if either eye clears its threshold
pub fn classify_eyes(config: &DmsConfig, ratios: &RatioSnapshot) -> EyeState {
    let open = match config.eye_metric {
        EyeMetric::AspectRatio => {
            ratios.eye_aspect_ratio_left >= config.eye_aspect_ratio_threshold
                || ratios.eye_aspect_ratio_right >= config.eye_aspect_ratio_threshold
        }
        EyeMetric::MagicRatio => {
            ratios.magic_ratio_left >= config.magic_ratio_threshold
                || ratios.magic_ratio_right >= config.magic_ratio_threshold
        }
        EyeMetric::Calibrated => {
            ratios.eye_aspect_ratio_left >= config.calibrated_threshold(Eye::Left)
                || ratios.eye_aspect_ratio_right >= config.calibrated_threshold(Eye::Right)
        }
    };
    if open {
        EyeState::Open
    } else {
        EyeState::Closed
    }
}

pub fn classify_mouth(config: &DmsConfig, ratios: &RatioSnapshot) -> MouthState {
    if ratios.mouth_aspect_ratio <= config.mouth_aspect_ratio_threshold {
        MouthState::Normal
    } else {
        MouthState::Yawning
    }
}

/// Complete analysis of one frame with a detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub ratios: RatioSnapshot,
    pub eye_state: EyeState,
    pub mouth_state: MouthState,
    /// Frame rate the monitors were fed with
    pub fps: f64,
    pub eyes_closed: MonitorEvent,
    pub yawn: MonitorEvent,
    /// Calibration updates produced by this frame
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calibration: Vec<CalibrationEvent>,
}

impl FrameAnalysis {
    fn event(&self, condition: Condition) -> MonitorEvent {
        match condition {
            Condition::EyesClosed => self.eyes_closed,
            Condition::Yawn => self.yawn,
        }
    }

    /// Conditions with an established bad run
    pub fn alerts(&self) -> Vec<Condition> {
        [Condition::EyesClosed, Condition::Yawn]
            .into_iter()
            .filter(|&c| self.event(c) != MonitorEvent::Quiet)
            .collect()
    }

    /// Check if any alerts are active
    pub fn has_alerts(&self) -> bool {
        !self.alerts().is_empty()
    }

    /// Eyes closed outranks yawning
    pub fn highest_priority_alert(&self) -> Option<Condition> {
        self.alerts().first().copied()
    }

    /// Conditions whose alarm started on this frame
    pub fn alarms_started(&self) -> impl Iterator<Item = Condition> + '_ {
        [Condition::EyesClosed, Condition::Yawn]
            .into_iter()
            .filter(move |&c| self.event(c) == MonitorEvent::AlarmStarted)
    }

    /// Latest calibration ratio for an eye, if this frame produced one
    pub fn calibration_preview(&self, eye: Eye) -> Option<f64> {
        self.calibration
            .iter()
            .rev()
            .find(|event| event.eye() == eye)
            .map(CalibrationEvent::ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratios(left: f64, right: f64, mouth: f64) -> RatioSnapshot {
        RatioSnapshot {
            eye_aspect_ratio_left: left,
            eye_aspect_ratio_right: right,
            mouth_aspect_ratio: mouth,
            // Eye 50 px wide
            magic_ratio_left: left * 2500.0,
            magic_ratio_right: right * 2500.0,
        }
    }

    #[test]
    fn test_either_eye_open_counts_as_open() {
        let config = DmsConfig::default();
        assert_eq!(classify_eyes(&config, &ratios(0.25, 0.05, 0.0)), EyeState::Open);
        assert_eq!(classify_eyes(&config, &ratios(0.05, 0.2, 0.0)), EyeState::Open);
        assert_eq!(classify_eyes(&config, &ratios(0.1, 0.1, 0.0)), EyeState::Closed);
    }

    #[test]
    fn test_metric_selection() {
        let mut config = DmsConfig {
            eye_metric: EyeMetric::MagicRatio,
            ..Default::default()
        };
        // EAR 0.15 is closed, magic 375 is closed too
        assert_eq!(classify_eyes(&config, &ratios(0.15, 0.15, 0.0)), EyeState::Closed);
        config.magic_ratio_threshold = 300.0;
        assert_eq!(classify_eyes(&config, &ratios(0.15, 0.15, 0.0)), EyeState::Open);

        config.eye_metric = EyeMetric::Calibrated;
        config.calibrated_threshold_left = Some(0.1);
        assert_eq!(classify_eyes(&config, &ratios(0.12, 0.0, 0.0)), EyeState::Open);
        // Right eye falls back to 0.2
        assert_eq!(classify_eyes(&config, &ratios(0.0, 0.15, 0.0)), EyeState::Closed);
    }

    #[test]
    fn test_mouth_threshold_is_inclusive() {
        let config = DmsConfig::default();
        assert_eq!(classify_mouth(&config, &ratios(0.3, 0.3, 0.6)), MouthState::Normal);
        assert_eq!(classify_mouth(&config, &ratios(0.3, 0.3, 0.61)), MouthState::Yawning);
    }

    #[test]
    fn test_alert_priority() {
        let analysis = FrameAnalysis {
            ratios: RatioSnapshot::default(),
            eye_state: EyeState::Closed,
            mouth_state: MouthState::Yawning,
            fps: 30.0,
            eyes_closed: MonitorEvent::Sustained,
            yawn: MonitorEvent::AlarmStarted,
            calibration: vec![
                CalibrationEvent::Progress { eye: Eye::Left, ratio: 0.2 },
                CalibrationEvent::Progress { eye: Eye::Left, ratio: 0.21 },
            ],
        };
        assert!(analysis.has_alerts());
        assert_eq!(analysis.highest_priority_alert(), Some(Condition::EyesClosed));
        assert_eq!(analysis.alarms_started().collect::<Vec<_>>(), vec![Condition::Yawn]);
        assert_eq!(analysis.calibration_preview(Eye::Left), Some(0.21));
        assert_eq!(analysis.calibration_preview(Eye::Right), None);

        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["yawn"], "alarm_started");
        assert_eq!(json["calibration"][0]["event"], "progress");
    }
}
