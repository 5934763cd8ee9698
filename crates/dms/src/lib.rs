//! Driver Monitoring System (DMS)
//!
//! Drowsiness analysis from facial landmarks:
//! - Eye and mouth aspect ratios, plus a centre-weighted eye ratio
//! - Eyes open/closed and mouth normal/yawning classification
//! - Debounced eyes-closed and yawn alarms
//! - Per-driver eye threshold calibration

pub mod analysis;
pub mod calibration;
pub mod config;
pub mod landmarks;
pub mod ratio;

pub use analysis::{CalibrationEvent, EyeState, FrameAnalysis, MouthState};
pub use calibration::{CalibrationPhase, CalibrationSnapshot, Calibrator};
pub use config::{DmsConfig, EyeMetric};
pub use landmarks::{Eye, FaceLandmarks, LandmarkExtractor, LandmarkSet, MeshIndices, Point, Region};
pub use ratio::RatioSnapshot;

use std::time::Instant;

use alerting::{AlertError, AudioBackend, Condition, ConditionMonitor, MonitorConfig};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::check_threshold;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("{region:?} needs {expected} landmarks, got {actual}")]
    LandmarkCount {
        region: Region,
        expected: usize,
        actual: usize,
    },

    #[error("Mesh index {index} out of range for a {mesh_len}-point mesh")]
    MeshIndex { index: usize, mesh_len: usize },

    #[error("Landmark extraction failed: {0}")]
    Extraction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Alert(#[from] AlertError),
}

/// Driver monitoring module: thresholds, both condition monitors and the
/// per-eye calibrators
#[derive(Debug)]
pub struct DmsModule {
    config: DmsConfig,
    eyes_closed: ConditionMonitor,
    yawn: ConditionMonitor,
    calibrators: [Calibrator; 2],
}

impl DmsModule {
    /// Create a new DMS module. Fails if either alarm sound cannot be loaded.
    pub fn new(
        config: DmsConfig,
        eyes_closed: &MonitorConfig,
        yawn: &MonitorConfig,
        audio: &dyn AudioBackend,
    ) -> Result<Self, DmsError> {
        config.validate()?;
        info!("Creating DMS module with config: {:?}", config);
        Ok(Self {
            eyes_closed: ConditionMonitor::new(Condition::EyesClosed, eyes_closed, audio)?,
            yawn: ConditionMonitor::new(Condition::Yawn, yawn, audio)?,
            calibrators: [Calibrator::new(Eye::Left), Calibrator::new(Eye::Right)],
            config,
        })
    }

    /// Analyze one face at the given frame rate
    pub fn analyze(&mut self, face: &FaceLandmarks, fps: f64) -> FrameAnalysis {
        self.analyze_at(face, fps, Instant::now())
    }

    pub fn analyze_at(&mut self, face: &FaceLandmarks, fps: f64, now: Instant) -> FrameAnalysis {
        let ratios = RatioSnapshot::compute(face);
        let eye_state = analysis::classify_eyes(&self.config, &ratios);
        let mouth_state = analysis::classify_mouth(&self.config, &ratios);

        let eyes_closed = self
            .eyes_closed
            .add_bounded_frame(eye_state == EyeState::Open, fps);
        let yawn = self
            .yawn
            .add_bounded_frame(mouth_state == MouthState::Normal, fps);

        let mut calibration = Vec::new();
        for eye in Eye::BOTH {
            let calibrator = &mut self.calibrators[eye.index()];
            if !calibrator.still_calibrating() {
                continue;
            }

            let mut completed = None;
            let mut progress = None;
            calibrator.update_at(
                face.eye(eye),
                now,
                |ratio| completed = Some(ratio),
                |ratio| progress = Some(ratio),
            );

            if let Some(ratio) = completed {
                if ratio.is_finite() {
                    self.config.set_calibrated_threshold(eye, Some(ratio));
                } else {
                    warn!("{:?} eye calibration produced {}, threshold unchanged", eye, ratio);
                }
                calibration.push(CalibrationEvent::Completed { eye, ratio });
            } else if let Some(ratio) = progress {
                calibration.push(CalibrationEvent::Progress { eye, ratio });
            }
        }

        FrameAnalysis {
            ratios,
            eye_state,
            mouth_state,
            fps,
            eyes_closed,
            yawn,
            calibration,
        }
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }

    pub fn set_eye_metric(&mut self, metric: EyeMetric) {
        info!("Eye metric -> {:?}", metric);
        self.config.eye_metric = metric;
    }

    pub fn set_eye_aspect_ratio_threshold(&mut self, threshold: f64) -> Result<(), DmsError> {
        check_threshold("eye_aspect_ratio_threshold", threshold)?;
        self.config.eye_aspect_ratio_threshold = threshold;
        Ok(())
    }

    pub fn set_magic_ratio_threshold(&mut self, threshold: f64) -> Result<(), DmsError> {
        check_threshold("magic_ratio_threshold", threshold)?;
        self.config.magic_ratio_threshold = threshold;
        Ok(())
    }

    pub fn set_mouth_aspect_ratio_threshold(&mut self, threshold: f64) -> Result<(), DmsError> {
        check_threshold("mouth_aspect_ratio_threshold", threshold)?;
        self.config.mouth_aspect_ratio_threshold = threshold;
        Ok(())
    }

    /// Override or clear one eye's calibrated threshold
    pub fn set_calibrated_threshold(&mut self, eye: Eye, threshold: Option<f64>) -> Result<(), DmsError> {
        if let Some(t) = threshold {
            check_threshold("calibrated_threshold", t)?;
        }
        self.config.set_calibrated_threshold(eye, threshold);
        Ok(())
    }

    pub fn monitor(&self, condition: Condition) -> &ConditionMonitor {
        match condition {
            Condition::EyesClosed => &self.eyes_closed,
            Condition::Yawn => &self.yawn,
        }
    }

    pub fn monitor_mut(&mut self, condition: Condition) -> &mut ConditionMonitor {
        match condition {
            Condition::EyesClosed => &mut self.eyes_closed,
            Condition::Yawn => &mut self.yawn,
        }
    }

    /// Stop both alarms, leaving the trackers as they are
    pub fn mute_alarms(&mut self) {
        self.eyes_closed.stop_alarm();
        self.yawn.stop_alarm();
    }

    /// Clear both trackers and stop both alarms
    pub fn reset_monitors(&mut self) {
        self.eyes_closed.reset();
        self.yawn.reset();
    }

    pub fn calibrator(&self, eye: Eye) -> &Calibrator {
        &self.calibrators[eye.index()]
    }

    pub fn start_calibration(&mut self, eye: Eye) {
        self.calibrators[eye.index()].start_calibration();
    }

    pub fn start_calibration_at(&mut self, eye: Eye, now: Instant) {
        self.calibrators[eye.index()].start_calibration_at(now);
    }

    pub fn stop_calibration(&mut self, eye: Eye) {
        self.calibrators[eye.index()].stop_calibrating();
    }

    pub fn is_calibrating(&self, eye: Eye) -> bool {
        self.calibrators[eye.index()].still_calibrating()
    }

    /// Session length for both eyes
    pub fn set_calibration_time(&mut self, seconds: u32) {
        for calibrator in &mut self.calibrators {
            calibrator.set_calibration_time(seconds);
        }
    }

    pub fn calibration_time(&self) -> u32 {
        self.calibrators[0].calibration_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::{AlarmSound, MonitorEvent, Playback};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    struct SilentAudio;
    struct SilentSound;
    struct SilentPlayback(bool);

    impl AudioBackend for SilentAudio {
        fn load(&self, _path: &Path) -> Result<Arc<dyn AlarmSound>, AlertError> {
            Ok(Arc::new(SilentSound))
        }
    }

    impl AlarmSound for SilentSound {
        fn play(&self) -> Box<dyn Playback> {
            Box::new(SilentPlayback(true))
        }
    }

    impl Playback for SilentPlayback {
        fn is_playing(&self) -> bool {
            self.0
        }

        fn stop(&mut self) {
            self.0 = false;
        }
    }

    fn module() -> DmsModule {
        DmsModule::new(
            DmsConfig::default(),
            &MonitorConfig::eyes_closed(),
            &MonitorConfig::yawn(),
            &SilentAudio,
        )
        .unwrap()
    }

    fn face(eye_height: f64, mouth_height: f64) -> FaceLandmarks {
        FaceLandmarks {
            left_eye: LandmarkSet::synthetic(Region::LeftEye, 100.0, &[eye_height; 7]).unwrap(),
            right_eye: LandmarkSet::synthetic(Region::RightEye, 100.0, &[eye_height; 7]).unwrap(),
            mouth: LandmarkSet::synthetic(Region::Mouth, 100.0, &[mouth_height; 9]).unwrap(),
        }
    }

    #[test]
    fn test_closed_eyes_raise_alarm_after_gate() {
        let mut dms = module();
        let closed = face(5.0, 10.0);

        for _ in 0..20 {
            let analysis = dms.analyze(&closed, 10.0);
            assert_eq!(analysis.eye_state, EyeState::Closed);
            assert_eq!(analysis.mouth_state, MouthState::Normal);
            assert!(!analysis.has_alerts());
        }

        let analysis = dms.analyze(&closed, 10.0);
        assert_eq!(analysis.eyes_closed, MonitorEvent::AlarmStarted);
        assert_eq!(analysis.highest_priority_alert(), Some(Condition::EyesClosed));
        assert!(dms.monitor(Condition::EyesClosed).is_playing());
        assert!(!dms.monitor(Condition::Yawn).is_playing());

        dms.mute_alarms();
        assert!(!dms.monitor(Condition::EyesClosed).is_playing());
        // Tracker still remembers the bad run
        assert_eq!(dms.analyze(&closed, 10.0).eyes_closed, MonitorEvent::AlarmStarted);

        dms.reset_monitors();
        assert_eq!(dms.monitor(Condition::EyesClosed).tracker().total(), 0);
    }

    #[test]
    fn test_yawn_detection() {
        let mut dms = module();
        // 9 * 60 / 700 > 0.6
        let yawning = face(30.0, 60.0);
        let mut started = Vec::new();
        for _ in 0..31 {
            let analysis = dms.analyze(&yawning, 10.0);
            assert_eq!(analysis.mouth_state, MouthState::Yawning);
            started.extend(analysis.alarms_started());
        }
        assert_eq!(started, vec![Condition::Yawn]);
    }

    #[test]
    fn test_calibration_adopts_threshold() {
        let mut dms = module();
        dms.set_eye_metric(EyeMetric::Calibrated);
        dms.set_calibration_time(1);
        let t0 = Instant::now();
        dms.start_calibration_at(Eye::Left, t0);
        assert!(dms.is_calibrating(Eye::Left));
        assert!(!dms.is_calibrating(Eye::Right));

        let mut events = Vec::new();
        for frame in 0..=11u64 {
            let height = if frame % 2 == 0 { 40.0 } else { 10.0 };
            let now = t0 + Duration::from_millis(frame * 100);
            events.extend(dms.analyze_at(&face(height, 0.0), 10.0, now).calibration);
        }

        let completed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, CalibrationEvent::Completed { .. }))
            .collect();
        assert_eq!(completed.len(), 1);
        assert!(events.iter().all(|e| e.eye() == Eye::Left));
        assert!(matches!(events.last(), Some(CalibrationEvent::Completed { .. })));

        // (0.1 + 0.4) / 2
        let threshold = dms.config().calibrated_threshold_left.unwrap();
        assert!((threshold - 0.25).abs() < 1e-9);
        assert!(dms.config().calibrated_threshold_right.is_none());
        assert!(!dms.is_calibrating(Eye::Left));
    }

    #[test]
    fn test_stop_calibration_keeps_threshold() {
        let mut dms = module();
        dms.start_calibration(Eye::Right);
        dms.analyze(&face(30.0, 0.0), 30.0);
        dms.stop_calibration(Eye::Right);
        assert!(!dms.is_calibrating(Eye::Right));
        assert!(dms.analyze(&face(30.0, 0.0), 30.0).calibration.is_empty());
        assert!(dms.config().calibrated_threshold_right.is_none());
    }

    #[test]
    fn test_threshold_setters_validate() {
        let mut dms = module();
        assert!(dms.set_eye_aspect_ratio_threshold(0.3).is_ok());
        assert_eq!(dms.config().eye_aspect_ratio_threshold, 0.3);
        assert!(matches!(
            dms.set_mouth_aspect_ratio_threshold(f64::INFINITY),
            Err(DmsError::Config(_))
        ));
        assert!(dms.set_magic_ratio_threshold(-1.0).is_err());
        assert!(dms.set_calibrated_threshold(Eye::Left, Some(0.22)).is_ok());
        assert_eq!(dms.config().calibrated_threshold(Eye::Left), 0.22);
        assert!(dms.set_calibrated_threshold(Eye::Left, None).is_ok());
        assert_eq!(dms.config().calibrated_threshold(Eye::Left), 0.3);
    }

    #[test]
    fn test_monitor_time_threshold_is_live() {
        let mut dms = module();
        dms.monitor_mut(Condition::Yawn).update_time_threshold(1);
        assert_eq!(dms.monitor(Condition::Yawn).time_threshold_seconds(), 1);
        assert_eq!(dms.calibration_time(), calibration::DEFAULT_CALIBRATION_SECONDS);
    }
}
