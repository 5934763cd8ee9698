//! Per-driver eye threshold calibration
//!
//! A session records the extremes of eye width and every lid gap over a
//! fixed time window. The resulting threshold sits halfway between the
//! driver's own fully-closed and fully-open eye ratios.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::landmarks::{Eye, LandmarkSet};
use crate::ratio::{EyeGeometry, EYE_PAIRS};

/// Default session length in seconds
pub const DEFAULT_CALIBRATION_SECONDS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPhase {
    Idle,
    Calibrating,
}

/// Running extrema for one session
#[derive(Debug, Clone, Copy, PartialEq)]
struct Extrema {
    min_width: f64,
    max_width: f64,
    min_heights: [f64; EYE_PAIRS],
    max_heights: [f64; EYE_PAIRS],
}

impl Extrema {
    fn empty() -> Self {
        Self {
            min_width: f64::INFINITY,
            max_width: f64::NEG_INFINITY,
            min_heights: [f64::INFINITY; EYE_PAIRS],
            max_heights: [f64::NEG_INFINITY; EYE_PAIRS],
        }
    }

    fn record(&mut self, geometry: &EyeGeometry) {
        self.min_width = self.min_width.min(geometry.width);
        self.max_width = self.max_width.max(geometry.width);
        for (i, &h) in geometry.heights.iter().enumerate() {
            self.min_heights[i] = self.min_heights[i].min(h);
            self.max_heights[i] = self.max_heights[i].max(h);
        }
    }

    fn ratio(&self) -> f64 {
        let pairs = EYE_PAIRS as f64;
        let closed = self.min_heights.iter().sum::<f64>() / (pairs * self.max_width);
        let open = self.max_heights.iter().sum::<f64>() / (pairs * self.min_width);
        (closed + open) / 2.0
    }
}

/// Time-boxed extrema tracker for one eye
#[derive(Debug, Clone)]
pub struct Calibrator {
    eye: Eye,
    phase: CalibrationPhase,
    started: Option<Instant>,
    calibration_time: Duration,
    extrema: Extrema,
}

impl Calibrator {
    pub fn new(eye: Eye) -> Self {
        Self {
            eye,
            phase: CalibrationPhase::Idle,
            started: None,
            calibration_time: Duration::from_secs(DEFAULT_CALIBRATION_SECONDS as u64),
            extrema: Extrema::empty(),
        }
    }

    pub fn eye(&self) -> Eye {
        self.eye
    }

    /// Begin a new session, discarding any previous extrema
    pub fn start_calibration(&mut self) {
        self.start_calibration_at(Instant::now());
    }

    pub fn start_calibration_at(&mut self, now: Instant) {
        info!(
            "Starting {:?} eye calibration for {}s",
            self.eye,
            self.calibration_time.as_secs()
        );
        self.phase = CalibrationPhase::Calibrating;
        self.started = Some(now);
        self.extrema = Extrema::empty();
    }

    /// Feed one frame of eye landmarks. Does nothing unless calibrating.
    ///
    /// Once the session has run longer than the calibration time,
    /// `on_complete` receives the final ratio and the session ends.
    /// Otherwise `on_live_update` receives a provisional ratio, which is
    /// unreliable until the driver has both opened and closed their eyes.
    pub fn update(
        &mut self,
        eye: &LandmarkSet,
        on_complete: impl FnOnce(f64),
        on_live_update: impl FnOnce(f64),
    ) {
        self.update_at(eye, Instant::now(), on_complete, on_live_update);
    }

    pub fn update_at(
        &mut self,
        eye: &LandmarkSet,
        now: Instant,
        on_complete: impl FnOnce(f64),
        on_live_update: impl FnOnce(f64),
    ) {
        if !self.still_calibrating() {
            return;
        }

        self.extrema.record(&EyeGeometry::from_landmarks(eye));

        if self.elapsed_at(now) > self.calibration_time {
            self.phase = CalibrationPhase::Idle;
            let ratio = self.current_ratio();
            info!("{:?} eye calibration finished: {:.4}", self.eye, ratio);
            on_complete(ratio);
            return;
        }

        on_live_update(self.current_ratio());
    }

    /// Midpoint of the closed and open estimates. NaN before any frame has
    /// been recorded.
    pub fn current_ratio(&self) -> f64 {
        self.extrema.ratio()
    }

    pub fn still_calibrating(&self) -> bool {
        self.phase == CalibrationPhase::Calibrating
    }

    /// Cancel the session. No completion is reported.
    pub fn stop_calibrating(&mut self) {
        if self.still_calibrating() {
            debug!("{:?} eye calibration cancelled", self.eye);
        }
        self.phase = CalibrationPhase::Idle;
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Seconds since the last session started (0 if none has)
    pub fn seconds_elapsed(&self) -> f64 {
        self.elapsed_at(Instant::now()).as_secs_f64()
    }

    fn elapsed_at(&self, now: Instant) -> Duration {
        self.started
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default()
    }

    pub fn calibration_time(&self) -> u32 {
        self.calibration_time.as_secs() as u32
    }

    /// Change the session length; a running session uses the new value
    /// from its next update
    pub fn set_calibration_time(&mut self, seconds: u32) {
        self.calibration_time = Duration::from_secs(seconds as u64);
    }

    pub fn snapshot(&self) -> CalibrationSnapshot {
        let preview = self.current_ratio();
        CalibrationSnapshot {
            eye: self.eye,
            phase: self.phase,
            elapsed_seconds: self.seconds_elapsed(),
            calibration_time_seconds: self.calibration_time(),
            preview: preview.is_finite().then_some(preview),
        }
    }
}

/// Point-in-time copy of calibrator state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    pub eye: Eye,
    pub phase: CalibrationPhase,
    pub elapsed_seconds: f64,
    pub calibration_time_seconds: u32,
    /// Current ratio, absent until a frame has been recorded
    pub preview: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Region;

    fn eye(height: f64) -> LandmarkSet {
        LandmarkSet::synthetic(Region::LeftEye, 100.0, &[height; 7]).unwrap()
    }

    #[test]
    fn test_open_closed_session_converges() {
        let mut calibrator = Calibrator::new(Eye::Left);
        let t0 = Instant::now();
        calibrator.start_calibration_at(t0);

        let mut completed = Vec::new();
        let mut live = Vec::new();
        for frame in 0..=80u64 {
            let now = t0 + Duration::from_millis(frame * 100);
            let height = if frame % 2 == 0 { 40.0 } else { 5.0 };
            calibrator.update_at(
                &eye(height),
                now,
                |ratio| completed.push((frame, ratio)),
                |ratio| live.push(ratio),
            );
        }

        assert_eq!(completed.len(), 1);
        let (frame, ratio) = completed[0];
        // 7.0s is not past the deadline, 7.1s is
        assert_eq!(frame, 71);
        assert!((ratio - 0.225).abs() < 1e-9);
        assert_eq!(live.len(), 71);
        assert!(!calibrator.still_calibrating());
        assert!((calibrator.current_ratio() - 0.225).abs() < 1e-9);
    }

    #[test]
    fn test_updates_ignored_when_idle() {
        let mut calibrator = Calibrator::new(Eye::Right);
        let mut called = false;
        calibrator.update(&eye(10.0), |_| called = true, |_| {});
        assert!(!called);
        assert!(calibrator.current_ratio().is_nan());
        assert_eq!(calibrator.snapshot().preview, None);
        assert_eq!(calibrator.seconds_elapsed(), 0.0);
    }

    #[test]
    fn test_stop_cancels_without_completion() {
        let mut calibrator = Calibrator::new(Eye::Left);
        let t0 = Instant::now();
        calibrator.start_calibration_at(t0);
        calibrator.update_at(&eye(20.0), t0, |_| panic!("completed early"), |_| {});
        calibrator.stop_calibrating();

        let mut completions = 0;
        calibrator.update_at(&eye(20.0), t0 + Duration::from_secs(60), |_| completions += 1, |_| {});
        assert_eq!(completions, 0);
        assert_eq!(calibrator.phase(), CalibrationPhase::Idle);
    }

    #[test]
    fn test_restart_discards_extrema() {
        let mut calibrator = Calibrator::new(Eye::Left);
        let t0 = Instant::now();
        calibrator.start_calibration_at(t0);
        calibrator.update_at(&eye(50.0), t0, |_| {}, |_| {});
        calibrator.start_calibration_at(t0);
        calibrator.update_at(&eye(10.0), t0, |_| {}, |_| {});
        assert!((calibrator.current_ratio() - 0.1).abs() < 1e-9);

        let snapshot = calibrator.snapshot();
        assert_eq!(snapshot.phase, CalibrationPhase::Calibrating);
        assert!((snapshot.preview.unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_shorter_calibration_time() {
        let mut calibrator = Calibrator::new(Eye::Left);
        assert_eq!(calibrator.calibration_time(), DEFAULT_CALIBRATION_SECONDS);
        calibrator.set_calibration_time(1);

        let t0 = Instant::now();
        calibrator.start_calibration_at(t0);
        let mut done = None;
        calibrator.update_at(&eye(30.0), t0 + Duration::from_millis(1500), |r| done = Some(r), |_| {});
        assert!((done.unwrap() - 0.3).abs() < 1e-9);
    }
}
