//! Shared pipeline state

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alerting::{AudioBackend, Condition, MonitorSnapshot};
use dms::{
    CalibrationEvent, CalibrationSnapshot, DmsConfig, DmsModule, Eye, EyeMetric, FaceLandmarks,
    FrameAnalysis,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::fps::FpsCounter;
use crate::settings::{check_percentage, Settings};
use crate::PipelineError;

struct Inner {
    dms: Mutex<DmsModule>,
    fps: FpsCounter,
    calibration_tx: Mutex<Option<mpsc::UnboundedSender<CalibrationEvent>>>,
    idle_backoff: Duration,
}

/// Cloneable handle to the live state the loops share with configuration
/// and UI code. Readers get copies; nothing is borrowed across the lock.
#[derive(Clone)]
pub struct PipelineContext {
    inner: Arc<Inner>,
}

impl PipelineContext {
    /// Build thresholds, monitors and calibrators. Fails if an alarm sound
    /// cannot be loaded.
    pub fn new(settings: &Settings, audio: &dyn AudioBackend) -> Result<Self, PipelineError> {
        settings.validate()?;
        let mut dms = DmsModule::new(
            settings.dms.clone(),
            &settings.eyes_closed,
            &settings.yawn,
            audio,
        )?;
        dms.set_calibration_time(settings.calibration_time_seconds);

        Ok(Self {
            inner: Arc::new(Inner {
                dms: Mutex::new(dms),
                fps: FpsCounter::new(),
                calibration_tx: Mutex::new(None),
                idle_backoff: settings.idle_backoff(),
            }),
        })
    }

    fn dms(&self) -> MutexGuard<'_, DmsModule> {
        self.inner.dms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Classify one face and forward any calibration events
    pub(crate) fn analyze(&self, face: &FaceLandmarks, fps: f64) -> FrameAnalysis {
        let analysis = self.dms().analyze(face, fps);
        if !analysis.calibration.is_empty() {
            self.publish_calibration(&analysis.calibration);
        }
        analysis
    }

    fn publish_calibration(&self, events: &[CalibrationEvent]) {
        let mut tx = self
            .inner
            .calibration_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = tx.as_ref() else {
            return;
        };
        for event in events {
            if sender.send(*event).is_err() {
                debug!("Calibration listener dropped");
                *tx = None;
                return;
            }
        }
    }

    /// Subscribe to calibration progress and completion. A new
    /// subscription replaces the previous one.
    pub fn calibration_events(&self) -> mpsc::UnboundedReceiver<CalibrationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self
            .inner
            .calibration_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    /// Current thresholds
    pub fn thresholds(&self) -> DmsConfig {
        self.dms().config().clone()
    }

    pub fn set_eye_aspect_ratio_threshold(&self, threshold: f64) -> Result<(), PipelineError> {
        info!("Eye aspect ratio threshold -> {}", threshold);
        Ok(self.dms().set_eye_aspect_ratio_threshold(threshold)?)
    }

    pub fn set_magic_ratio_threshold(&self, threshold: f64) -> Result<(), PipelineError> {
        info!("Magic ratio threshold -> {}", threshold);
        Ok(self.dms().set_magic_ratio_threshold(threshold)?)
    }

    pub fn set_mouth_aspect_ratio_threshold(&self, threshold: f64) -> Result<(), PipelineError> {
        info!("Mouth aspect ratio threshold -> {}", threshold);
        Ok(self.dms().set_mouth_aspect_ratio_threshold(threshold)?)
    }

    pub fn set_eye_metric(&self, metric: EyeMetric) {
        self.dms().set_eye_metric(metric);
    }

    pub fn set_eyes_closed_time_threshold(&self, seconds: u32) {
        self.dms()
            .monitor_mut(Condition::EyesClosed)
            .update_time_threshold(seconds);
    }

    pub fn set_yawn_time_threshold(&self, seconds: u32) {
        self.dms()
            .monitor_mut(Condition::Yawn)
            .update_time_threshold(seconds);
    }

    /// Not-ok share (0-100) a bad run needs, for either monitor
    pub fn set_percentage_threshold(
        &self,
        condition: Condition,
        percentage: f64,
    ) -> Result<(), PipelineError> {
        check_percentage(&format!("{} percentage threshold", condition), percentage)?;
        self.dms()
            .monitor_mut(condition)
            .update_percentage_threshold(percentage);
        Ok(())
    }

    pub fn start_calibration(&self, eye: Eye) {
        self.dms().start_calibration(eye);
    }

    /// Cancel a running session; no completion event is sent
    pub fn stop_calibration(&self, eye: Eye) {
        self.dms().stop_calibration(eye);
    }

    pub fn is_calibrating(&self, eye: Eye) -> bool {
        self.dms().is_calibrating(eye)
    }

    pub fn set_calibration_time(&self, seconds: u32) {
        info!("Calibration time -> {}s", seconds);
        self.dms().set_calibration_time(seconds);
    }

    pub fn calibration_time(&self) -> u32 {
        self.dms().calibration_time()
    }

    pub fn calibration_snapshot(&self, eye: Eye) -> CalibrationSnapshot {
        self.dms().calibrator(eye).snapshot()
    }

    pub fn eyes_closed_snapshot(&self) -> MonitorSnapshot {
        self.dms().monitor(Condition::EyesClosed).snapshot()
    }

    pub fn yawn_snapshot(&self) -> MonitorSnapshot {
        self.dms().monitor(Condition::Yawn).snapshot()
    }

    pub fn is_alarm_playing(&self, condition: Condition) -> bool {
        self.dms().monitor(condition).is_playing()
    }

    pub fn stop_alarm(&self, condition: Condition) {
        self.dms().monitor_mut(condition).stop_alarm();
    }

    /// Silence both alarms
    pub fn mute_alarms(&self) {
        info!("Muting alarms");
        self.dms().mute_alarms();
    }

    /// Silence both alarms and forget the current runs
    pub fn reset_monitors(&self) {
        self.dms().reset_monitors();
    }

    /// Running average frame rate of the detect loop
    pub fn fps(&self) -> f64 {
        self.inner.fps.fps()
    }

    pub fn fps_counter(&self) -> &FpsCounter {
        &self.inner.fps
    }

    pub fn idle_backoff(&self) -> Duration {
        self.inner.idle_backoff
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("fps", &self.inner.fps)
            .field("idle_backoff", &self.inner.idle_backoff)
            .finish_non_exhaustive()
    }
}
