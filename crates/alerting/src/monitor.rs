//! Condition Monitor Implementation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::sound::{AlarmSound, AudioBackend, Playback};
use crate::tracker::BoundedFrameTracker;
use crate::AlertError;

/// Monitored driver conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Eyes closed for a sustained period
    EyesClosed,
    /// Mouth open wide for a sustained period
    Yawn,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::EyesClosed => "eyes_closed",
            Condition::Yawn => "yawn",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Not-ok frame share (0-100) that counts as a bad run (default: 80)
    pub percentage_threshold: f64,
    /// Seconds a bad run must span before the alarm fires
    pub time_threshold_seconds: u32,
    /// Alarm sound asset (WAV)
    pub sound_path: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::eyes_closed()
    }
}

impl MonitorConfig {
    /// Defaults for the eyes-closed monitor
    pub fn eyes_closed() -> Self {
        Self {
            percentage_threshold: 80.0,
            time_threshold_seconds: 2,
            sound_path: PathBuf::from("assets/audios/eyes_closed.wav"),
        }
    }

    /// Defaults for the yawn monitor
    pub fn yawn() -> Self {
        Self {
            percentage_threshold: 80.0,
            time_threshold_seconds: 3,
            sound_path: PathBuf::from("assets/audios/yawn.wav"),
        }
    }
}

/// Result of feeding one classified frame to a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Bad run not established (ratio or duration gate not met)
    Quiet,
    /// Bad run established, alarm was already playing
    Sustained,
    /// Bad run established and the alarm started on this frame
    AlarmStarted,
}

/// Point-in-time copy of monitor state for reporting threads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub condition: Condition,
    pub ok_count: u64,
    pub notok_count: u64,
    pub percentage_threshold: f64,
    pub time_threshold_seconds: u32,
    pub alarm_playing: bool,
}

/// Debounced monitor for one condition, owning its alarm
pub struct ConditionMonitor {
    condition: Condition,
    tracker: BoundedFrameTracker,
    time_threshold_seconds: u32,
    sound: Arc<dyn AlarmSound>,
    alarm: Option<Box<dyn Playback>>,
}

impl ConditionMonitor {
    /// Create a monitor. Fails if the alarm sound cannot be loaded.
    pub fn new(
        condition: Condition,
        config: &MonitorConfig,
        audio: &dyn AudioBackend,
    ) -> Result<Self, AlertError> {
        info!("Creating {} monitor with config: {:?}", condition, config);
        let sound = audio.load(&config.sound_path)?;
        Ok(Self {
            condition,
            tracker: BoundedFrameTracker::new(config.percentage_threshold),
            time_threshold_seconds: config.time_threshold_seconds,
            sound,
            alarm: None,
        })
    }

    /// Feed one classified frame. The alarm fires once the tracker has
    /// crossed its percentage threshold over a window longer than the time
    /// threshold at the current frame rate. Without a measured rate (`fps`
    /// zero, negative or not finite) the duration gate cannot be met.
    pub fn add_bounded_frame(&mut self, ok: bool, fps: f64) -> MonitorEvent {
        if ok {
            self.tracker.add_ok();
        } else {
            self.tracker.add_notok();
        }

        let rate_known = fps.is_finite() && fps > 0.0;
        let window_frames = self.tracker.total() as f64;
        let gate_frames = self.time_threshold_seconds as f64 * fps;
        if rate_known && self.tracker.crossed_threshold() && window_frames > gate_frames {
            if self.trigger_alarm() {
                MonitorEvent::AlarmStarted
            } else {
                MonitorEvent::Sustained
            }
        } else {
            MonitorEvent::Quiet
        }
    }

    /// Start the alarm unless it is already playing.
    /// Returns true if a new playback was started.
    pub fn trigger_alarm(&mut self) -> bool {
        if self.is_playing() {
            return false;
        }
        info!(
            "{} alarm triggered ({} of {} frames not ok)",
            self.condition,
            self.tracker.notok_count(),
            self.tracker.total()
        );
        self.alarm = Some(self.sound.play());
        true
    }

    /// Stop and release the current playback, if any
    pub fn stop_alarm(&mut self) {
        if let Some(mut alarm) = self.alarm.take() {
            if alarm.is_playing() {
                debug!("Stopping {} alarm", self.condition);
                alarm.stop();
            }
        }
    }

    /// Whether the alarm is audible
    pub fn is_playing(&self) -> bool {
        self.alarm.as_ref().is_some_and(|alarm| alarm.is_playing())
    }

    /// Change the duration gate; applies from the next frame
    pub fn update_time_threshold(&mut self, seconds: u32) {
        debug!("{} time threshold -> {}s", self.condition, seconds);
        self.time_threshold_seconds = seconds;
    }

    pub fn time_threshold_seconds(&self) -> u32 {
        self.time_threshold_seconds
    }

    /// Change the not-ok percentage threshold; applies from the next frame
    pub fn update_percentage_threshold(&mut self, percentage: f64) {
        debug!("{} percentage threshold -> {}", self.condition, percentage);
        self.tracker.set_percentage_threshold(percentage);
    }

    /// Clear the tracker and silence the alarm
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.stop_alarm();
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    pub fn tracker(&self) -> &BoundedFrameTracker {
        &self.tracker
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            condition: self.condition,
            ok_count: self.tracker.ok_count(),
            notok_count: self.tracker.notok_count(),
            percentage_threshold: self.tracker.percentage_threshold(),
            time_threshold_seconds: self.time_threshold_seconds,
            alarm_playing: self.is_playing(),
        }
    }
}

impl fmt::Debug for ConditionMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionMonitor")
            .field("condition", &self.condition)
            .field("tracker", &self.tracker)
            .field("time_threshold_seconds", &self.time_threshold_seconds)
            .field("alarm_playing", &self.is_playing())
            .finish()
    }
}
