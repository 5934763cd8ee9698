//! Alerting System
//!
//! Turns per-frame ok/not-ok classifications into alarm decisions:
//! - `BoundedFrameTracker`: adaptive debounce with a percentage threshold
//! - `ConditionMonitor`: duration gate plus alarm lifecycle for one condition
//! - `sound`: audio collaborator contract and a headless backend

mod monitor;
pub mod sound;
mod tracker;

pub use monitor::{Condition, ConditionMonitor, MonitorConfig, MonitorEvent, MonitorSnapshot};
pub use sound::{AlarmSound, AudioBackend, Playback, TracingAudio};
pub use tracker::BoundedFrameTracker;

use std::path::PathBuf;
use thiserror::Error;

/// Alerting error types
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Alarm sound {path} unavailable: {reason}")]
    SoundUnavailable { path: PathBuf, reason: String },

    #[error("Alarm sound {path} is not a valid WAV file: {reason}")]
    InvalidSound { path: PathBuf, reason: String },
}
