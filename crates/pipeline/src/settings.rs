//! Pipeline settings
//!
//! Layered as built-in defaults, then an optional TOML file, then
//! `DROWSY_`-prefixed environment variables (`DROWSY_YAWN__TIME_THRESHOLD_SECONDS=4`).

use std::path::Path;
use std::time::Duration;

use alerting::MonitorConfig;
use config::{Config, Environment, File, FileFormat};
use dms::calibration::DEFAULT_CALIBRATION_SECONDS;
use dms::{DmsConfig, DmsError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::PipelineError;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Ratio thresholds and eye metric
    pub dms: DmsConfig,
    pub eyes_closed: MonitorConfig,
    pub yawn: MonitorConfig,
    /// Length of an eye calibration session
    pub calibration_time_seconds: u32,
    /// Detect loop sleep when no new frame is waiting
    pub idle_backoff_ms: u64,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dms: DmsConfig::default(),
            eyes_closed: MonitorConfig::eyes_closed(),
            yawn: MonitorConfig::yawn(),
            calibration_time_seconds: DEFAULT_CALIBRATION_SECONDS,
            idle_backoff_ms: 1,
            log_format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);
        if let Some(path) = path {
            info!("Loading settings from {}", path.display());
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix("DROWSY")
                .prefix_separator("_")
                .separator("__"),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text; missing keys keep their defaults
    pub fn from_toml_str(toml: &str) -> Result<Self, PipelineError> {
        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.dms.validate()?;
        check_percentage("eyes_closed.percentage_threshold", self.eyes_closed.percentage_threshold)?;
        check_percentage("yawn.percentage_threshold", self.yawn.percentage_threshold)?;
        Ok(())
    }

    /// Install the global subscriber in the configured format
    pub fn init_logging(&self) -> Result<(), PipelineError> {
        crate::init_logging(self.log_format)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

pub(crate) fn check_percentage(name: &str, value: f64) -> Result<(), DmsError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(DmsError::Config(format!("{} must be within 0-100, got {}", name, value)))
    }
}
