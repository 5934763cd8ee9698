//! Drowsiness Monitor Pipeline
//!
//! Runs the three concurrent loops of the monitor:
//! - Capture: camera -> latest-wins mailbox
//! - Detect: mailbox -> landmarks -> ratios -> monitors/calibration -> queue
//! - Display: queue -> rendering collaborator
//!
//! All live state (thresholds, monitors, calibrators, frame rate) sits in a
//! `PipelineContext` that configuration and UI code share with the loops.

mod context;
mod fps;
mod settings;
mod stages;

pub use context::PipelineContext;
pub use fps::FpsCounter;
pub use settings::{LogFormat, Settings};
pub use stages::{
    DetectStage, DisplaySink, Pipeline, PipelineReport, ProcessedFrame, RunningPipeline,
    ShutdownHandle, StepOutcome,
};

use camera_capture::CameraError;
use dms::DmsError;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Dms(#[from] DmsError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Initialize logging
pub fn init_logging(format: LogFormat) -> Result<(), PipelineError> {
    let builder = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true);

    let result = match format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    result.map_err(|e| PipelineError::Logging(e.to_string()))
}
