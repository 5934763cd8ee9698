//! Camera Capture Library for the drowsiness monitor
//!
//! Provides the frame type handed between pipeline stages and the
//! camera collaborator contract:
//! - `VideoFrame`: decoded RGB frame with capture metadata
//! - `FrameSource`: anything the capture loop can read frames from
//! - `ImageSequenceSource`: replays a directory of still images as a camera

pub mod frame;
pub mod source;

pub use frame::VideoFrame;
pub use source::{FrameSource, ImageSequenceSource};

use std::path::PathBuf;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Failed to decode frame {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("End of stream after {0} frames")]
    EndOfStream(u32),
}

/// Camera configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Device path or image directory (e.g., "/dev/video0", "./recording")
    pub device: PathBuf,
    /// Target FPS; sources pace reads to this rate (0 = as fast as possible)
    pub fps: u32,
    /// Restart from the first frame when a finite source runs out
    pub loop_playback: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/video0"),
            fps: 30,
            loop_playback: false,
        }
    }
}

impl CameraConfig {
    /// Config for replaying a directory of images
    pub fn replay(dir: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            device: dir.into(),
            fps,
            loop_playback: false,
        }
    }
}
