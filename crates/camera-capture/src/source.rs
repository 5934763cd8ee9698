//! Frame sources consumed by the capture loop

use std::path::PathBuf;
use std::time::{Duration, Instant};

use image::ImageFormat;
use tracing::{debug, info};

use crate::{CameraConfig, CameraError, VideoFrame};

/// Camera collaborator. The capture loop owns its source exclusively and
/// blocks only inside `read_frame`.
pub trait FrameSource: Send {
    /// Read the next frame. An error ends the capture loop.
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Result<VideoFrame, CameraError> + Send,
{
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        self()
    }
}

/// Replays a directory of still images (sorted by file name) as a camera
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    next_index: usize,
    sequence: u32,
    frame_interval: Option<Duration>,
    next_deadline: Instant,
    opened_at: Instant,
    loop_playback: bool,
}

impl ImageSequenceSource {
    /// Open the image directory named by `config.device`
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let entries = std::fs::read_dir(&config.device).map_err(|e| {
            CameraError::Open(format!("{}: {}", config.device.display(), e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && ImageFormat::from_path(path).is_ok())
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Open(format!(
                "{}: no image files",
                config.device.display()
            )));
        }

        info!(
            "Opened image sequence {} ({} frames @ {} fps)",
            config.device.display(),
            files.len(),
            config.fps
        );

        let frame_interval = (config.fps > 0)
            .then(|| Duration::from_secs_f64(1.0 / config.fps as f64));
        let now = Instant::now();

        Ok(Self {
            files,
            next_index: 0,
            sequence: 0,
            frame_interval,
            next_deadline: now,
            opened_at: now,
            loop_playback: config.loop_playback,
        })
    }

    /// Number of images in the sequence
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn pace(&mut self) {
        if let Some(interval) = self.frame_interval {
            let now = Instant::now();
            if self.next_deadline > now {
                std::thread::sleep(self.next_deadline - now);
            }
            self.next_deadline = self.next_deadline.max(now) + interval;
        }
    }
}

impl FrameSource for ImageSequenceSource {
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        if self.next_index >= self.files.len() {
            if !self.loop_playback {
                return Err(CameraError::EndOfStream(self.sequence));
            }
            debug!("Image sequence wrapped after {} frames", self.sequence);
            self.next_index = 0;
        }

        self.pace();

        let path = &self.files[self.next_index];
        let image = image::open(path)
            .map_err(|e| CameraError::Decode {
                path: path.clone(),
                reason: e.to_string(),
            })?
            .to_rgb8();

        self.next_index += 1;
        self.sequence = self.sequence.wrapping_add(1);

        Ok(VideoFrame::from_rgb_image(
            image,
            self.opened_at.elapsed().as_nanos() as u64,
            self.sequence,
        ))
    }
}
