//! Alarm audio contract
//!
//! The alerting core only needs three things from an audio system: start a
//! sound, ask whether it is still playing, and stop it. Backends load the
//! sound once at startup so a missing or corrupt asset fails fast.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::AlertError;

/// Handle to one playback of a sound
pub trait Playback: Send {
    /// Whether the sound is still audible
    fn is_playing(&self) -> bool;
    /// Stop playback. Stopping a finished playback is a no-op.
    fn stop(&mut self);
}

/// A loaded alarm sound
pub trait AlarmSound: Send + Sync {
    /// Start a new playback
    fn play(&self) -> Box<dyn Playback>;
}

/// Audio collaborator
pub trait AudioBackend: Send + Sync {
    /// Load and validate a sound asset
    fn load(&self, path: &Path) -> Result<Arc<dyn AlarmSound>, AlertError>;
}

/// Format details read from a RIFF/WAVE header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub byte_rate: u32,
    pub data_len: u32,
}

impl WavInfo {
    /// Playback length of the data chunk
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.data_len as f64 / self.byte_rate as f64)
    }
}

/// Read a WAV file and parse its `fmt ` and `data` chunk headers
pub fn read_wav_info(path: &Path) -> Result<WavInfo, AlertError> {
    let bytes = std::fs::read(path).map_err(|e| AlertError::SoundUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_wav_info(&bytes).map_err(|reason| AlertError::InvalidSound {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse_wav_info(bytes: &[u8]) -> Result<WavInfo, String> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err("missing RIFF/WAVE header".to_string());
    }

    let read_u32 = |at: usize| -> Option<u32> {
        bytes
            .get(at..at + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    };

    let mut byte_rate = None;
    let mut data_len = None;
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32(offset + 4).unwrap_or(0) as usize;
        match id {
            b"fmt " => byte_rate = read_u32(offset + 16),
            b"data" => data_len = Some(size as u32),
            _ => {}
        }
        // Chunks are word aligned
        offset += 8 + size + (size & 1);
    }

    match (byte_rate, data_len) {
        (Some(0), _) => Err("byte rate is zero".to_string()),
        (Some(byte_rate), Some(data_len)) => Ok(WavInfo {
            byte_rate,
            data_len,
        }),
        (None, _) => Err("missing fmt chunk".to_string()),
        (_, None) => Err("missing data chunk".to_string()),
    }
}

/// Headless backend: validates assets like a real player would, then
/// reports alarms through `tracing` instead of a sound card. Playback lasts
/// as long as the WAV data would.
#[derive(Debug, Default)]
pub struct TracingAudio;

impl AudioBackend for TracingAudio {
    fn load(&self, path: &Path) -> Result<Arc<dyn AlarmSound>, AlertError> {
        let wav = read_wav_info(path)?;
        info!(
            "Loaded alarm sound {} ({:.2}s)",
            path.display(),
            wav.duration().as_secs_f64()
        );
        Ok(Arc::new(LoggedSound {
            path: path.to_path_buf(),
            duration: wav.duration(),
        }))
    }
}

struct LoggedSound {
    path: PathBuf,
    duration: Duration,
}

impl AlarmSound for LoggedSound {
    fn play(&self) -> Box<dyn Playback> {
        warn!("ALARM: playing {}", self.path.display());
        Box::new(LoggedPlayback {
            started: Instant::now(),
            duration: self.duration,
            stopped: false,
        })
    }
}

struct LoggedPlayback {
    started: Instant,
    duration: Duration,
    stopped: bool,
}

impl Playback for LoggedPlayback {
    fn is_playing(&self) -> bool {
        !self.stopped && self.started.elapsed() < self.duration
    }

    fn stop(&mut self) {
        if !self.stopped {
            info!("Alarm playback stopped");
            self.stopped = true;
        }
    }
}
