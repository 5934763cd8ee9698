//! Cumulative frame rate

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Frames counted since a single start instant. The rate is the running
/// average over the whole run, so it reacts slowly to stalls and spikes.
#[derive(Debug)]
pub struct FpsCounter {
    started: Mutex<Instant>,
    frames: AtomicU64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            started: Mutex::new(Instant::now()),
            frames: AtomicU64::new(0),
        }
    }

    /// Restart the timer and clear the count
    pub fn restart(&self) {
        self.restart_at(Instant::now());
    }

    pub fn restart_at(&self, now: Instant) {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner) = now;
        self.frames.store(0, Ordering::Relaxed);
    }

    /// Count one frame and return the updated rate
    pub fn record_frame(&self) -> f64 {
        self.record_frame_at(Instant::now())
    }

    pub fn record_frame_at(&self, now: Instant) -> f64 {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.fps_at(now)
    }

    pub fn fps(&self) -> f64 {
        self.fps_at(Instant::now())
    }

    /// Frames per second up to `now`; 0 when no time has passed, which the
    /// monitors read as "no rate yet"
    pub fn fps_at(&self, now: Instant) -> f64 {
        let started = *self.started.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now.saturating_duration_since(started).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.frames() as f64 / elapsed
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_running_average() {
        let counter = FpsCounter::new();
        let t0 = Instant::now();
        counter.restart_at(t0);

        for i in 1..=10u64 {
            counter.record_frame_at(t0 + Duration::from_millis(i * 100));
        }
        assert!((counter.fps_at(t0 + Duration::from_secs(1)) - 10.0).abs() < 1e-9);

        // A stall only drags the average down gradually
        let fps = counter.record_frame_at(t0 + Duration::from_secs(2));
        assert!((fps - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_elapsed_is_zero() {
        let counter = FpsCounter::new();
        let t0 = Instant::now();
        counter.restart_at(t0);
        assert_eq!(counter.record_frame_at(t0), 0.0);
        assert_eq!(counter.frames(), 1);
    }

    #[test]
    fn test_restart_clears_count() {
        let counter = FpsCounter::new();
        counter.record_frame();
        counter.record_frame();
        counter.restart();
        assert_eq!(counter.frames(), 0);
    }
}
