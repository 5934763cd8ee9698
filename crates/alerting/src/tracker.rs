//! Bounded frame tracker

use serde::{Deserialize, Serialize};

/// Adaptive ok/not-ok debounce counter.
///
/// Unlike a fixed sliding window, the tracker resets itself as soon as good
/// frames outnumber bad ones. One good frame wipes a short bad streak, while
/// a long bad streak needs a matching run of good frames to be overturned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedFrameTracker {
    ok_count: u64,
    notok_count: u64,
    /// Not-ok share (0-100) above which the threshold counts as crossed
    percentage_threshold: f64,
}

impl BoundedFrameTracker {
    /// Create a tracker with the given not-ok percentage threshold
    pub fn new(percentage_threshold: f64) -> Self {
        Self {
            ok_count: 0,
            notok_count: 0,
            percentage_threshold,
        }
    }

    /// Record a good frame. Resets both counts once good frames dominate.
    pub fn add_ok(&mut self) {
        self.ok_count += 1;
        if self.ok_count > self.notok_count {
            self.reset();
        }
    }

    /// Record a bad frame
    pub fn add_notok(&mut self) {
        self.notok_count += 1;
    }

    /// Whether the not-ok share of the tracked frames exceeds the threshold.
    /// Always false with no tracked frames.
    pub fn crossed_threshold(&self) -> bool {
        let total = self.total();
        if total == 0 {
            return false;
        }
        (self.notok_count as f64 / total as f64) * 100.0 > self.percentage_threshold
    }

    /// Clear both counts
    pub fn reset(&mut self) {
        self.ok_count = 0;
        self.notok_count = 0;
    }

    pub fn ok_count(&self) -> u64 {
        self.ok_count
    }

    pub fn notok_count(&self) -> u64 {
        self.notok_count
    }

    /// Frames currently tracked
    pub fn total(&self) -> u64 {
        self.ok_count + self.notok_count
    }

    pub fn percentage_threshold(&self) -> f64 {
        self.percentage_threshold
    }

    pub fn set_percentage_threshold(&mut self, percentage_threshold: f64) {
        self.percentage_threshold = percentage_threshold;
    }
}
