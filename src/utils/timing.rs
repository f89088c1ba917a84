//! Timing utilities for fetch and refresh operations

use log::{debug, info};
use std::time::{Duration, Instant};

/// A timer for measuring operation durations
#[derive(Debug)]
pub struct Timer {
    start_time: Instant,
    operation_name: String,
    checkpoints: Vec<(String, Instant)>,
}

impl Timer {
    /// Create a new timer for the given operation
    pub fn start(operation_name: &str) -> Self {
        debug!("Starting timer for: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name: operation_name.to_string(),
            checkpoints: Vec::new(),
        }
    }

    /// Add a checkpoint to track intermediate timing
    pub fn checkpoint(&mut self, checkpoint_name: &str) {
        let now = Instant::now();
        self.checkpoints.push((checkpoint_name.to_string(), now));
        debug!(
            "{} - {}: {}ms",
            self.operation_name,
            checkpoint_name,
            now.duration_since(self.start_time).as_millis()
        );
    }

    /// Finish the timer and log the total duration
    pub fn finish(self) -> Duration {
        let total_duration = self.start_time.elapsed();
        info!(
            "{} completed in {}ms",
            self.operation_name,
            total_duration.as_millis()
        );

        let mut last_time = self.start_time;
        for (name, time) in &self.checkpoints {
            debug!("   └─ {}: {}ms", name, time.duration_since(last_time).as_millis());
            last_time = *time;
        }
        total_duration
    }
}
