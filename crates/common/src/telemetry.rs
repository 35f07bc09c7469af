use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Latest telemetry read back from the actuator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub position: f32,
    pub velocity: f32,
}

/// Rolling window of telemetry for display, newest last.
///
/// `latest` is kept even when a read fails, so callers always have the last
/// good value to show.
#[derive(Debug, Clone)]
pub struct TelemetryBuffer {
    data: VecDeque<TelemetrySample>,
    max_size: usize,
}

impl TelemetryBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn add(&mut self, item: TelemetrySample) {
        self.data.push_back(item);
        if self.data.len() > self.max_size {
            self.data.pop_front();
        }
    }

    pub fn latest(&self) -> Option<TelemetrySample> {
        self.data.back().copied()
    }

    pub fn get_recent(&self, count: usize) -> Vec<TelemetrySample> {
        let start = self.data.len().saturating_sub(count);
        self.data.range(start..).copied().collect()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
