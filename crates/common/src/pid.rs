use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of process-variable samples retained for the integral/derivative terms.
pub const HISTORY_LEN: usize = 256;

/// Fixed-length window of the most recent samples, oldest first.
///
/// Always holds exactly [`HISTORY_LEN`] values; a fresh window is zero-filled.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalHistory {
    samples: VecDeque<f32>,
}

impl SignalHistory {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::from(vec![0.0; HISTORY_LEN]),
        }
    }

    pub fn push(&mut self, sample: f32) {
        self.samples.pop_front();
        self.samples.push_back(sample);
    }

    pub fn last(&self) -> f32 {
        self.samples[HISTORY_LEN - 1]
    }

    pub fn second_to_last(&self) -> f32 {
        self.samples[HISTORY_LEN - 2]
    }

    /// Sum of the whole window, accumulated oldest to newest.
    pub fn sum(&self) -> f32 {
        self.samples.iter().sum()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
    }
}

impl Default for SignalHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

impl PidGains {
    pub fn new(p: f32, i: f32, d: f32) -> Self {
        Self { p, i, d }
    }
}

/// PID over a sliding window of process-variable samples.
///
/// The integral is a rectangular-rule sum over the full window, so samples
/// older than [`HISTORY_LEN`] pushes stop contributing. The derivative is the
/// first difference of the two newest samples.
#[derive(Debug, Clone, Default)]
pub struct PidController {
    history: SignalHistory,
}

impl PidController {
    pub fn new() -> Self {
        Self {
            history: SignalHistory::new(),
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn push(&mut self, sample: f32) {
        self.history.push(sample);
    }

    pub fn history(&self) -> &SignalHistory {
        &self.history
    }

    pub fn last_sample(&self) -> f32 {
        self.history.last()
    }

    pub fn integral(&self, dt: f32) -> f32 {
        self.history.sum() * dt
    }

    pub fn derivative(&self, dt: f32) -> f32 {
        if dt > 0.0 {
            (self.history.last() - self.history.second_to_last()) / dt
        } else {
            0.0
        }
    }

    pub fn compute(&self, gains: &PidGains, dt: f32) -> f32 {
        gains.p * self.last_sample() + gains.i * self.integral(dt) + gains.d * self.derivative(dt)
    }
}
