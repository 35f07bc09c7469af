use std::thread;
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, warn};

use common::RangefinderConfig;

use crate::channel::{SerialChannel, SerialSettings, REPLY_BUFFER_LEN};
use crate::error::{ProtocolError, Result};
use crate::link::Link;

/// A source of filtered distance readings.
pub trait DistanceSensor {
    fn measure(&mut self) -> Result<f32>;
}

/// Mean over the last `capacity` values, or over fewer while filling up.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: Vec<f32>,
    next: usize,
    capacity: usize,
}

impl MovingAverage {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: Vec::with_capacity(capacity),
            next: 0,
            capacity,
        }
    }

    pub fn push(&mut self, value: f32) -> f32 {
        if self.values.len() < self.capacity {
            self.values.push(value);
        } else {
            self.values[self.next] = value;
        }
        self.next = (self.next + 1) % self.capacity;
        self.mean()
    }

    pub fn mean(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Laser rangefinder streaming distance readings as text over its own port.
pub struct Rangefinder<L: Link = Box<dyn SerialPort>> {
    channel: SerialChannel<L>,
    offset: f32,
    filter: MovingAverage,
    retry_delay: Duration,
}

impl Rangefinder {
    pub fn open(config: &RangefinderConfig) -> Result<Self> {
        let channel = SerialChannel::open(&config.device, &SerialSettings::from(config))?;
        Ok(Self::new(channel, config.offset, config.window))
    }
}

impl<L: Link> Rangefinder<L> {
    pub fn new(channel: SerialChannel<L>, offset: f32, window: usize) -> Self {
        Self {
            channel,
            offset,
            filter: MovingAverage::new(window),
            retry_delay: Duration::from_millis(100),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// One unfiltered reading with the mounting offset removed.
    ///
    /// A silent sensor gets one more chance after `retry_delay`.
    pub fn read_raw(&mut self) -> Result<f32> {
        let mut reply = self.channel.receive(REPLY_BUFFER_LEN)?;
        if reply.is_empty() {
            debug!(device = self.channel.name(), "no reading, retrying");
            thread::sleep(self.retry_delay);
            reply = self.channel.receive(REPLY_BUFFER_LEN)?;
        }
        Ok(parse_distance(&reply)? - self.offset)
    }
}

impl<L: Link> DistanceSensor for Rangefinder<L> {
    fn measure(&mut self) -> Result<f32> {
        let raw = self.read_raw().inspect_err(|e| {
            warn!(device = self.channel.name(), error = %e, "rangefinder read failed");
        })?;
        Ok(self.filter.push(raw))
    }
}

fn parse_distance(reply: &[u8]) -> std::result::Result<f32, ProtocolError> {
    let text = String::from_utf8_lossy(reply);
    let token = text.split_whitespace().next().ok_or(ProtocolError::EmptyReply)?;
    token
        .parse::<f32>()
        .map_err(|_| ProtocolError::Malformed(token.to_string()))
}
