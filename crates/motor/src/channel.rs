use std::thread;
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, warn};

use common::{MotorConfig, RangefinderConfig};

use crate::error::{MotorError, Result};
use crate::link::{Link, BAUD_RATE};

/// Largest reply read in one go.
pub const REPLY_BUFFER_LEN: usize = 256;

/// Line timing. Speed and framing are fixed at 9600 8N1 without flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    /// Upper bound for a single read, in tenths of a second.
    pub read_timeout_ds: u8,
    /// Wait between clearing the input queue and reading the reply.
    pub settle: Duration,
}

impl SerialSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.read_timeout_ds) * 100)
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            read_timeout_ds: 1,
            settle: Duration::from_millis(20),
        }
    }
}

impl From<&MotorConfig> for SerialSettings {
    fn from(config: &MotorConfig) -> Self {
        Self {
            read_timeout_ds: config.read_timeout_ds,
            settle: Duration::from_millis(config.settle_ms),
        }
    }
}

impl From<&RangefinderConfig> for SerialSettings {
    fn from(config: &RangefinderConfig) -> Self {
        Self {
            read_timeout_ds: config.read_timeout_ds,
            settle: Duration::from_millis(config.settle_ms),
        }
    }
}

/// Exclusively owned duplex channel to one device.
///
/// The underlying port is closed when the channel is dropped.
pub struct SerialChannel<L: Link = Box<dyn SerialPort>> {
    link: L,
    settle: Duration,
    name: String,
}

impl SerialChannel {
    /// Open `path` and configure it raw, 8N1, with the configured read timeout.
    ///
    /// The port is closed again if configuration fails.
    pub fn open(path: &str, settings: &SerialSettings) -> Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .timeout(settings.read_timeout())
            .open()
            .map_err(|source| MotorError::DeviceUnavailable {
                path: path.to_string(),
                source,
            })?;
        debug!(path, baud = BAUD_RATE, "serial port opened");

        let mut channel = Self::with_link(port, path, settings.settle);
        channel.configure(settings)?;
        Ok(channel)
    }
}

impl<L: Link> SerialChannel<L> {
    pub fn with_link(link: L, name: impl Into<String>, settle: Duration) -> Self {
        Self {
            link,
            settle,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply line framing and timing to the open device.
    pub fn configure(&mut self, settings: &SerialSettings) -> Result<()> {
        self.link
            .configure(settings.read_timeout())
            .map_err(|source| MotorError::DeviceUnavailable {
                path: self.name.clone(),
                source,
            })?;
        self.settle = settings.settle;
        Ok(())
    }

    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.link.write_all(bytes).map_err(|source| {
            let command = String::from_utf8_lossy(bytes).trim_end().to_string();
            warn!(device = %self.name, %command, error = %source, "write failed, command dropped");
            MotorError::Write { command, source }
        })
    }

    /// Drop whatever is already queued, wait the settle delay, then read once.
    ///
    /// Returns at most `max_len` bytes and an empty buffer if nothing arrived
    /// before the read timeout.
    pub fn receive(&mut self, max_len: usize) -> Result<Vec<u8>> {
        self.link.clear_input().map_err(MotorError::Read)?;
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        let mut buf = vec![0u8; max_len];
        let n = self.link.read(&mut buf).map_err(MotorError::Read)?;
        buf.truncate(n);
        debug!(device = %self.name, bytes = n, "received reply");
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MemoryLink;

    fn channel(link: &MemoryLink) -> SerialChannel<MemoryLink> {
        SerialChannel::with_link(link.clone(), "mem", Duration::ZERO)
    }

    #[test]
    fn timeout_is_in_deciseconds() {
        let settings = SerialSettings {
            read_timeout_ds: 3,
            ..SerialSettings::default()
        };
        assert_eq!(settings.read_timeout(), Duration::from_millis(300));
    }

    #[test]
    fn receive_discards_stale_input() {
        let link = MemoryLink::new();
        let mut chan = channel(&link);
        link.inject_stale("999\r");
        link.push_reply("42\r");
        assert_eq!(chan.receive(REPLY_BUFFER_LEN).unwrap(), b"42\r");
    }

    #[test]
    fn receive_returns_empty_on_timeout() {
        let link = MemoryLink::new();
        let mut chan = channel(&link);
        assert!(chan.receive(REPLY_BUFFER_LEN).unwrap().is_empty());
    }

    #[test]
    fn receive_respects_max_len() {
        let link = MemoryLink::new();
        let mut chan = channel(&link);
        link.push_reply("123456");
        assert_eq!(chan.receive(4).unwrap(), b"1234");
    }

    #[test]
    fn failed_send_is_write_error() {
        let link = MemoryLink::new();
        let mut chan = channel(&link);
        link.set_fail_writes(true);
        match chan.send(b"G\r") {
            Err(MotorError::Write { command, .. }) => assert_eq!(command, "G"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(link.written().is_empty());
    }

    #[test]
    fn configure_applies_timeout() {
        let link = MemoryLink::new();
        let mut chan = channel(&link);
        let settings = SerialSettings {
            read_timeout_ds: 5,
            settle: Duration::from_millis(15),
        };
        chan.configure(&settings).unwrap();
        assert_eq!(link.read_timeout(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn rejected_configuration_is_unavailable() {
        let link = MemoryLink::new();
        let mut chan = channel(&link);
        link.set_fail_configure(true);
        match chan.configure(&SerialSettings::default()) {
            Err(MotorError::DeviceUnavailable { path, .. }) => assert_eq!(path, "mem"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(link.read_timeout(), None);
    }

    #[test]
    fn opening_missing_device_is_unavailable() {
        let err = SerialChannel::open("/dev/does-not-exist-smart-motor", &SerialSettings::default())
            .err()
            .expect("open should fail");
        assert!(matches!(err, MotorError::DeviceUnavailable { .. }));
    }
}
