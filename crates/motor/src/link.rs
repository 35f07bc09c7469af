//! Byte-level access to a serial line.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

/// Fixed line speed of both the motor and the rangefinder.
pub const BAUD_RATE: u32 = 9600;

/// What the command channel needs from a serial line.
///
/// `read` returns `Ok(0)` when the per-read timeout expires with nothing
/// received; it never blocks past that timeout.
pub trait Link: Send {
    /// Put the line into raw 8N1 at [`BAUD_RATE`] with the given read timeout.
    fn configure(&mut self, read_timeout: Duration) -> serialport::Result<()>;
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn clear_input(&mut self) -> io::Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl Link for Box<dyn SerialPort> {
    fn configure(&mut self, read_timeout: Duration) -> serialport::Result<()> {
        self.set_baud_rate(BAUD_RATE)?;
        self.set_data_bits(DataBits::Eight)?;
        self.set_parity(Parity::None)?;
        self.set_stop_bits(StopBits::One)?;
        self.set_flow_control(FlowControl::None)?;
        self.set_timeout(read_timeout)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(self, bytes)?;
        Write::flush(self)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match Read::read(self, buf) {
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    written: Vec<u8>,
    /// Bytes already sitting in the input queue; dropped by `clear_input`.
    stale: Vec<u8>,
    /// Replies handed out one per `read`, as if the device answered during the settle delay.
    replies: VecDeque<Vec<u8>>,
    fail_writes: bool,
    /// Writes of exactly this command (without terminator) fail.
    fail_command: Option<String>,
    read_timeout: Option<Duration>,
    fail_configure: bool,
}

/// In-memory line for running the controller without hardware.
///
/// Clones share the same state, so a handle kept outside the controller can
/// inspect what was sent even after the controller has been dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the device's answer to a future read.
    pub fn push_reply(&self, reply: impl AsRef<[u8]>) {
        self.state().replies.push_back(reply.as_ref().to_vec());
    }

    /// Leave leftover bytes in the input queue.
    pub fn inject_stale(&self, bytes: impl AsRef<[u8]>) {
        self.state().stale.extend_from_slice(bytes.as_ref());
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Fail every write of `command` while letting all others through.
    pub fn fail_command(&self, command: Option<&str>) {
        self.state().fail_command = command.map(str::to_owned);
    }

    pub fn set_fail_configure(&self, fail: bool) {
        self.state().fail_configure = fail;
    }

    /// Read timeout applied by the last successful `configure`.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.state().read_timeout
    }

    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    /// Everything written so far, split into `\r`-terminated commands.
    pub fn commands(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.state().written)
            .split_terminator('\r')
            .map(str::to_owned)
            .collect()
    }

    pub fn clear_written(&self) {
        self.state().written.clear();
    }

    pub fn pending_replies(&self) -> usize {
        self.state().replies.len()
    }
}

impl Link for MemoryLink {
    fn configure(&mut self, read_timeout: Duration) -> serialport::Result<()> {
        let mut state = self.state();
        if state.fail_configure {
            return Err(serialport::Error::new(
                serialport::ErrorKind::InvalidInput,
                "unsupported line settings",
            ));
        }
        state.read_timeout = Some(read_timeout);
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        let command = String::from_utf8_lossy(bytes);
        let targeted = state
            .fail_command
            .as_deref()
            .is_some_and(|c| c == command.trim_end_matches('\r'));
        if state.fail_writes || targeted {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link is down"));
        }
        state.written.extend_from_slice(bytes);
        Ok(())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.state().stale.clear();
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        let data = if state.stale.is_empty() {
            match state.replies.pop_front() {
                Some(reply) => reply,
                None => return Ok(0),
            }
        } else {
            std::mem::take(&mut state.stale)
        };
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}
