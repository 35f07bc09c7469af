//! ASCII command set of the smart motor.
//!
//! Every command is a short text token terminated by a carriage return.
//! Numeric arguments travel as integer device counts; replies to queries are a
//! single signed integer in the same counts.

use std::fmt;

use crate::error::ProtocolError;
use crate::mode::OperatingMode;

pub const TERMINATOR: char = '\r';

/// Physical quantity a value is expressed in, selecting its scale constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Position,
    Velocity,
    Acceleration,
}

/// Counts-per-unit constants, fixed for the lifetime of a controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    pub position: f32,
    pub velocity: f32,
    pub acceleration: f32,
}

impl Default for Scaling {
    fn default() -> Self {
        Self {
            position: 4.0,
            velocity: 32768.0,
            acceleration: 4.096,
        }
    }
}

impl Scaling {
    pub fn counts_per_unit(&self, quantity: Quantity) -> f32 {
        match quantity {
            Quantity::Position => self.position,
            Quantity::Velocity => self.velocity,
            Quantity::Acceleration => self.acceleration,
        }
    }

    /// Scale to device counts, truncating toward zero.
    ///
    /// Values beyond the `i32` range saturate; NaN becomes 0.
    pub fn to_counts(&self, quantity: Quantity, value: f32) -> i32 {
        (value * self.counts_per_unit(quantity)) as i32
    }

    pub fn from_counts(&self, quantity: Quantity, counts: i32) -> f32 {
        counts as f32 / self.counts_per_unit(quantity)
    }
}

/// Telemetry that can be read back from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Position,
    Velocity,
    TargetVelocity,
    Acceleration,
    TargetAcceleration,
}

impl Query {
    pub fn token(self) -> &'static str {
        match self {
            Query::Position => "RPA",
            Query::Velocity => "RVC",
            Query::TargetVelocity => "RVT",
            Query::Acceleration => "RAC",
            Query::TargetAcceleration => "RAT",
        }
    }

    pub fn quantity(self) -> Quantity {
        match self {
            Query::Position => Quantity::Position,
            Query::Velocity | Query::TargetVelocity => Quantity::Velocity,
            Query::Acceleration | Query::TargetAcceleration => Quantity::Acceleration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ignore the limit inputs, clear status bits and enter position mode.
    Arm,
    Go,
    Stop,
    Off,
    Reset,
    SetOrigin(i32),
    SetVelocity(i32),
    SetAcceleration(i32),
    /// Absolute position target, executed immediately.
    GoAbsolute(i32),
    /// Relative position target, executed immediately.
    GoRelative(i32),
    Query(Query),
    SelectMode(OperatingMode),
}

impl Command {
    /// Wire form including the terminator.
    pub fn encode(&self) -> String {
        format!("{self}{TERMINATOR}")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Arm => f.write_str("EIGN(2) EIGN(3) ZS MP"),
            Command::Go => f.write_str("G"),
            Command::Stop => f.write_str("X"),
            Command::Off => f.write_str("OFF"),
            Command::Reset => f.write_str("Z"),
            Command::SetOrigin(n) => write!(f, "O={n}"),
            Command::SetVelocity(n) => write!(f, "VT={n}"),
            Command::SetAcceleration(n) => write!(f, "ADT={n}"),
            Command::GoAbsolute(n) => write!(f, "PT={n} G"),
            Command::GoRelative(n) => write!(f, "PRT={n} G"),
            Command::Query(q) => f.write_str(q.token()),
            Command::SelectMode(m) => f.write_str(m.token()),
        }
    }
}

/// Parse a numeric reply.
///
/// Leading whitespace is skipped and the first signed integer token is
/// taken; anything after it (typically the `\r` terminator) is ignored.
pub fn parse_reply(reply: &[u8]) -> Result<i32, ProtocolError> {
    let text = String::from_utf8_lossy(reply);
    let trimmed = text.trim_start();
    if trimmed.trim_end().is_empty() {
        return Err(ProtocolError::EmptyReply);
    }

    let sign_len = usize::from(trimmed.starts_with(['+', '-']));
    let digits = trimmed[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return Err(ProtocolError::Malformed(trimmed.trim_end().to_string()));
    }

    trimmed[..sign_len + digits]
        .parse::<i32>()
        .map_err(|_| ProtocolError::Malformed(trimmed.trim_end().to_string()))
}
