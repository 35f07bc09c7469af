//! Serial command channel, ASCII command protocol and motor controller for a
//! single-axis smart motor, plus the rangefinder that feeds the balance loop.

pub mod channel;
pub mod controller;
pub mod error;
pub mod link;
pub mod mode;
pub mod protocol;
pub mod rangefinder;

pub use channel::{SerialChannel, SerialSettings, REPLY_BUFFER_LEN};
pub use controller::{MotorController, MotorSettings, MotorLimits};
pub use error::{MotorError, ProtocolError, Result};
pub use link::{Link, MemoryLink, BAUD_RATE};
pub use mode::OperatingMode;
pub use protocol::{Command, Quantity, Query, Scaling};
pub use rangefinder::{DistanceSensor, MovingAverage, Rangefinder};
