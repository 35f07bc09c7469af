use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MotorError {
    #[error("serial device {path} unavailable: {source}")]
    DeviceUnavailable {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to send {command:?}: {source}")]
    Write {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("serial read failed: {0}")]
    Read(#[source] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A reply that could not be turned into the expected number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("device sent no reply")]
    EmptyReply,

    #[error("malformed reply {0:?}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, MotorError>;

impl MotorError {
    pub fn is_protocol(&self) -> bool {
        matches!(self, MotorError::Protocol(_))
    }

    pub fn is_write(&self) -> bool {
        matches!(self, MotorError::Write { .. })
    }
}
