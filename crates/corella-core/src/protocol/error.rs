//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the module
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Not connected to device")]
    NotConnected,

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Response not completed within {0} ms")]
    Timeout(u64),

    #[error("Response exceeded {0} lines")]
    ResponseTooLong(usize),

    #[error("Empty response to '{0}'")]
    EmptyResponse(String),

    #[error("Unexpected status line: '{0}'")]
    InvalidThrottle(String),

    #[error("Malformed field line: '{0}'")]
    MalformedField(String),

    #[error("Missing field '{0}' in response")]
    MissingField(String),

    #[error("Invalid number for '{field}': '{value}'")]
    InvalidNumber { field: String, value: String },

    #[error("Packet id {0} out of range (1-9)")]
    InvalidPacketId(u8),

    #[error("Response is not valid UTF-8")]
    InvalidUtf8,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serialport::Error> for ProtocolError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(err.description),
            serialport::ErrorKind::Io(kind) => {
                ProtocolError::IoError(std::io::Error::new(kind, err.description))
            }
            _ => ProtocolError::SerialError(err.description),
        }
    }
}
