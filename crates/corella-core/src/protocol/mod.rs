//! AT-Command Protocol
//!
//! Implements the line-based AT-command protocol spoken by the Corella module.
//!
//! Commands are single text lines terminated by CRLF. Responses are one or
//! more text lines closed by an empty line (or a read timeout).

pub mod commands;
mod connection;
mod error;
pub mod mock;
mod packet;
pub mod serial;
mod throttle;
mod transport;

pub use commands::{Command, LedState};
pub use connection::{Connection, ConnectionConfig, Sleeper};
pub use error::ProtocolError;
pub use packet::{PackAdjustment, PackedPayload};
pub use serial::{list_ports, PortInfo, SerialTransport};
pub use throttle::ThrottleDirective;
pub use transport::LineTransport;

/// Default baud rate for the module's UART
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default per-line read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Width of a packed payload in characters
pub const DATA_SIZE: usize = 12;

/// Success status line
pub const RESPONSE_OK: &str = "OK";

/// Failure status line
pub const RESPONSE_ERROR: &str = "ERROR";
