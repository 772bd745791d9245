//! Line transport abstraction
//!
//! The engine never touches a port directly. Anything that can write bytes
//! and hand back text lines (a serial port, a scripted mock, a simulated
//! device) can drive it.

use std::time::Duration;

use super::ProtocolError;

/// A byte channel that yields text lines
pub trait LineTransport {
    /// Open the underlying channel
    fn open(&mut self) -> Result<(), ProtocolError>;

    /// Whether the channel is currently open
    fn is_open(&self) -> bool;

    /// Write raw bytes
    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError>;

    /// Read one line, blocking for at most `timeout`.
    ///
    /// Returns the line without its `\r`/`\n` terminators, or an empty
    /// string if nothing arrived in time.
    fn read_line(&mut self, timeout: Duration) -> Result<String, ProtocolError>;
}

impl<T: LineTransport + ?Sized> LineTransport for Box<T> {
    fn open(&mut self) -> Result<(), ProtocolError> {
        (**self).open()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        (**self).write(bytes)
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String, ProtocolError> {
        (**self).read_line(timeout)
    }
}

/// Strip trailing line terminators from a raw line
pub(crate) fn strip_terminators(line: &mut Vec<u8>) {
    while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
        line.pop();
    }
}
