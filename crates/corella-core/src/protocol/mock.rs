//! Scripted transport for tests
//!
//! Replays a queue of lines and records everything written to it. Clones
//! share the same state, so a test can hand one clone to a [`Connection`]
//! and inspect the other afterwards.
//!
//! [`Connection`]: super::Connection

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{LineTransport, ProtocolError};

#[derive(Debug, Default)]
struct ScriptState {
    open: bool,
    open_calls: usize,
    lines: VecDeque<String>,
    written: Vec<Vec<u8>>,
    fail_on_open: bool,
    fail_on_write: bool,
}

/// In-memory [`LineTransport`] driven by a script of lines
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    /// Create a closed transport with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        // A panicking test thread can't leave the script half-written
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue raw lines exactly as given
    pub fn push_lines(&self, lines: &[&str]) -> &Self {
        self.state()
            .lines
            .extend(lines.iter().map(|l| l.to_string()));
        self
    }

    /// Queue one complete response: the lines followed by an empty terminator
    pub fn push_response(&self, lines: &[&str]) -> &Self {
        self.push_lines(lines);
        self.push_lines(&[""])
    }

    /// Make the next `open` fail
    pub fn fail_on_open(&self, fail: bool) -> &Self {
        self.state().fail_on_open = fail;
        self
    }

    /// Make every `write` fail
    pub fn fail_on_write(&self, fail: bool) -> &Self {
        self.state().fail_on_write = fail;
        self
    }

    /// Mark the transport as already open
    pub fn set_open(&self, open: bool) -> &Self {
        self.state().open = open;
        self
    }

    /// Number of times `open` was called
    pub fn open_calls(&self) -> usize {
        self.state().open_calls
    }

    /// Every write, in order
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    /// Every write decoded as text, in order
    pub fn written_text(&self) -> Vec<String> {
        self.state()
            .written
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Lines still queued
    pub fn remaining(&self) -> usize {
        self.state().lines.len()
    }
}

impl LineTransport for ScriptedTransport {
    fn open(&mut self) -> Result<(), ProtocolError> {
        let mut state = self.state();
        state.open_calls += 1;
        if state.fail_on_open {
            return Err(ProtocolError::PortNotFound("scripted".to_string()));
        }
        state.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let mut state = self.state();
        if !state.open {
            return Err(ProtocolError::NotConnected);
        }
        if state.fail_on_write {
            return Err(ProtocolError::SerialError("scripted write failure".to_string()));
        }
        state.written.push(bytes.to_vec());
        Ok(())
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<String, ProtocolError> {
        let mut state = self.state();
        if !state.open {
            return Err(ProtocolError::NotConnected);
        }
        // An exhausted script behaves like a read timeout
        Ok(state.lines.pop_front().unwrap_or_default())
    }
}
