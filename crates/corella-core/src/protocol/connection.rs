//! Connection management
//!
//! Owns the request/response cycle with the module: lazy connect, throttle
//! check, command write and multi-line response collection. The typed
//! accessors on [`Connection`] are thin wrappers over [`Connection::request`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use super::{
    Command, LedState, LineTransport, PackedPayload, ProtocolError, SerialTransport,
    ThrottleDirective, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS,
};
use crate::records::{Diagnostics, VersionInfo};

/// Log through `tracing` only when the connection is in verbose mode
macro_rules! verbose {
    ($conn:expr, $level:ident, $($arg:tt)+) => {
        if $conn.config.verbose {
            tracing::$level!($($arg)+);
        }
    };
}

/// Blocking sleep used for throttle waits
pub type Sleeper = Box<dyn FnMut(Duration) + Send>;

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-line read timeout in milliseconds
    pub timeout_ms: u64,
    /// Log every command, response and throttle decision
    pub verbose: bool,
    /// Check the module's throttle status before sending payloads
    pub handle_throttling: bool,
    /// Fail a response that grows past this many lines. `None` collects
    /// until the module goes quiet.
    pub max_response_lines: Option<usize>,
    /// Fail a response that takes longer than this overall. `None` only
    /// bounds each individual line read.
    pub max_response_wait_ms: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            verbose: true,
            handle_throttling: true,
            max_response_lines: None,
            max_response_wait_ms: None,
        }
    }
}

impl ConnectionConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ProtocolError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Write the config as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ProtocolError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Per-line read timeout; zero falls back to the default
    pub fn effective_timeout(&self) -> Duration {
        match self.timeout_ms {
            0 => Duration::from_millis(DEFAULT_TIMEOUT_MS),
            ms => Duration::from_millis(ms),
        }
    }

    /// Baud rate; zero falls back to the default
    pub fn effective_baud_rate(&self) -> u32 {
        match self.baud_rate {
            0 => DEFAULT_BAUD_RATE,
            baud => baud,
        }
    }
}

/// Connection to a Corella module over a line transport
pub struct Connection<T: LineTransport = SerialTransport> {
    transport: T,
    config: ConnectionConfig,
    sleeper: Sleeper,
}

impl Connection<SerialTransport> {
    /// Create a serial connection from the config (the port is opened on first use)
    pub fn new(config: ConnectionConfig) -> Self {
        let transport = SerialTransport::new(
            &config.port_name,
            config.effective_baud_rate(),
            config.effective_timeout(),
        );
        Self::with_transport(config, transport)
    }
}

impl<T: LineTransport> Connection<T> {
    /// Create a connection over any line transport
    pub fn with_transport(config: ConnectionConfig, transport: T) -> Self {
        Self {
            transport,
            config,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the function used to wait out throttling
    pub fn with_sleeper<F>(mut self, sleeper: F) -> Self
    where
        F: FnMut(Duration) + Send + 'static,
    {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether the transport is open
    pub fn connected(&self) -> bool {
        self.transport.is_open()
    }

    /// Open the transport if needed. Returns the resulting open state.
    pub fn connect(&mut self) -> Result<bool, ProtocolError> {
        if self.connected() {
            verbose!(self, warn, "Already connected!");
        } else {
            self.transport.open()?;
            verbose!(self, info, "Connected!");
        }
        Ok(self.connected())
    }

    /// Send a command and collect its response lines.
    ///
    /// With `throttle` set (and throttle handling enabled) the module's
    /// status is checked first and any requested wait is slept out.
    pub fn request(
        &mut self,
        command: &Command,
        throttle: bool,
    ) -> Result<Vec<String>, ProtocolError> {
        if !self.connected() {
            self.connect()?;
        }

        if throttle && self.config.handle_throttling {
            self.wait_throttle()?;
        }

        let encoded = command.encode();
        verbose!(self, info, "Requesting: {:?}", String::from_utf8_lossy(&encoded));
        self.transport.write(&encoded)?;

        let response = self.read_response()?;
        verbose!(self, info, "Response received: {:?}", response);
        Ok(response)
    }

    /// Read trimmed lines until an empty one (or a read timeout) ends the response
    fn read_response(&mut self) -> Result<Vec<String>, ProtocolError> {
        let line_timeout = self.config.effective_timeout();
        let started = Instant::now();
        let mut lines = Vec::new();

        let error = loop {
            let line = self.transport.read_line(line_timeout)?;
            let line = line.trim();
            if line.is_empty() {
                return Ok(lines);
            }
            lines.push(line.to_string());

            if let Some(max_lines) = self.config.max_response_lines {
                if lines.len() > max_lines {
                    break ProtocolError::ResponseTooLong(max_lines);
                }
            }
            if let Some(max_wait_ms) = self.config.max_response_wait_ms {
                if started.elapsed() >= Duration::from_millis(max_wait_ms) {
                    break ProtocolError::Timeout(max_wait_ms);
                }
            }
        };

        self.discard_response(line_timeout);
        Err(error)
    }

    /// Consume the rest of an abandoned response so the next request starts
    /// on a fresh one. Stops at the terminator, a read timeout or a read error.
    fn discard_response(&mut self, line_timeout: Duration) {
        let mut discarded = 0usize;
        while let Ok(line) = self.transport.read_line(line_timeout) {
            if line.trim().is_empty() {
                break;
            }
            discarded += 1;
        }
        verbose!(self, warn, "Discarded {} trailing response lines", discarded);
    }

    /// Query throttle status and sleep if the module asks for it. A single
    /// wait, never a loop.
    fn wait_throttle(&mut self) -> Result<(), ProtocolError> {
        verbose!(self, info, "Checking throttling...");
        let response = self.request_status()?;

        match ThrottleDirective::from_response(&response)? {
            ThrottleDirective::NoWait => {
                verbose!(self, info, "No throttling required");
            }
            directive @ ThrottleDirective::Wait(seconds) => {
                verbose!(self, info, "Waiting {} seconds for throttling...", seconds);
                if let Some(duration) = directive.sleep_duration() {
                    (self.sleeper)(duration);
                }
            }
        }
        Ok(())
    }

    /// Pack payload data to the fixed wire width, logging any adjustment
    pub fn pack(&self, data: &str) -> PackedPayload {
        let packed = PackedPayload::pack(data);
        if let Some(adjustment) = packed.adjustment() {
            verbose!(self, warn, "{}", adjustment.message());
        }
        packed
    }

    /// `AT`
    pub fn request_attention(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.request(&Command::Attention, false)
    }

    /// `AT+DIAGNOSTICS?`
    pub fn request_diagnostics(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.request(&Command::Diagnostics, false)
    }

    /// `AT+ID?`
    pub fn request_id(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.request(&Command::Id, false)
    }

    /// `AT+STATUS?`
    pub fn request_status(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.request(&Command::Status, false)
    }

    /// `AT+VERSION?`
    pub fn request_version(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.request(&Command::Version, false)
    }

    /// Current throttle status, parsed
    pub fn status(&mut self) -> Result<ThrottleDirective, ProtocolError> {
        let response = self.request_status()?;
        ThrottleDirective::from_response(&response)
    }

    /// Transmit a data payload. Returns the module's status line, normally
    /// `OK` or `ERROR`.
    pub fn send(&mut self, packet_id: u8, data: &str) -> Result<String, ProtocolError> {
        if !(1..=9).contains(&packet_id) {
            return Err(ProtocolError::InvalidPacketId(packet_id));
        }

        let command = Command::Send {
            packet_id,
            payload: self.pack(data),
        };
        let response = self.request(&command, command.is_throttled())?;
        last_line(response, &command)
    }

    /// Switch the LEDs, returning the confirmation line (`LEDS ON`/`LEDS OFF`)
    pub fn set_leds(&mut self, state: LedState) -> Result<String, ProtocolError> {
        let command = Command::Leds(state);
        let response = self.request(&command, false)?;
        last_line(response, &command)
    }

    /// Turn the LEDs on
    pub fn turn_on_leds(&mut self) -> Result<String, ProtocolError> {
        self.set_leds(LedState::On)
    }

    /// Turn the LEDs off
    pub fn turn_off_leds(&mut self) -> Result<String, ProtocolError> {
        self.set_leds(LedState::Off)
    }

    /// Unique device id used to match data on the network side
    pub fn id(&mut self) -> Result<String, ProtocolError> {
        let response = self.request_id()?;
        last_line(response, &Command::Id)
    }

    /// Internal diagnostics
    pub fn diagnostics(&mut self) -> Result<Diagnostics, ProtocolError> {
        let response = self.request_diagnostics()?;
        Diagnostics::from_lines(&response)
    }

    /// Supply voltage in volts
    pub fn battery(&mut self) -> Result<f64, ProtocolError> {
        self.diagnostics()?.battery()
    }

    /// Maximum internal temperature
    pub fn max_temp(&mut self) -> Result<f64, ProtocolError> {
        self.diagnostics()?.max_temp()
    }

    /// Minimum internal temperature
    pub fn min_temp(&mut self) -> Result<f64, ProtocolError> {
        self.diagnostics()?.min_temp()
    }

    /// Firmware and hardware versions
    pub fn version(&mut self) -> Result<VersionInfo, ProtocolError> {
        let response = self.request_version()?;
        VersionInfo::from_lines(&response)
    }

    /// Firmware version string
    pub fn firmware_version(&mut self) -> Result<String, ProtocolError> {
        self.version()?.firmware().map(str::to_string)
    }

    /// Hardware version string
    pub fn hardware_version(&mut self) -> Result<String, ProtocolError> {
        self.version()?.hardware().map(str::to_string)
    }
}

fn last_line(mut response: Vec<String>, command: &Command) -> Result<String, ProtocolError> {
    response
        .pop()
        .ok_or_else(|| ProtocolError::EmptyResponse(command.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::ScriptedTransport;
    use std::sync::{Arc, Mutex};

    fn quiet_config() -> ConnectionConfig {
        ConnectionConfig {
            verbose: false,
            ..ConnectionConfig::default()
        }
    }

    fn scripted(config: ConnectionConfig) -> (Connection<ScriptedTransport>, ScriptedTransport) {
        let handle = ScriptedTransport::new();
        let conn = Connection::with_transport(config, handle.clone());
        (conn, handle)
    }

    #[test]
    fn test_connection_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.effective_timeout(), Duration::from_secs(1));
        assert!(config.verbose);
        assert!(config.handle_throttling);
        assert_eq!(config.max_response_lines, None);
        assert_eq!(config.max_response_wait_ms, None);
    }

    #[test]
    fn test_new_serial_connection_is_closed() {
        let conn = Connection::new(ConnectionConfig {
            port_name: "/dev/ttyUSB9".to_string(),
            ..quiet_config()
        });
        assert!(!conn.connected());
        assert_eq!(conn.transport().port_name(), "/dev/ttyUSB9");
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (mut conn, handle) = scripted(ConnectionConfig::default());
        assert!(conn.connect().unwrap());
        assert!(conn.connect().unwrap());
        assert_eq!(handle.open_calls(), 1);
    }

    #[test]
    fn test_connect_failure_propagates() {
        let (mut conn, handle) = scripted(quiet_config());
        handle.fail_on_open(true);
        assert!(matches!(
            conn.request_attention(),
            Err(ProtocolError::PortNotFound(_))
        ));
        assert!(handle.written().is_empty());
    }

    #[test]
    fn test_request_collects_until_empty_line() {
        let (mut conn, handle) = scripted(quiet_config());
        handle.push_lines(&["  LINE 1 ", "LINE 2\r", "", "LEFTOVER"]);

        let response = conn.request(&Command::Diagnostics, false).unwrap();
        assert_eq!(response, vec!["LINE 1", "LINE 2"]);
        assert_eq!(handle.remaining(), 1);
    }

    #[test]
    fn test_max_response_lines() {
        let (mut conn, handle) = scripted(ConnectionConfig {
            max_response_lines: Some(2),
            ..quiet_config()
        });
        handle.push_response(&["A", "B", "C"]);
        assert!(matches!(
            conn.request_attention(),
            Err(ProtocolError::ResponseTooLong(2))
        ));
        assert_eq!(handle.remaining(), 0);

        // Exactly at the limit is fine
        let (mut conn, handle) = scripted(ConnectionConfig {
            max_response_lines: Some(2),
            ..quiet_config()
        });
        handle.push_response(&["A", "B"]);
        assert_eq!(conn.request_attention().unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_max_response_wait() {
        let (mut conn, handle) = scripted(ConnectionConfig {
            max_response_wait_ms: Some(0),
            ..quiet_config()
        });
        handle.push_response(&["A", "B"]);
        assert!(matches!(
            conn.request_attention(),
            Err(ProtocolError::Timeout(0))
        ));
        assert_eq!(handle.remaining(), 0);

        // A response that ends immediately never trips the bound
        let (mut conn, handle) = scripted(ConnectionConfig {
            max_response_wait_ms: Some(0),
            ..quiet_config()
        });
        handle.push_response(&[]);
        assert!(conn.request_attention().unwrap().is_empty());
    }

    #[test]
    fn test_throttle_sleeps_module_seconds_plus_one() {
        let slept = Arc::new(Mutex::new(Vec::new()));
        let recorder = slept.clone();

        let handle = ScriptedTransport::new();
        let mut conn = Connection::with_transport(quiet_config(), handle.clone())
            .with_sleeper(move |d| recorder.lock().unwrap().push(d));

        handle.push_response(&["WAIT 3 SEC"]);
        handle.push_response(&["OK"]);

        assert_eq!(conn.send(1, "hello").unwrap(), "OK");
        assert_eq!(*slept.lock().unwrap(), vec![Duration::from_secs(4)]);
    }

    #[test]
    fn test_bad_status_line_aborts_send() {
        let (mut conn, handle) = scripted(quiet_config());
        handle.push_response(&["BUSY"]);

        assert!(matches!(
            conn.send(1, "hello"),
            Err(ProtocolError::InvalidThrottle(ref l)) if l == "BUSY"
        ));
        // Only the status query went out
        assert_eq!(handle.written_text(), vec!["AT+STATUS?\r\n"]);
    }

    #[test]
    fn test_packet_id_range() {
        let (mut conn, handle) = scripted(quiet_config());
        assert!(matches!(
            conn.send(0, "x"),
            Err(ProtocolError::InvalidPacketId(0))
        ));
        assert!(matches!(
            conn.send(10, "x"),
            Err(ProtocolError::InvalidPacketId(10))
        ));
        assert_eq!(handle.open_calls(), 0);
    }

    #[test]
    fn test_empty_response_for_single_line_accessor() {
        let (mut conn, handle) = scripted(quiet_config());
        handle.push_response(&[]);
        assert!(matches!(
            conn.id(),
            Err(ProtocolError::EmptyResponse(ref c)) if c == "AT+ID?"
        ));
    }

    #[test]
    fn test_status_directive() {
        let (mut conn, handle) = scripted(quiet_config());
        handle.push_response(&["WAIT 12 SEC"]);
        assert_eq!(conn.status().unwrap(), ThrottleDirective::Wait(12));
        handle.push_response(&[]);
        assert_eq!(conn.status().unwrap(), ThrottleDirective::NoWait);
    }

    #[test]
    fn test_overlong_response_does_not_leak_into_next_request() {
        let (mut conn, handle) = scripted(ConnectionConfig {
            max_response_lines: Some(1),
            ..quiet_config()
        });
        handle.push_response(&["BATTERY=3.90V", "MAX TEMP=25", "MIN TEMP=10"]);
        handle.push_response(&["00A4F19C"]);

        assert!(matches!(
            conn.diagnostics(),
            Err(ProtocolError::ResponseTooLong(1))
        ));
        assert_eq!(conn.id().unwrap(), "00A4F19C");
    }

    #[test]
    fn test_slow_response_does_not_leak_into_next_request() {
        let (mut conn, handle) = scripted(ConnectionConfig {
            max_response_wait_ms: Some(0),
            ..quiet_config()
        });
        handle.push_response(&["F.W=1.2", "H.W=A1"]);
        handle.push_response(&[]);

        assert!(matches!(conn.version(), Err(ProtocolError::Timeout(0))));
        // The empty status response is read as its own, not the version tail
        assert_eq!(conn.status().unwrap(), ThrottleDirective::NoWait);
        assert_eq!(handle.remaining(), 0);
    }

    #[test]
    fn test_drain_stops_at_read_timeout() {
        let (mut conn, handle) = scripted(ConnectionConfig {
            max_response_lines: Some(0),
            ..quiet_config()
        });
        // No terminator queued: the exhausted script reads as a timeout
        handle.push_lines(&["A", "B"]);

        assert!(matches!(
            conn.request_attention(),
            Err(ProtocolError::ResponseTooLong(0))
        ));
        assert_eq!(handle.remaining(), 0);
    }

    #[test]
    fn test_zero_timeout_and_baud_fall_back_to_defaults() {
        let config = ConnectionConfig {
            port_name: "/dev/ttyUSB9".to_string(),
            baud_rate: 0,
            timeout_ms: 0,
            ..quiet_config()
        };
        assert_eq!(
            config.effective_timeout(),
            Duration::from_millis(DEFAULT_TIMEOUT_MS)
        );
        assert_eq!(config.effective_baud_rate(), DEFAULT_BAUD_RATE);

        let conn = Connection::new(config);
        assert_eq!(conn.transport().baud_rate(), DEFAULT_BAUD_RATE);
        assert_eq!(
            conn.transport().timeout(),
            Duration::from_millis(DEFAULT_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_explicit_timeout_and_baud_are_kept() {
        let config = ConnectionConfig {
            baud_rate: 19200,
            timeout_ms: 250,
            ..quiet_config()
        };
        assert_eq!(config.effective_timeout(), Duration::from_millis(250));
        assert_eq!(config.effective_baud_rate(), 19200);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corella.json");

        let config = ConnectionConfig {
            port_name: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
            max_response_lines: Some(16),
            ..ConnectionConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ConnectionConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_config_file_partial_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corella.json");
        fs::write(&path, r#"{ "port_name": "COM3", "verbose": false }"#).unwrap();

        let config = ConnectionConfig::from_file(&path).unwrap();
        assert_eq!(config.port_name, "COM3");
        assert!(!config.verbose);
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert!(config.handle_throttling);
    }

    #[test]
    fn test_config_file_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corella.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ConnectionConfig::from_file(&path),
            Err(ProtocolError::ConfigError(_))
        ));
    }
}
