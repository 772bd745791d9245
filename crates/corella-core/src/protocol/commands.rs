//! Protocol commands
//!
//! Defines the AT commands understood by the Corella module.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::PackedPayload;

/// LED state for `AT+LEDS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedState {
    /// LEDs lit
    On,
    /// LEDs dark
    Off,
}

impl LedState {
    /// Wire form of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            LedState::On => "ON",
            LedState::Off => "OFF",
        }
    }
}

/// AT commands for module communication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Attention probe (`AT`)
    Attention,

    /// Query internal diagnostics (`AT+DIAGNOSTICS?`)
    Diagnostics,

    /// Query the unique device id (`AT+ID?`)
    Id,

    /// Query network throttle status (`AT+STATUS?`)
    Status,

    /// Query firmware and hardware versions (`AT+VERSION?`)
    Version,

    /// Switch the LEDs on or off (`AT+LEDS=...`)
    Leds(LedState),

    /// Transmit a packed payload (`AT+SEND=...`)
    Send {
        /// Packet id, 1-9
        packet_id: u8,
        /// Fixed-width payload
        payload: PackedPayload,
    },
}

impl Command {
    /// Encode the command as a CRLF-terminated line
    pub fn encode(&self) -> Vec<u8> {
        encode_command(&self.to_string())
    }

    /// Whether the command spends the device's network budget and should
    /// wait out throttling first
    pub fn is_throttled(&self) -> bool {
        matches!(self, Command::Send { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Attention => f.write_str("AT"),
            Command::Diagnostics => f.write_str("AT+DIAGNOSTICS?"),
            Command::Id => f.write_str("AT+ID?"),
            Command::Status => f.write_str("AT+STATUS?"),
            Command::Version => f.write_str("AT+VERSION?"),
            Command::Leds(state) => write!(f, "AT+LEDS={}", state.as_str()),
            Command::Send { packet_id, payload } => write!(f, "AT+SEND={},{}", packet_id, payload),
        }
    }
}

/// Encode a raw command line for transmission
pub fn encode_command(command: &str) -> Vec<u8> {
    format!("{}\r\n", command).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_text() {
        assert_eq!(Command::Attention.to_string(), "AT");
        assert_eq!(Command::Diagnostics.to_string(), "AT+DIAGNOSTICS?");
        assert_eq!(Command::Id.to_string(), "AT+ID?");
        assert_eq!(Command::Status.to_string(), "AT+STATUS?");
        assert_eq!(Command::Version.to_string(), "AT+VERSION?");
        assert_eq!(Command::Leds(LedState::On).to_string(), "AT+LEDS=ON");
        assert_eq!(Command::Leds(LedState::Off).to_string(), "AT+LEDS=OFF");
    }

    #[test]
    fn test_send_command_text() {
        let cmd = Command::Send {
            packet_id: 3,
            payload: PackedPayload::pack("abc"),
        };
        assert_eq!(cmd.to_string(), "AT+SEND=3,abc         ");
    }

    #[test]
    fn test_encode() {
        assert_eq!(Command::Attention.encode(), b"AT\r\n".to_vec());
        assert_eq!(encode_command("AT+ID?"), b"AT+ID?\r\n".to_vec());
    }

    #[test]
    fn test_only_send_is_throttled() {
        assert!(!Command::Status.is_throttled());
        assert!(!Command::Leds(LedState::On).is_throttled());
        assert!(Command::Send {
            packet_id: 1,
            payload: PackedPayload::pack("x"),
        }
        .is_throttled());
    }
}
