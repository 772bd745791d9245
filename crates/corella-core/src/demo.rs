//! Demo Mode - Simulated Corella module
//!
//! Answers the full AT command set without hardware attached. Diagnostics
//! drift slowly and the network budget runs out after a few sends, so the
//! throttle path gets exercised too.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::protocol::{LineTransport, ProtocolError, DATA_SIZE, RESPONSE_ERROR, RESPONSE_OK};

/// Sends allowed before the simulated network asks for a break
const DEFAULT_SEND_BUDGET: u32 = 3;

/// Length of the simulated break
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// A packet accepted by the simulated module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    /// Packet id, 1-9
    pub packet_id: u8,
    /// Payload exactly as received
    pub payload: String,
}

/// Simulated module implementing [`LineTransport`]
pub struct DemoDevice {
    open: bool,
    id: String,
    firmware: String,
    hardware: String,
    leds_on: bool,
    /// Pending response lines, terminator included
    pending: VecDeque<String>,
    battery_volts: f64,
    max_temp: f64,
    min_temp: f64,
    send_budget: u32,
    sends_left: u32,
    window: Duration,
    throttled_until: Option<Instant>,
    sent: Vec<SentPacket>,
    rng: StdRng,
}

impl Default for DemoDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoDevice {
    /// Create a simulated module with random diagnostics drift
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a simulated module with reproducible diagnostics
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            open: false,
            id: "00A4F19C".to_string(),
            firmware: "1.3.0".to_string(),
            hardware: "REV-B".to_string(),
            leds_on: false,
            pending: VecDeque::new(),
            battery_volts: 3.90,
            max_temp: 28.0,
            min_temp: 14.0,
            send_budget: DEFAULT_SEND_BUDGET,
            sends_left: DEFAULT_SEND_BUDGET,
            window: DEFAULT_WINDOW,
            throttled_until: None,
            sent: Vec::new(),
            rng,
        }
    }

    /// Change how many sends are allowed per window and how long the break lasts
    pub fn with_throttle(mut self, send_budget: u32, window: Duration) -> Self {
        self.send_budget = send_budget;
        self.sends_left = send_budget;
        self.window = window;
        self
    }

    /// Device id reported by `AT+ID?`
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current LED state
    pub fn leds_on(&self) -> bool {
        self.leds_on
    }

    /// Packets accepted so far
    pub fn sent(&self) -> &[SentPacket] {
        &self.sent
    }

    /// Nudge the diagnostics so consecutive reads differ a little
    fn drift(&mut self) {
        self.battery_volts = (self.battery_volts + self.rng.gen_range(-0.02..0.02)).clamp(3.3, 4.2);
        let temp = self.rng.gen_range(15.0..30.0);
        self.max_temp = self.max_temp.max(temp);
        self.min_temp = self.min_temp.min(temp);
    }

    /// Seconds left in the current break, if any
    fn throttle_remaining(&mut self) -> Option<u64> {
        let until = self.throttled_until?;
        let now = Instant::now();
        if now >= until {
            self.throttled_until = None;
            self.sends_left = self.send_budget;
            return None;
        }
        let remaining = until - now;
        // Round up so a partial second still reads as a wait
        Some(remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0))
    }

    fn handle_send(&mut self, args: &str) -> String {
        if self.throttle_remaining().is_some() {
            return RESPONSE_ERROR.to_string();
        }

        let Some((id, payload)) = args.split_once(',') else {
            return RESPONSE_ERROR.to_string();
        };
        let packet_id = match id.parse::<u8>() {
            Ok(n @ 1..=9) => n,
            _ => return RESPONSE_ERROR.to_string(),
        };
        if payload.chars().count() != DATA_SIZE {
            return RESPONSE_ERROR.to_string();
        }

        self.sent.push(SentPacket {
            packet_id,
            payload: payload.to_string(),
        });

        self.sends_left = self.sends_left.saturating_sub(1);
        if self.sends_left == 0 {
            self.throttled_until = Some(Instant::now() + self.window);
        }
        RESPONSE_OK.to_string()
    }

    /// Response lines for one command line
    fn respond(&mut self, command: &str) -> Vec<String> {
        match command {
            "AT" => vec![RESPONSE_OK.to_string()],
            "AT+ID?" => vec![self.id.clone()],
            "AT+DIAGNOSTICS?" => {
                self.drift();
                vec![
                    format!("BATTERY={:.2}V", self.battery_volts),
                    format!("MAX TEMP={:.0}", self.max_temp),
                    format!("MIN TEMP={:.0}", self.min_temp),
                ]
            }
            "AT+VERSION?" => vec![
                RESPONSE_OK.to_string(),
                format!("F.W={}", self.firmware),
                format!("H.W={}", self.hardware),
            ],
            "AT+STATUS?" => match self.throttle_remaining() {
                Some(secs) => vec![format!("WAIT {} SEC", secs)],
                None => vec![RESPONSE_OK.to_string()],
            },
            "AT+LEDS=ON" => {
                self.leds_on = true;
                vec!["LEDS ON".to_string()]
            }
            "AT+LEDS=OFF" => {
                self.leds_on = false;
                vec!["LEDS OFF".to_string()]
            }
            _ => match command.strip_prefix("AT+SEND=") {
                Some(args) => vec![self.handle_send(args)],
                None => vec![RESPONSE_ERROR.to_string()],
            },
        }
    }
}

impl LineTransport for DemoDevice {
    fn open(&mut self) -> Result<(), ProtocolError> {
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        if !self.open {
            return Err(ProtocolError::NotConnected);
        }
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;

        for command in text.split("\r\n").filter(|c| !c.is_empty()) {
            let lines = self.respond(command);
            self.pending.extend(lines);
            self.pending.push_back(String::new());
        }
        Ok(())
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<String, ProtocolError> {
        if !self.open {
            return Err(ProtocolError::NotConnected);
        }
        Ok(self.pending.pop_front().unwrap_or_default())
    }
}
