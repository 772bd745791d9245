//! Network throttle handling
//!
//! Before spending network budget the module is asked for its status. It
//! answers with nothing, `OK`, or `WAIT <n> SEC`.

use std::time::Duration;

use super::{ProtocolError, RESPONSE_OK};

/// What the status query says about sending now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDirective {
    /// Free to send
    NoWait,
    /// The module asked to hold off for this many seconds. Signed, since the
    /// module has been seen to report a negative figure as the window closes.
    Wait(i64),
}

impl ThrottleDirective {
    /// Interpret a status response. Only the last line counts.
    pub fn from_response(response: &[String]) -> Result<Self, ProtocolError> {
        match response.last() {
            None => Ok(ThrottleDirective::NoWait),
            Some(line) if line == RESPONSE_OK => Ok(ThrottleDirective::NoWait),
            Some(line) => Self::parse_wait(line),
        }
    }

    /// Parse a `<token> <seconds> <token>` line
    fn parse_wait(line: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidThrottle(line.to_string());

        let parts: Vec<&str> = line.split_whitespace().collect();
        let [_, seconds, _] = parts.as_slice() else {
            return Err(invalid());
        };
        let seconds = seconds.parse::<i64>().map_err(|_| invalid())?;
        Ok(ThrottleDirective::Wait(seconds))
    }

    /// How long to sleep before sending. The module's figure gets one extra
    /// second of margin; a negative total is clamped to zero.
    pub fn sleep_duration(&self) -> Option<Duration> {
        match self {
            ThrottleDirective::NoWait => None,
            ThrottleDirective::Wait(seconds) => {
                let secs = u64::try_from(seconds.saturating_add(1)).unwrap_or(0);
                Some(Duration::from_secs(secs))
            }
        }
    }
}
