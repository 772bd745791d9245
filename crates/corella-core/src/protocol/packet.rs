//! Payload packing
//!
//! Every `AT+SEND` payload is exactly `DATA_SIZE` characters on the wire.
//! Shorter data is right-padded with spaces, longer data is truncated.
//! No escaping is applied.

use std::fmt;

use super::DATA_SIZE;

/// How the packed form differs from the caller's data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackAdjustment {
    /// Data was shorter and got space-padded
    Padded,
    /// Data was longer and got truncated
    Truncated,
    /// Packed form differs at the same length. Padding and truncation never
    /// produce this, so it is unreachable in practice.
    Forced,
}

impl PackAdjustment {
    /// Advisory message for the log
    pub fn message(&self) -> String {
        match self {
            PackAdjustment::Padded => format!("Original message padded to {} bytes!", DATA_SIZE),
            PackAdjustment::Truncated => {
                format!("Original message truncated to {} bytes!", DATA_SIZE)
            }
            PackAdjustment::Forced => format!("Original message forced to {} bytes!", DATA_SIZE),
        }
    }
}

/// A fixed-width, wire-ready payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedPayload {
    data: String,
    adjustment: Option<PackAdjustment>,
}

impl PackedPayload {
    /// Pack caller data into exactly `DATA_SIZE` characters
    pub fn pack(data: &str) -> Self {
        let packed: String = format!("{:<width$.width$}", data, width = DATA_SIZE);

        let adjustment = if packed != data {
            let packed_len = packed.chars().count();
            let data_len = data.chars().count();
            Some(if packed_len > data_len {
                PackAdjustment::Padded
            } else if packed_len < data_len {
                PackAdjustment::Truncated
            } else {
                PackAdjustment::Forced
            })
        } else {
            None
        };

        Self {
            data: packed,
            adjustment,
        }
    }

    /// The packed text
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Length in characters (always `DATA_SIZE`)
    pub fn len(&self) -> usize {
        self.data.chars().count()
    }

    /// Always false; present for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// What packing did to the input, if anything
    pub fn adjustment(&self) -> Option<PackAdjustment> {
        self.adjustment
    }
}

impl fmt::Display for PackedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data)
    }
}

impl AsRef<str> for PackedPayload {
    fn as_ref(&self) -> &str {
        &self.data
    }
}
