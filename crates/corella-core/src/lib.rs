//! # Corella Core Library
//!
//! Client-side driver for the Corella wireless sensor module.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A line-based AT-command protocol engine
//! - Throttle-aware payload transmission
//! - Fixed-width payload packing
//! - Parsers for the diagnostics and version responses
//! - A serial-port transport and a simulated device for testing
//!
//! ## Example
//!
//! ```rust,ignore
//! use corella_core::protocol::{Connection, ConnectionConfig};
//!
//! let config = ConnectionConfig {
//!     port_name: "/dev/ttyUSB0".to_string(),
//!     ..ConnectionConfig::default()
//! };
//! let mut conn = Connection::new(config);
//!
//! println!("Device: {}", conn.id()?);
//! println!("Battery: {:.2} V", conn.battery()?);
//! conn.send(1, "hello")?;
//! ```

pub mod demo;
pub mod protocol;
pub mod records;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::demo::DemoDevice;
    pub use crate::protocol::{
        Command, Connection, ConnectionConfig, LedState, LineTransport, PackedPayload,
        ProtocolError, SerialTransport, ThrottleDirective,
    };
    pub use crate::records::{Diagnostics, VersionInfo};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
