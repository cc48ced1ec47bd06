//! Port abstraction for serial communication with the board.
//!
//! The banner reader and the native reboot trigger only need a handful of
//! operations on a serial connection. They are written against the [`Port`]
//! trait so tests can drive them with scripted in-memory ports, while
//! [`NativePort`] provides the real implementation on top of the
//! `serialport` crate.
//!
//! ```text
//! +------------------+   +------------------+
//! |  banner reader   |   |  reboot trigger  |
//! +--------+---------+   +--------+---------+
//!          |                      |
//!          v                      v
//! +--------+----------------------+---------+
//! |               Port trait                |
//! +--------+----------------------+---------+
//!          |                      |
//!          v                      v
//! +--------+---------+   +--------+---------+
//! |    NativePort    |   |  scripted ports  |
//! |   (serialport)   |   |     (tests)      |
//! +------------------+   +------------------+
//! ```

pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

pub use native::NativePort;

/// Baud rate used for the Pico's USB CDC console.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Serial port configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Per-read timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(1000),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the per-read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Unified port trait for serial communication.
pub trait Port: Read + Write + Send {
    /// Discard anything received but not yet read.
    fn clear_input(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes and flush, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock;
