//! Serial operations used by detection and switching.
//!
//! Every operation opens its own connection and closes it before returning.
//! `mpremote` opens the same device independently, so a handle must never be
//! held across steps.

use crate::banner::{BANNER_READ_TIMEOUT, Banner, read_banner};
use crate::error::Result;
use crate::port::{DEFAULT_BAUD, NativePort, Port, SerialConfig};
use crate::trigger::{TRIGGER_PORT_TIMEOUT, TRIGGER_SETTLE, send_reboot_trigger};
use std::path::Path;
use std::time::Duration;

/// Serial-side collaborator of the detector and the orchestrator.
pub trait SerialLink {
    /// Listen on `port` for a firmware banner for at most `timeout`.
    fn read_banner(&self, port: &str, timeout: Duration) -> Result<Banner>;

    /// Send the native firmware's reboot-to-BOOTSEL trigger on `port`.
    fn send_reboot_trigger(&self, port: &str) -> Result<()>;

    /// Whether the serial device node currently exists.
    fn port_present(&self, port: &str) -> bool;
}

/// [`SerialLink`] over real serial devices.
#[derive(Debug, Clone, Copy)]
pub struct NativeSerialLink {
    baud_rate: u32,
}

impl Default for NativeSerialLink {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD,
        }
    }
}

impl NativeSerialLink {
    /// Create a link using the given baud rate.
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

impl SerialLink for NativeSerialLink {
    fn read_banner(&self, port: &str, timeout: Duration) -> Result<Banner> {
        let config = SerialConfig::new(port, self.baud_rate).with_timeout(BANNER_READ_TIMEOUT);
        let mut serial = NativePort::open(&config)?;
        let banner = read_banner(&mut serial, timeout);
        serial.close()?;
        banner
    }

    fn send_reboot_trigger(&self, port: &str) -> Result<()> {
        let config = SerialConfig::new(port, self.baud_rate).with_timeout(TRIGGER_PORT_TIMEOUT);
        let mut serial = NativePort::open(&config)?;
        let sent = send_reboot_trigger(&mut serial, TRIGGER_SETTLE);
        serial.close()?;
        sent
    }

    fn port_present(&self, port: &str) -> bool {
        Path::new(port).exists()
    }
}
