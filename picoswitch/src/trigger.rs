//! Reboot-to-bootloader trigger for the native C++ firmware.
//!
//! The native image watches its USB console for single-key commands. Current
//! builds reboot into BOOTSEL on `b`; older builds expect `r` followed by `u`.
//! Both are sent, unacknowledged. Whether the trigger worked is only known
//! once the `RPI-RP2` volume shows up.

use crate::error::Result;
use crate::port::Port;
use log::{debug, trace};
use std::thread;
use std::time::Duration;

/// Trigger understood by current native firmware builds.
pub const PRIMARY_TRIGGER: &[u8] = b"b";

/// Two-key trigger of older native firmware builds.
// TODO: drop once no deployed native build still expects the `r`/`u` sequence.
pub const LEGACY_TRIGGER: &[u8] = b"ru";

/// Delay between the primary and legacy triggers.
pub const TRIGGER_SETTLE: Duration = Duration::from_millis(150);

/// Per-operation timeout for the trigger connection.
pub const TRIGGER_PORT_TIMEOUT: Duration = Duration::from_millis(200);

/// Ask the native firmware on `port` to reboot into BOOTSEL.
pub fn send_reboot_trigger<P: Port + ?Sized>(port: &mut P, settle: Duration) -> Result<()> {
    debug!("Sending BOOTSEL trigger to {}", port.name());

    port.write_all_bytes(PRIMARY_TRIGGER)?;
    trace!("Primary trigger sent, settling for {settle:?}");
    thread::sleep(settle);

    port.write_all_bytes(LEGACY_TRIGGER)?;
    trace!("Legacy trigger sent");
    Ok(())
}
