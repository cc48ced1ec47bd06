//! Post-boot helper provisioning for MicroPython.

use crate::bridge::{ToolBridge, copy_args};
use crate::error::{Error, Result};
use crate::link::SerialLink;
use log::{debug, info};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// Delay between checks for the serial device node.
pub const SERIAL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Wait until the serial device node for `port` exists.
///
/// After a flash the board re-enumerates on USB, so the node disappears for
/// a while. Checks at least once even with a zero `timeout`.
pub fn wait_for_serial_port(link: &dyn SerialLink, port: &str, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if link.port_present(port) {
            debug!("Serial port {port} is present");
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout(format!("waiting for serial port: {port}")));
        }
        thread::sleep(SERIAL_POLL_INTERVAL.min(deadline - now));
    }
}

/// Copy helper files onto the device filesystem, in order.
///
/// Every file is checked locally before the first copy, so a typo in the
/// list never leaves the device half-provisioned. Stops at the first copy
/// that fails.
pub fn install_helpers(
    bridge: &dyn ToolBridge,
    port: &str,
    files: &[PathBuf],
    quiet: bool,
) -> Result<()> {
    if let Some(missing) = files.iter().find(|f| !f.is_file()) {
        return Err(Error::MissingFile {
            kind: "helper file",
            path: missing.clone(),
        });
    }

    for file in files {
        info!("Copying {} to device", file.display());
        bridge.run(&copy_args(port, &file.to_string_lossy()), quiet, false)?;
    }
    Ok(())
}
