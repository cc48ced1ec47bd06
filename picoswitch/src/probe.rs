//! Active MicroPython liveness probe.

use crate::bridge::{ToolBridge, exec_args};
use crate::mode::MICROPYTHON_MARKER;
use log::debug;

/// Ask the device to run a trivial statement through the bridge.
///
/// Returns `true` only if MicroPython executed it. Every failure, including
/// the tool not being installed, is reported as `false`.
pub fn probe_micropython(bridge: &dyn ToolBridge, port: &str) -> bool {
    let code = format!("print('{MICROPYTHON_MARKER}')");
    match bridge.run(&exec_args(port, &code), true, true) {
        Ok(output) if output.success() => {
            debug!("Detected MicroPython via {} probe", bridge.program());
            true
        },
        Ok(output) => {
            let err = output.error_text();
            if !err.is_empty() {
                debug!("{} probe failed: {err}", bridge.program());
            }
            false
        },
        Err(e) => {
            debug!("{} probe failed: {e}", bridge.program());
            false
        },
    }
}
