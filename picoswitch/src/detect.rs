//! Boot-mode detection.
//!
//! Signals are consulted from most to least authoritative:
//!
//! 1. the `RPI-RP2` block device (the OS cannot be wrong about it),
//! 2. the serial banner (a one-shot broadcast that may already be gone),
//! 3. an active MicroPython probe through `mpremote`.
//!
//! The first signal that answers decides; later ones are never consulted.

use crate::device::BlockDevice;
use crate::error::Result;
use crate::host::Host;
use crate::mode::Mode;
use crate::probe::probe_micropython;
use log::{debug, info, warn};
use std::time::Duration;

/// What a detection was based on.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "source", rename_all = "snake_case"))]
pub enum Evidence {
    /// The bootloader volume is present.
    Volume {
        /// The matching block device.
        device: BlockDevice,
    },
    /// A banner marker was read on the serial port.
    Banner {
        /// Line that carried the marker.
        line: String,
    },
    /// MicroPython answered the probe.
    Probe,
    /// No signal answered.
    Nothing {
        /// Last non-empty serial line, if any was seen.
        last_line: String,
    },
    /// Detection itself failed.
    Failed {
        /// Rendered error.
        error: String,
    },
}

impl Evidence {
    /// Short name of the signal, matching the serialized `source` tag.
    pub fn source(&self) -> &'static str {
        match self {
            Self::Volume { .. } => "volume",
            Self::Banner { .. } => "banner",
            Self::Probe => "probe",
            Self::Nothing { .. } => "nothing",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Outcome of a detection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Detection {
    /// Detected mode, [`Mode::Unknown`] if nothing answered.
    pub mode: Mode,
    /// Why.
    pub evidence: Evidence,
}

impl Detection {
    /// A human-readable hint for an undetermined result, if there is one.
    pub fn diagnostic(&self) -> Option<String> {
        match &self.evidence {
            Evidence::Nothing { last_line } if !last_line.is_empty() => {
                Some(format!("last serial output: {last_line}"))
            },
            Evidence::Failed { error } => Some(error.clone()),
            _ => None,
        }
    }
}

/// Detect the current mode, keeping track of which signal decided.
///
/// `timeout` bounds the banner scan only. Errors from the block-device
/// enumeration or the serial port are returned; probe failures are not.
pub fn detect(host: &Host, port: &str, timeout: Duration) -> Result<Detection> {
    if let Some(device) = host.locator.locate()? {
        debug!("Bootloader volume present on /dev/{}", device.name);
        return Ok(Detection {
            mode: Mode::Bootloader,
            evidence: Evidence::Volume { device },
        });
    }

    let banner = host.serial.read_banner(port, timeout)?;
    if let Some(mode) = banner.mode {
        return Ok(Detection {
            mode,
            evidence: Evidence::Banner {
                line: banner.last_line,
            },
        });
    }
    if !banner.last_line.is_empty() {
        info!("Serial banner: {}", banner.last_line);
    }

    if probe_micropython(host.bridge.as_ref(), port) {
        return Ok(Detection {
            mode: Mode::ManagedRuntime,
            evidence: Evidence::Probe,
        });
    }

    Ok(Detection {
        mode: Mode::Unknown,
        evidence: Evidence::Nothing {
            last_line: banner.last_line,
        },
    })
}

/// Detect the current mode.
pub fn detect_mode(host: &Host, port: &str, timeout: Duration) -> Result<Mode> {
    detect(host, port, timeout).map(|d| d.mode)
}

/// Like [`detect`], but never fails: errors become [`Mode::Unknown`] with
/// [`Evidence::Failed`].
pub fn detect_mode_safe(host: &Host, port: &str, timeout: Duration) -> Detection {
    detect(host, port, timeout).unwrap_or_else(|e| {
        warn!("Mode detection failed: {e}");
        Detection {
            mode: Mode::Unknown,
            evidence: Evidence::Failed {
                error: e.to_string(),
            },
        }
    })
}
