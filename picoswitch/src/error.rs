//! Error types for picoswitch.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for picoswitch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for picoswitch operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file copy, directory creation, process spawn).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The bootloader mass-storage volume is not present.
    #[error("Pico mass storage device (RPI-RP2) not found")]
    DeviceNotFound,

    /// An explicit mount of the bootloader volume failed.
    #[error("Failed to mount {device}: {message}")]
    MountFailure {
        /// Device path that was being mounted.
        device: String,
        /// OS error text.
        message: String,
    },

    /// A bounded wait ran out of time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The current device mode could not be resolved.
    #[error("{0}")]
    ModeResolution(String),

    /// The external device tool exited with a failure.
    #[error("{program} failed: {command}{}", fmt_detail(.message))]
    ToolFailure {
        /// Program name of the tool.
        program: String,
        /// Full command line that was invoked.
        command: String,
        /// Trailing captured error text (may be empty).
        message: String,
    },

    /// A reboot trigger failed and the bootloader volume never appeared.
    #[error("MicroPython trigger failed: {trigger}")]
    TriggerFailure {
        /// Error text captured from the trigger attempt.
        trigger: String,
        /// The wait failure that followed the trigger.
        #[source]
        cause: Box<Error>,
    },

    /// A required local file is absent.
    #[error("{kind} not found: {}", .path.display())]
    MissingFile {
        /// What the file was for (e.g. "UF2 file", "helper file").
        kind: &'static str,
        /// Path that was checked.
        path: PathBuf,
    },
}

fn fmt_detail(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

impl Error {
    /// Whether this error means the bootloader volume was simply absent.
    pub fn is_device_not_found(&self) -> bool {
        matches!(self, Self::DeviceNotFound)
    }
}
