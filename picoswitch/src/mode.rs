//! Device modes and firmware identities.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Banner substring printed by the MicroPython image on boot.
pub const MICROPYTHON_MARKER: &str = "FW:PY";

/// Banner substring printed by the native C++ image on boot.
pub const NATIVE_MARKER: &str = "FW:CPP";

/// Operating mode of the board.
///
/// Exactly one of these holds for a physical board at any instant. The value
/// is computed on demand and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// ROM bootloader, exposed as the `RPI-RP2` mass-storage volume.
    Bootloader,
    /// MicroPython runtime.
    ManagedRuntime,
    /// Native C++ firmware.
    NativeRuntime,
    /// Mode could not be determined.
    Unknown,
}

impl Mode {
    /// Short name used on the command line and in `detect` output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bootloader => "bootsel",
            Self::ManagedRuntime => "py",
            Self::NativeRuntime => "cpp",
            Self::Unknown => "unknown",
        }
    }

    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Bootloader => "BOOTSEL (RPI-RP2 mass storage)",
            Self::ManagedRuntime => "MicroPython",
            Self::NativeRuntime => "C++ firmware",
            Self::Unknown => "unknown",
        }
    }

    /// Get the mode from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "bootsel" | "bootloader" => Some(Self::Bootloader),
            "py" | "micropython" => Some(Self::ManagedRuntime),
            "cpp" | "native" => Some(Self::NativeRuntime),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Map a banner line to the runtime that printed it.
    ///
    /// Substring match only; the MicroPython marker is checked first.
    pub fn from_banner(line: &str) -> Option<Self> {
        if line.contains(MICROPYTHON_MARKER) {
            Some(Self::ManagedRuntime)
        } else if line.contains(NATIVE_MARKER) {
            Some(Self::NativeRuntime)
        } else {
            None
        }
    }

    /// Check if the mode is known.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
            .ok_or_else(|| Error::ModeResolution(format!("Unrecognized mode: {s}")))
    }
}

/// Where the current mode comes from in a switch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeSelector {
    /// Run the mode detector.
    #[default]
    Auto,
    /// Trust the caller.
    Explicit(Mode),
}

impl FromStr for ModeSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            s.parse().map(Self::Explicit)
        }
    }
}

impl fmt::Display for ModeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Explicit(mode) => mode.fmt(f),
        }
    }
}

/// Firmware image a switch can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Firmware {
    /// MicroPython UF2.
    MicroPython,
    /// Native C++ UF2.
    Native,
}

impl Firmware {
    /// Mode the board is in once this firmware is running.
    pub fn mode(&self) -> Mode {
        match self {
            Self::MicroPython => Mode::ManagedRuntime,
            Self::Native => Mode::NativeRuntime,
        }
    }

    /// Whether helper files can be provisioned after this firmware boots.
    pub fn supports_helpers(&self) -> bool {
        matches!(self, Self::MicroPython)
    }
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode().description())
    }
}
