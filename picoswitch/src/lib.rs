//! # picoswitch
//!
//! Detect which firmware a Raspberry Pi Pico is running and switch it between
//! MicroPython and a native C++ image.
//!
//! The board can be in one of three modes at a time:
//!
//! - **BOOTSEL**: the ROM bootloader, visible as the `RPI-RP2` mass-storage
//!   volume
//! - **MicroPython**: prints `FW:PY` on boot and answers `mpremote`
//! - **Native**: prints `FW:CPP` on boot and reboots into BOOTSEL on a
//!   serial key command
//!
//! Switching means rebooting the board into BOOTSEL, copying a UF2 image onto
//! the volume and, for MicroPython, copying helper scripts onto the device
//! once it comes back.
//!
//! ## Platform
//!
//! Linux only in practice: the bootloader volume is found with `lsblk` and
//! mounted with `mount`, and MicroPython is driven through `mpremote`.
//!
//! ## Features
//!
//! - `serde`: Serialization support for modes and detection results
//!
//! ## Example
//!
//! ```rust,no_run
//! use picoswitch::{Firmware, Host, SwitchRequest, Switcher};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = Host::native();
//!     let request = SwitchRequest::new(Firmware::Native, "uf2s/bootloader_trigger.uf2")
//!         .with_port("/dev/ttyACM0");
//!
//!     let flashed = Switcher::new(&host, &request).run(&mut |stage| {
//!         println!("{stage}...");
//!     })?;
//!     println!("flashed: {flashed}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod banner;
pub mod bridge;
pub mod detect;
pub mod device;
pub mod error;
pub mod host;
pub mod image;
pub mod link;
pub mod mode;
pub mod port;
pub mod probe;
pub mod provision;
pub mod switch;
pub mod trigger;

#[cfg(test)]
pub(crate) mod sim;

// Re-exports for convenience
pub use {
    banner::{Banner, read_banner},
    bridge::{Mpremote, ToolBridge, ToolOutput},
    detect::{Detection, Evidence, detect, detect_mode, detect_mode_safe},
    device::{
        BlockDevice, BlockDeviceLocator, LsblkLocator, SystemMounter, VolumeMounter,
        ensure_mounted, wait_for_mount,
    },
    error::{Error, Result},
    host::Host,
    image::copy_image,
    link::{NativeSerialLink, SerialLink},
    mode::{Firmware, Mode, ModeSelector},
    port::{NativePort, Port, SerialConfig},
    probe::probe_micropython,
    provision::{install_helpers, wait_for_serial_port},
    switch::{Stage, SwitchRequest, Switcher, TriggerOutcome, flash_image},
};
