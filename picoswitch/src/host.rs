//! Host-side collaborators bundled for detection and switching.

use crate::bridge::{Mpremote, ToolBridge};
use crate::device::{BlockDeviceLocator, LsblkLocator, SystemMounter, VolumeMounter};
use crate::link::{NativeSerialLink, SerialLink};

/// Everything the detector and the orchestrator talk to outside the process.
///
/// [`Host::native`] wires up the real OS tools; tests substitute fakes for any
/// of the four seams.
pub struct Host {
    /// Finds the `RPI-RP2` block device.
    pub locator: Box<dyn BlockDeviceLocator>,
    /// Mounts it when the OS did not.
    pub mounter: Box<dyn VolumeMounter>,
    /// Serial banner reads, reboot triggers and port presence.
    pub serial: Box<dyn SerialLink>,
    /// `mpremote` invocations.
    pub bridge: Box<dyn ToolBridge>,
}

impl Host {
    /// Host backed by `lsblk`, `mount`, the serial port and `mpremote`.
    pub fn native() -> Self {
        Self::new(
            LsblkLocator::new(),
            SystemMounter,
            NativeSerialLink::default(),
            Mpremote::new(),
        )
    }

    /// Assemble a host from individual collaborators.
    pub fn new(
        locator: impl BlockDeviceLocator + 'static,
        mounter: impl VolumeMounter + 'static,
        serial: impl SerialLink + 'static,
        bridge: impl ToolBridge + 'static,
    ) -> Self {
        Self {
            locator: Box::new(locator),
            mounter: Box::new(mounter),
            serial: Box::new(serial),
            bridge: Box::new(bridge),
        }
    }

    /// Replace the bridge tool (e.g. a non-default `mpremote` path).
    #[must_use]
    pub fn with_bridge(mut self, bridge: impl ToolBridge + 'static) -> Self {
        self.bridge = Box::new(bridge);
        self
    }

    /// Replace the serial link (e.g. a different baud rate).
    #[must_use]
    pub fn with_serial(mut self, serial: impl SerialLink + 'static) -> Self {
        self.serial = Box::new(serial);
        self
    }
}
