//! Firmware switch orchestration.
//!
//! A switch runs through fixed stages:
//!
//! ```text
//! ResolveMode -> Trigger -> AwaitBootloader -> Flash -> [ProvisionHelpers] -> Done
//! ```
//!
//! Any stage may fail, which ends the switch. When the board already runs
//! the requested firmware and no reflash is forced, the middle three stages
//! are skipped.

use crate::bridge::exec_args;
use crate::detect::detect_mode;
use crate::device::wait_for_mount;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::image::copy_image;
use crate::mode::{Firmware, Mode, ModeSelector};
use crate::provision::{install_helpers, wait_for_serial_port};
use log::{debug, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default serial port of the board.
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Default directory for mounting the bootloader volume ourselves.
pub const DEFAULT_MOUNT_BASE: &str = "/mnt/pico";

/// Default banner scan window.
pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Default wait for the bootloader volume after a trigger.
pub const DEFAULT_BOOTSEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for the serial port after a flash.
pub const DEFAULT_SERIAL_WAIT: Duration = Duration::from_secs(12);

/// Statement that makes MicroPython reboot into BOOTSEL via the on-device helper.
pub const MICROPYTHON_TRIGGER: &str = "import bootloader_trigger";

const UNRESOLVED_MODE: &str =
    "Could not detect current mode. Use --mode py|cpp|bootsel to override.";

/// One stage of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Working out the current mode.
    ResolveMode,
    /// Asking the current firmware to reboot into BOOTSEL.
    Trigger,
    /// Waiting for the bootloader volume.
    AwaitBootloader,
    /// Copying the image.
    Flash,
    /// Copying helper files onto MicroPython.
    ProvisionHelpers,
    /// Finished.
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ResolveMode => "Detecting current mode",
            Self::Trigger => "Rebooting into BOOTSEL",
            Self::AwaitBootloader => "Waiting for RPI-RP2",
            Self::Flash => "Copying firmware",
            Self::ProvisionHelpers => "Installing helpers",
            Self::Done => "Done",
        };
        f.write_str(text)
    }
}

/// Everything one switch needs.
#[derive(Debug, Clone)]
pub struct SwitchRequest {
    /// Firmware to end up on.
    pub target: Firmware,
    /// Current mode, or auto-detect.
    pub mode: ModeSelector,
    /// Serial port of the board.
    pub port: String,
    /// Image to flash.
    pub image: PathBuf,
    /// Where to mount the bootloader volume if the OS does not.
    pub mount_base: PathBuf,
    /// Banner scan window during auto-detection.
    pub detect_timeout: Duration,
    /// Wait for the bootloader volume.
    pub bootsel_timeout: Duration,
    /// Wait for the serial port before provisioning helpers.
    pub serial_wait: Duration,
    /// Provision helpers after a MicroPython switch.
    pub install_helpers: bool,
    /// Helper files, copied in this order.
    pub helpers: Vec<PathBuf>,
    /// Flash even if the target firmware is already running.
    pub force_flash: bool,
    /// Let `mpremote` print straight to the terminal.
    pub verbose: bool,
}

impl SwitchRequest {
    /// Request with default port, mount base and timeouts.
    pub fn new(target: Firmware, image: impl Into<PathBuf>) -> Self {
        Self {
            target,
            mode: ModeSelector::Auto,
            port: DEFAULT_PORT.to_string(),
            image: image.into(),
            mount_base: PathBuf::from(DEFAULT_MOUNT_BASE),
            detect_timeout: DEFAULT_DETECT_TIMEOUT,
            bootsel_timeout: DEFAULT_BOOTSEL_TIMEOUT,
            serial_wait: DEFAULT_SERIAL_WAIT,
            install_helpers: target.supports_helpers(),
            helpers: Vec::new(),
            force_flash: false,
            verbose: false,
        }
    }

    /// Set the current mode instead of detecting it.
    #[must_use]
    pub fn with_mode(mut self, mode: ModeSelector) -> Self {
        self.mode = mode;
        self
    }

    /// Set the serial port.
    #[must_use]
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    /// Set the fallback mount directory.
    #[must_use]
    pub fn with_mount_base(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mount_base = dir.into();
        self
    }

    /// Set the banner scan window.
    #[must_use]
    pub fn with_detect_timeout(mut self, timeout: Duration) -> Self {
        self.detect_timeout = timeout;
        self
    }

    /// Set the bootloader volume wait.
    #[must_use]
    pub fn with_bootsel_timeout(mut self, timeout: Duration) -> Self {
        self.bootsel_timeout = timeout;
        self
    }

    /// Set the post-flash serial port wait.
    #[must_use]
    pub fn with_serial_wait(mut self, timeout: Duration) -> Self {
        self.serial_wait = timeout;
        self
    }

    /// Set the helper files and whether to install them.
    #[must_use]
    pub fn with_helpers(mut self, install: bool, helpers: Vec<PathBuf>) -> Self {
        self.install_helpers = install;
        self.helpers = helpers;
        self
    }

    /// Flash even when already on the target firmware.
    #[must_use]
    pub fn with_force_flash(mut self, force: bool) -> Self {
        self.force_flash = force;
        self
    }

    /// Stream `mpremote` output.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// What the trigger stage left behind for later stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerOutcome {
    /// Error text from a MicroPython trigger attempt, if it reported one.
    pub prior_error: Option<String>,
}

/// Drives one [`SwitchRequest`] against a [`Host`].
pub struct Switcher<'a> {
    host: &'a Host,
    request: &'a SwitchRequest,
}

impl<'a> Switcher<'a> {
    /// Prepare a switch.
    pub fn new(host: &'a Host, request: &'a SwitchRequest) -> Self {
        Self { host, request }
    }

    /// Run the switch, reporting each stage to `on_stage` as it starts.
    ///
    /// Returns `true` if an image was flashed, `false` if the board was
    /// already on the target firmware.
    pub fn run(&self, on_stage: &mut dyn FnMut(Stage)) -> Result<bool> {
        let request = self.request;

        on_stage(Stage::ResolveMode);
        let current = self.resolve_mode()?;

        let flashed = if current == request.target.mode() && !request.force_flash {
            info!("Already running {}", request.target);
            false
        } else {
            on_stage(Stage::Trigger);
            let outcome = self.trigger(current)?;

            on_stage(Stage::AwaitBootloader);
            let mountpoint = self.await_bootloader(outcome)?;

            on_stage(Stage::Flash);
            let dest = copy_image(&request.image, &mountpoint)?;
            info!("Flashed {}", dest.display());
            true
        };

        if request.target.supports_helpers() && request.install_helpers {
            on_stage(Stage::ProvisionHelpers);
            self.provision_helpers()?;
        }

        on_stage(Stage::Done);
        Ok(flashed)
    }

    /// The current mode, detected or as given.
    pub fn resolve_mode(&self) -> Result<Mode> {
        match self.request.mode {
            ModeSelector::Explicit(mode) => Ok(mode),
            ModeSelector::Auto => {
                let request = self.request;
                let mode = detect_mode(self.host, &request.port, request.detect_timeout)?;
                debug!("Resolved current mode: {mode}");
                Ok(mode)
            },
        }
    }

    /// Ask the firmware running in `current` mode to reboot into BOOTSEL.
    pub fn trigger(&self, current: Mode) -> Result<TriggerOutcome> {
        let port = &self.request.port;
        match current {
            Mode::ManagedRuntime => {
                info!("Asking MicroPython to reboot into BOOTSEL");
                let attempt = self.host.bridge.run(
                    &exec_args(port, MICROPYTHON_TRIGGER),
                    !self.request.verbose,
                    true,
                );
                let prior_error = match attempt {
                    Ok(output) if output.success() => None,
                    Ok(output) => {
                        let text = output.error_text();
                        let program = self.host.bridge.program();
                        Some(if text.is_empty() {
                            format!("{program} failed to run bootloader_trigger")
                        } else {
                            text
                        })
                    },
                    Err(e) => Some(e.to_string()),
                };
                if let Some(text) = &prior_error {
                    debug!("Trigger reported: {text}");
                }
                Ok(TriggerOutcome { prior_error })
            },
            Mode::NativeRuntime => {
                info!("Asking C++ firmware to reboot into BOOTSEL");
                self.host.serial.send_reboot_trigger(port)?;
                Ok(TriggerOutcome::default())
            },
            Mode::Bootloader => Ok(TriggerOutcome::default()),
            Mode::Unknown => Err(Error::ModeResolution(UNRESOLVED_MODE.to_string())),
        }
    }

    /// Wait for the bootloader volume and return where it is mounted.
    pub fn await_bootloader(&self, outcome: TriggerOutcome) -> Result<PathBuf> {
        let waited = wait_for_mount(
            self.host.locator.as_ref(),
            self.host.mounter.as_ref(),
            self.request.bootsel_timeout,
            &self.request.mount_base,
        );
        match (waited, outcome.prior_error) {
            (Ok(mountpoint), _) => Ok(mountpoint),
            (Err(cause), Some(trigger)) => {
                warn!("Bootloader never appeared: {cause}");
                Err(Error::TriggerFailure {
                    trigger,
                    cause: Box::new(cause),
                })
            },
            (Err(cause), None) => Err(cause),
        }
    }

    /// Wait for MicroPython to come back and copy the helper files.
    pub fn provision_helpers(&self) -> Result<()> {
        let request = self.request;
        wait_for_serial_port(self.host.serial.as_ref(), &request.port, request.serial_wait)?;
        install_helpers(
            self.host.bridge.as_ref(),
            &request.port,
            &request.helpers,
            !request.verbose,
        )
    }
}

/// Flash `image` onto a board that is already in BOOTSEL (or will be shortly).
pub fn flash_image(
    host: &Host,
    image: &Path,
    mount_base: &Path,
    timeout: Duration,
) -> Result<PathBuf> {
    if !image.is_file() {
        return Err(Error::MissingFile {
            kind: "UF2 file",
            path: image.to_path_buf(),
        });
    }
    let mountpoint = wait_for_mount(
        host.locator.as_ref(),
        host.mounter.as_ref(),
        timeout,
        mount_base,
    )?;
    copy_image(image, &mountpoint)
}
