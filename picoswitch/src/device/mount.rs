//! Mounting the bootloader volume.
//!
//! Desktop systems usually auto-mount `RPI-RP2`; headless hosts often do not.
//! [`ensure_mounted`] returns the OS mountpoint when there is one and
//! otherwise mounts the device at a caller-supplied fallback directory.

use super::{BOOTLOADER_LABEL, BlockDeviceLocator};
use crate::error::{Error, Result};
use log::{debug, info, trace};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

/// Delay between mount attempts while waiting for the volume.
pub const MOUNT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Something that can mount a block device at a directory.
pub trait VolumeMounter {
    /// Mount `device` (a `/dev/...` path) at `mountpoint`.
    fn mount(&self, device: &str, mountpoint: &Path) -> Result<()>;
}

/// Mounter that shells out to `mount(8)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMounter;

impl VolumeMounter for SystemMounter {
    fn mount(&self, device: &str, mountpoint: &Path) -> Result<()> {
        debug!("Running mount {device} {}", mountpoint.display());
        let output = Command::new("mount")
            .arg(device)
            .arg(mountpoint)
            .output()
            .map_err(|e| Error::MountFailure {
                device: device.to_string(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let message = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            "mount failed".to_string()
        };

        Err(Error::MountFailure {
            device: device.to_string(),
            message,
        })
    }
}

/// Return a usable mountpoint for the bootloader volume.
///
/// An existing OS mountpoint is returned as-is. Otherwise `fallback` is
/// created if needed and the device is mounted there. Fails with
/// [`Error::DeviceNotFound`] when there is no bootloader volume at all.
pub fn ensure_mounted(
    locator: &dyn BlockDeviceLocator,
    mounter: &dyn VolumeMounter,
    fallback: &Path,
) -> Result<PathBuf> {
    let device = locator.locate()?.ok_or(Error::DeviceNotFound)?;

    if let Some(mountpoint) = device.mounted_at() {
        trace!("{BOOTLOADER_LABEL} already mounted at {}", mountpoint.display());
        return Ok(mountpoint);
    }

    let device_path = device.device_path();
    info!("Mounting {device_path} at {}...", fallback.display());
    fs::create_dir_all(fallback)?;
    mounter.mount(&device_path, fallback)?;

    Ok(fallback.to_path_buf())
}

/// Retry [`ensure_mounted`] until it succeeds or `timeout` elapses.
///
/// Individual failures are swallowed; on timeout the last one is reported so
/// a missing device can be told apart from a mount that keeps failing.
pub fn wait_for_mount(
    locator: &dyn BlockDeviceLocator,
    mounter: &dyn VolumeMounter,
    timeout: Duration,
    fallback: &Path,
) -> Result<PathBuf> {
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;

    let last_error = loop {
        attempts += 1;
        let error = match ensure_mounted(locator, mounter, fallback) {
            Ok(mountpoint) => {
                debug!(
                    "{BOOTLOADER_LABEL} available at {} (attempt {attempts})",
                    mountpoint.display()
                );
                return Ok(mountpoint);
            },
            Err(e) => e,
        };
        trace!("Mount attempt {attempts} failed: {error}");

        let now = Instant::now();
        if now >= deadline {
            break error;
        }
        thread::sleep(MOUNT_POLL_INTERVAL.min(deadline - now));
    };

    Err(Error::Timeout(format!(
        "waiting for {BOOTLOADER_LABEL} after {:.1}s: {last_error}",
        timeout.as_secs_f64()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BlockDevice;
    use std::cell::{Cell, RefCell};

    /// Locator returning a fixed answer and counting calls.
    struct FixedLocator {
        device: Option<BlockDevice>,
        calls: Cell<u32>,
    }

    impl FixedLocator {
        fn new(device: Option<BlockDevice>) -> Self {
            Self {
                device,
                calls: Cell::new(0),
            }
        }
    }

    impl BlockDeviceLocator for FixedLocator {
        fn locate(&self) -> Result<Option<BlockDevice>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.device.clone())
        }
    }

    /// Locator that appears after a number of empty polls.
    struct LateLocator {
        remaining: Cell<u32>,
    }

    impl BlockDeviceLocator for LateLocator {
        fn locate(&self) -> Result<Option<BlockDevice>> {
            if self.remaining.get() == 0 {
                return Ok(Some(BlockDevice {
                    name: "sda1".to_string(),
                    mountpoint: "/media/RPI-RP2".to_string(),
                }));
            }
            self.remaining.set(self.remaining.get() - 1);
            Ok(None)
        }
    }

    #[derive(Default)]
    struct RecordingMounter {
        fail_with: Option<String>,
        mounts: RefCell<Vec<(String, PathBuf)>>,
    }

    impl VolumeMounter for RecordingMounter {
        fn mount(&self, device: &str, mountpoint: &Path) -> Result<()> {
            self.mounts
                .borrow_mut()
                .push((device.to_string(), mountpoint.to_path_buf()));
            match &self.fail_with {
                Some(message) => Err(Error::MountFailure {
                    device: device.to_string(),
                    message: message.clone(),
                }),
                None => Ok(()),
            }
        }
    }

    fn unmounted() -> Option<BlockDevice> {
        Some(BlockDevice {
            name: "sdb1".to_string(),
            mountpoint: String::new(),
        })
    }

    #[test]
    fn test_ensure_mounted_returns_existing_mountpoint() {
        let locator = FixedLocator::new(Some(BlockDevice {
            name: "sdb1".to_string(),
            mountpoint: "/media/pi/RPI-RP2".to_string(),
        }));
        let mounter = RecordingMounter::default();
        let dir = tempfile::tempdir().unwrap();

        let path = ensure_mounted(&locator, &mounter, &dir.path().join("pico")).unwrap();

        assert_eq!(path, PathBuf::from("/media/pi/RPI-RP2"));
        assert!(mounter.mounts.borrow().is_empty());
        assert!(!dir.path().join("pico").exists());
    }

    #[test]
    fn test_ensure_mounted_mounts_at_fallback() {
        let locator = FixedLocator::new(unmounted());
        let mounter = RecordingMounter::default();
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("mnt").join("pico");

        let path = ensure_mounted(&locator, &mounter, &fallback).unwrap();

        assert_eq!(path, fallback);
        assert!(fallback.is_dir());
        assert_eq!(
            mounter.mounts.borrow().as_slice(),
            &[("/dev/sdb1".to_string(), fallback.clone())]
        );
    }

    #[test]
    fn test_ensure_mounted_no_device_is_device_not_found() {
        let locator = FixedLocator::new(None);
        let mounter = RecordingMounter {
            fail_with: Some("should not be called".to_string()),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("missing");

        let err = ensure_mounted(&locator, &mounter, &fallback).unwrap_err();

        assert!(err.is_device_not_found(), "got {err:?}");
        assert!(mounter.mounts.borrow().is_empty());
        assert!(!fallback.exists());
    }

    #[test]
    fn test_ensure_mounted_surfaces_mount_failure() {
        let locator = FixedLocator::new(unmounted());
        let mounter = RecordingMounter {
            fail_with: Some("only root can do that".to_string()),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();

        let err = ensure_mounted(&locator, &mounter, &dir.path().join("pico")).unwrap_err();

        match err {
            Error::MountFailure { device, message } => {
                assert_eq!(device, "/dev/sdb1");
                assert_eq!(message, "only root can do that");
            },
            other => panic!("expected MountFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_wait_for_mount_polls_until_device_appears() {
        let locator = LateLocator {
            remaining: Cell::new(2),
        };
        let mounter = RecordingMounter::default();
        let dir = tempfile::tempdir().unwrap();

        let path =
            wait_for_mount(&locator, &mounter, Duration::from_secs(5), dir.path()).unwrap();

        assert_eq!(path, PathBuf::from("/media/RPI-RP2"));
        assert_eq!(locator.remaining.get(), 0);
    }

    #[test]
    fn test_wait_for_mount_timeout_bounds() {
        let locator = FixedLocator::new(None);
        let mounter = RecordingMounter::default();
        let dir = tempfile::tempdir().unwrap();
        let timeout = Duration::from_millis(500);

        let start = Instant::now();
        let err = wait_for_mount(&locator, &mounter, timeout, dir.path()).unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
        assert!(elapsed >= timeout, "returned early after {elapsed:?}");
        assert!(
            elapsed <= timeout + MOUNT_POLL_INTERVAL + Duration::from_millis(100),
            "returned late after {elapsed:?}"
        );
        assert!(locator.calls.get() >= 2);
    }

    #[test]
    fn test_wait_for_mount_reports_last_error() {
        let locator = FixedLocator::new(unmounted());
        let mounter = RecordingMounter {
            fail_with: Some("wrong fs type".to_string()),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();

        let err = wait_for_mount(
            &locator,
            &mounter,
            Duration::from_millis(250),
            &dir.path().join("pico"),
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("wrong fs type"), "{message}");
        assert!(!message.contains("not found"), "{message}");
    }
}
