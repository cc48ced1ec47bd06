//! Copying UF2 images onto the bootloader volume.
//!
//! The bootloader flashes whatever UF2 lands on its volume and then
//! re-enumerates, so the copy is only complete once buffered writes have
//! reached the device. [`copy_image`] therefore always ends with an OS-level
//! filesystem sync.

use crate::error::{Error, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Copy `image` into `mountpoint` under its own file name and sync.
///
/// The image is treated as an opaque blob. Returns the destination path.
pub fn copy_image(image: &Path, mountpoint: &Path) -> Result<PathBuf> {
    if !image.is_file() {
        return Err(Error::MissingFile {
            kind: "UF2 file",
            path: image.to_path_buf(),
        });
    }

    let file_name = image.file_name().ok_or_else(|| Error::MissingFile {
        kind: "UF2 file",
        path: image.to_path_buf(),
    })?;
    let destination = mountpoint.join(file_name);

    info!("Copying {} -> {}", image.display(), mountpoint.display());
    let written = fs::copy(image, &destination)?;
    debug!("Wrote {written} bytes to {}", destination.display());

    sync_filesystems();
    Ok(destination)
}

/// Flush all filesystem buffers to their devices.
#[cfg(unix)]
pub fn sync_filesystems() {
    debug!("Syncing filesystems");
    nix::unistd::sync();
}

/// Flush all filesystem buffers to their devices.
#[cfg(not(unix))]
pub fn sync_filesystems() {
    log::warn!("Filesystem sync is not supported on this platform");
}
