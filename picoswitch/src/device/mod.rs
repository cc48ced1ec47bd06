//! Block-device discovery for the Pico bootloader volume.
//!
//! When the RP2040 sits in its ROM bootloader it enumerates as a USB
//! mass-storage device whose FAT volume is labelled `RPI-RP2`. This module
//! asks the OS (`lsblk`) for the block devices it knows about and picks out
//! that volume.

pub mod mount;

use crate::error::{Error, Result};
use log::{debug, trace, warn};
use std::path::PathBuf;
use std::process::Command;

pub use mount::{SystemMounter, VolumeMounter, ensure_mounted, wait_for_mount};

/// Volume label of the bootloader mass-storage device.
pub const BOOTLOADER_LABEL: &str = "RPI-RP2";

/// Arguments passed to `lsblk`.
const LSBLK_ARGS: &[&str] = &["-P", "-n", "-o", "NAME,LABEL,MOUNTPOINT"];

/// One OS block device whose label matched the bootloader volume.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockDevice {
    /// Kernel device name (e.g. "sda1").
    pub name: String,
    /// Current mountpoint, empty when not mounted.
    pub mountpoint: String,
}

impl BlockDevice {
    /// Device node path (e.g. "/dev/sda1").
    pub fn device_path(&self) -> String {
        format!("/dev/{}", self.name)
    }

    /// Mountpoint, if the OS has mounted the volume.
    pub fn mounted_at(&self) -> Option<PathBuf> {
        if self.mountpoint.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.mountpoint))
        }
    }
}

/// Source of bootloader block-device records.
pub trait BlockDeviceLocator {
    /// Find the bootloader volume.
    ///
    /// Returns `Ok(None)` when no device carries the label; fails only when
    /// enumeration itself could not run.
    fn locate(&self) -> Result<Option<BlockDevice>>;
}

/// Locator backed by `lsblk`.
#[derive(Debug, Clone)]
pub struct LsblkLocator {
    program: String,
    label: String,
}

impl Default for LsblkLocator {
    fn default() -> Self {
        Self {
            program: "lsblk".to_string(),
            label: BOOTLOADER_LABEL.to_string(),
        }
    }
}

impl LsblkLocator {
    /// Create a locator for the standard `RPI-RP2` label.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a different volume label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl BlockDeviceLocator for LsblkLocator {
    fn locate(&self) -> Result<Option<BlockDevice>> {
        let command_line = format!("{} {}", self.program, LSBLK_ARGS.join(" "));
        trace!("Running {command_line}");

        let output = Command::new(&self.program)
            .args(LSBLK_ARGS)
            .output()
            .map_err(|e| Error::ToolFailure {
                program: self.program.clone(),
                command: command_line.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::ToolFailure {
                program: self.program.clone(),
                command: command_line,
                message: if stderr.is_empty() {
                    format!("{} failed", self.program)
                } else {
                    stderr
                },
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(find_labelled(&stdout, &self.label))
    }
}

/// Pick the first device with `label` out of `lsblk -P` output.
///
/// More than one match should not happen with a single board attached; it is
/// logged and the first entry wins.
pub fn find_labelled(lsblk_output: &str, label: &str) -> Option<BlockDevice> {
    let matches: Vec<BlockDevice> = lsblk_output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_pairs)
        .filter(|pairs| lookup(pairs, "LABEL") == Some(label))
        .filter_map(|pairs| {
            Some(BlockDevice {
                name: lookup(&pairs, "NAME")?.to_string(),
                mountpoint: lookup(&pairs, "MOUNTPOINT")
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect();

    if matches.len() > 1 {
        let names: Vec<String> = matches.iter().map(BlockDevice::device_path).collect();
        warn!(
            "Multiple {label} volumes found ({}); using {}",
            names.join(", "),
            names[0]
        );
    }

    let found = matches.into_iter().next();
    if let Some(device) = &found {
        debug!(
            "Found {label} at {} (mountpoint: {:?})",
            device.device_path(),
            device.mountpoint
        );
    }
    found
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Parse one `lsblk -P` line of `KEY="VALUE"` tokens.
///
/// `lsblk` escapes unsafe bytes inside values as `\xHH`; those are decoded.
pub fn parse_pairs(line: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = line.trim_start();

    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_string();
        let after = &rest[eq + 1..];

        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            match find_closing_quote(quoted) {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            (&after[..end], &after[end..])
        };

        pairs.push((key, unescape(value)));
        rest = remaining.trim_start();
    }

    pairs
}

fn find_closing_quote(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn unescape(value: &str) -> String {
    let mut out = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if bytes.get(i + 1) == Some(&b'x') {
                let hex = value.get(i + 2..i + 4).and_then(|h| u8::from_str_radix(h, 16).ok());
                if let Some(byte) = hex {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            } else if let Some(&next) = bytes.get(i + 1) {
                out.push(next);
                i += 2;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"NAME="nvme0n1" LABEL="" MOUNTPOINT=""
NAME="nvme0n1p1" LABEL="EFI" MOUNTPOINT="/boot/efi"
NAME="sda" LABEL="" MOUNTPOINT=""
NAME="sda1" LABEL="RPI-RP2" MOUNTPOINT="/media/pi/RPI-RP2"
"#;

    #[test]
    fn test_parse_pairs_basic() {
        let pairs = parse_pairs(r#"NAME="sda1" LABEL="RPI-RP2" MOUNTPOINT="""#);
        assert_eq!(
            pairs,
            vec![
                ("NAME".to_string(), "sda1".to_string()),
                ("LABEL".to_string(), "RPI-RP2".to_string()),
                ("MOUNTPOINT".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_parse_pairs_hex_escapes_and_spaces() {
        let pairs = parse_pairs(r#"NAME="sdb1" LABEL="My\x20Disk" MOUNTPOINT="/media/a b""#);
        assert_eq!(lookup(&pairs, "LABEL"), Some("My Disk"));
        assert_eq!(lookup(&pairs, "MOUNTPOINT"), Some("/media/a b"));
    }

    #[test]
    fn test_find_labelled_mounted() {
        let device = find_labelled(SAMPLE, BOOTLOADER_LABEL).unwrap();
        assert_eq!(device.name, "sda1");
        assert_eq!(device.device_path(), "/dev/sda1");
        assert_eq!(
            device.mounted_at(),
            Some(PathBuf::from("/media/pi/RPI-RP2"))
        );
    }

    #[test]
    fn test_find_labelled_unmounted() {
        let output = r#"NAME="sdc1" LABEL="RPI-RP2" MOUNTPOINT="""#;
        let device = find_labelled(output, BOOTLOADER_LABEL).unwrap();
        assert_eq!(device.name, "sdc1");
        assert!(device.mounted_at().is_none());
    }

    #[test]
    fn test_find_labelled_requires_exact_label() {
        let output = r#"NAME="sdc1" LABEL="RPI-RP2-OLD" MOUNTPOINT=""
NAME="sdd1" LABEL="rpi-rp2" MOUNTPOINT="""#;
        assert!(find_labelled(output, BOOTLOADER_LABEL).is_none());
    }

    #[test]
    fn test_find_labelled_first_of_many_wins() {
        let output = r#"NAME="sdc1" LABEL="RPI-RP2" MOUNTPOINT=""
NAME="sdd1" LABEL="RPI-RP2" MOUNTPOINT="/mnt/x""#;
        let device = find_labelled(output, BOOTLOADER_LABEL).unwrap();
        assert_eq!(device.name, "sdc1");
    }

    #[test]
    fn test_find_labelled_none() {
        assert!(find_labelled("", BOOTLOADER_LABEL).is_none());
        assert!(find_labelled("\n\n", BOOTLOADER_LABEL).is_none());
    }

    #[test]
    fn test_lsblk_missing_program_is_tool_failure() {
        let locator = LsblkLocator {
            program: "picoswitch-no-such-lsblk".to_string(),
            label: BOOTLOADER_LABEL.to_string(),
        };
        assert!(matches!(locator.locate(), Err(Error::ToolFailure { .. })));
    }
}
