//! Configuration file support for picoswitch.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (PICOSWITCH_*)
//! 3. Local config file (./picoswitch.toml)
//! 4. Global config file (~/.config/picoswitch/config.toml)
//! 5. Built-in defaults

use directories::ProjectDirs;
use log::{debug, warn};
use picoswitch::Firmware;
use picoswitch::port::DEFAULT_BAUD;
use picoswitch::switch::{
    DEFAULT_BOOTSEL_TIMEOUT, DEFAULT_DETECT_TIMEOUT, DEFAULT_MOUNT_BASE, DEFAULT_PORT,
    DEFAULT_SERIAL_WAIT,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-project config file.
pub const LOCAL_CONFIG: &str = "picoswitch.toml";

/// Default MicroPython image.
pub const DEFAULT_MICROPYTHON_IMAGE: &str = "uf2s/Pico-MicroPython-20250415-v1.25.0.uf2";

/// Default native image.
pub const DEFAULT_CPP_IMAGE: &str = "uf2s/bootloader_trigger.uf2";

/// Default helper files copied onto MicroPython.
pub const DEFAULT_HELPERS: &[&str] = &["py/boot.py", "py/bootloader_trigger.py"];

/// Board connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Serial port (e.g. "/dev/ttyACM0").
    pub port: Option<String>,
    /// Where to mount RPI-RP2 when the OS does not.
    pub mount_base: Option<PathBuf>,
    /// Serial baud rate.
    pub baud: Option<u32>,
}

/// Firmware image and helper locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirmwareConfig {
    /// MicroPython UF2.
    pub micropython: Option<PathBuf>,
    /// Native C++ UF2.
    pub cpp: Option<PathBuf>,
    /// Helper files copied after switching to MicroPython.
    pub helpers: Option<Vec<PathBuf>>,
}

/// Timeouts in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Banner scan window.
    pub detect: Option<f64>,
    /// Wait for RPI-RP2 after a reboot trigger.
    pub bootsel: Option<f64>,
    /// Wait for the serial port after flashing.
    pub serial_wait: Option<f64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device settings.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Firmware settings.
    #[serde(default)]
    pub firmware: FirmwareConfig,
    /// Timeout settings.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "picoswitch").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one. Set values in `other` win.
    fn merge(&mut self, other: Self) {
        if other.device.port.is_some() {
            self.device.port = other.device.port;
        }
        if other.device.mount_base.is_some() {
            self.device.mount_base = other.device.mount_base;
        }
        if other.device.baud.is_some() {
            self.device.baud = other.device.baud;
        }

        if other.firmware.micropython.is_some() {
            self.firmware.micropython = other.firmware.micropython;
        }
        if other.firmware.cpp.is_some() {
            self.firmware.cpp = other.firmware.cpp;
        }
        if other.firmware.helpers.is_some() {
            self.firmware.helpers = other.firmware.helpers;
        }

        if other.timeouts.detect.is_some() {
            self.timeouts.detect = other.timeouts.detect;
        }
        if other.timeouts.bootsel.is_some() {
            self.timeouts.bootsel = other.timeouts.bootsel;
        }
        if other.timeouts.serial_wait.is_some() {
            self.timeouts.serial_wait = other.timeouts.serial_wait;
        }
    }

    /// Serial port, falling back to the default.
    pub fn port(&self) -> String {
        self.device
            .port
            .clone()
            .unwrap_or_else(|| DEFAULT_PORT.to_string())
    }

    /// Fallback mount directory.
    pub fn mount_base(&self) -> PathBuf {
        self.device
            .mount_base
            .as_deref()
            .map_or_else(|| PathBuf::from(DEFAULT_MOUNT_BASE), expand_home)
    }

    /// Serial baud rate.
    pub fn baud(&self) -> u32 {
        self.device.baud.unwrap_or(DEFAULT_BAUD)
    }

    /// Image for `target`.
    pub fn image_for(&self, target: Firmware) -> PathBuf {
        let (configured, default) = match target {
            Firmware::MicroPython => (&self.firmware.micropython, DEFAULT_MICROPYTHON_IMAGE),
            Firmware::Native => (&self.firmware.cpp, DEFAULT_CPP_IMAGE),
        };
        expand_home(configured.as_deref().unwrap_or(Path::new(default)))
    }

    /// Helper files, in copy order.
    pub fn helpers(&self) -> Vec<PathBuf> {
        match &self.firmware.helpers {
            Some(helpers) => helpers.iter().map(|p| expand_home(p)).collect(),
            None => DEFAULT_HELPERS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Banner scan window.
    pub fn detect_timeout(&self) -> Duration {
        seconds_or("timeouts.detect", self.timeouts.detect, DEFAULT_DETECT_TIMEOUT)
    }

    /// Wait for RPI-RP2.
    pub fn bootsel_timeout(&self) -> Duration {
        seconds_or("timeouts.bootsel", self.timeouts.bootsel, DEFAULT_BOOTSEL_TIMEOUT)
    }

    /// Wait for the serial port after flashing.
    pub fn serial_wait(&self) -> Duration {
        seconds_or(
            "timeouts.serial_wait",
            self.timeouts.serial_wait,
            DEFAULT_SERIAL_WAIT,
        )
    }
}

fn seconds_or(key: &str, value: Option<f64>, default: Duration) -> Duration {
    match value.map(Duration::try_from_secs_f64) {
        None => default,
        Some(Ok(duration)) => duration,
        Some(Err(_)) => {
            warn!("Ignoring invalid {key} in config, using {}s", default.as_secs_f64());
            default
        },
    }
}

/// Expand a leading `~` against `$HOME`. Other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port(), "/dev/ttyACM0");
        assert_eq!(config.mount_base(), PathBuf::from("/mnt/pico"));
        assert_eq!(config.baud(), 115200);
        assert_eq!(config.detect_timeout(), Duration::from_millis(1500));
        assert_eq!(config.bootsel_timeout(), Duration::from_secs(10));
        assert_eq!(config.serial_wait(), Duration::from_secs(12));
        assert_eq!(
            config.image_for(Firmware::Native),
            PathBuf::from("uf2s/bootloader_trigger.uf2")
        );
        assert_eq!(
            config.helpers(),
            vec![
                PathBuf::from("py/boot.py"),
                PathBuf::from("py/bootloader_trigger.py")
            ]
        );
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[device]
port = "/dev/ttyACM1"
mount_base = "/media/pico"
baud = 9600

[firmware]
micropython = "images/mpy.uf2"
helpers = ["main.py"]

[timeouts]
detect = 0.5
serial_wait = 3
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port(), "/dev/ttyACM1");
        assert_eq!(config.mount_base(), PathBuf::from("/media/pico"));
        assert_eq!(config.baud(), 9600);
        assert_eq!(
            config.image_for(Firmware::MicroPython),
            PathBuf::from("images/mpy.uf2")
        );
        assert_eq!(
            config.image_for(Firmware::Native),
            PathBuf::from(DEFAULT_CPP_IMAGE)
        );
        assert_eq!(config.helpers(), vec![PathBuf::from("main.py")]);
        assert_eq!(config.detect_timeout(), Duration::from_millis(500));
        assert_eq!(config.bootsel_timeout(), Duration::from_secs(10));
        assert_eq!(config.serial_wait(), Duration::from_secs(3));
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.device.port.is_none());
        assert!(config.firmware.helpers.is_none());
        assert!(config.timeouts.detect.is_none());
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        let mut config = Config::default();
        config.timeouts.bootsel = Some(-1.0);
        assert_eq!(config.bootsel_timeout(), DEFAULT_BOOTSEL_TIMEOUT);
    }

    #[test]
    fn test_merge_overrides_only_set_values() {
        let mut base = Config::default();
        base.device.port = Some("/dev/ttyACM0".to_string());
        base.timeouts.detect = Some(1.0);

        let mut other = Config::default();
        other.device.port = Some("/dev/ttyACM3".to_string());
        other.firmware.helpers = Some(vec![]);

        base.merge(other);

        assert_eq!(base.device.port.as_deref(), Some("/dev/ttyACM3"));
        assert_eq!(base.timeouts.detect, Some(1.0));
        assert_eq!(base.helpers(), Vec::<PathBuf>::new());
    }

    #[test]
    fn test_config_roundtrip_toml() {
        let mut config = Config::default();
        config.device.port = Some("/dev/ttyACM2".to_string());
        config.firmware.cpp = Some(PathBuf::from("build/app.uf2"));
        config.timeouts.bootsel = Some(20.0);

        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(deserialized.device.port.as_deref(), Some("/dev/ttyACM2"));
        assert_eq!(
            deserialized.firmware.cpp,
            Some(PathBuf::from("build/app.uf2"))
        );
        assert_eq!(deserialized.timeouts.bootsel, Some(20.0));
    }

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("picoswitch.toml");
        fs::write(
            &path,
            r#"
[device]
port = "/dev/ttyACM7"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.port(), "/dev/ttyACM7");
    }

    #[test]
    fn test_load_from_path_invalid_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[device\nport = ").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.device.port.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.device.port.is_none());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(
            expand_home(Path::new("uf2s/a.uf2")),
            PathBuf::from("uf2s/a.uf2")
        );
        assert_eq!(expand_home(Path::new("/abs/a.uf2")), PathBuf::from("/abs/a.uf2"));
        if let Some(home) = env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/fw/a.uf2")),
                PathBuf::from(home).join("fw/a.uf2")
            );
        }
    }

    #[test]
    fn test_global_config_path_mentions_app() {
        if let Some(p) = Config::global_config_path() {
            let text = p.to_string_lossy();
            assert!(text.contains("picoswitch"));
            assert!(text.ends_with("config.toml"));
        }
    }
}
