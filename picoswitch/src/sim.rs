//! Simulated board for exercising detection and switching without hardware.
//!
//! One [`SimBoard`] plays every external collaborator at once, so a reboot
//! requested through the bridge or the serial link shows up as a bootloader
//! volume on the next locator poll.

use crate::banner::Banner;
use crate::bridge::{ToolBridge, ToolOutput};
use crate::device::{BlockDevice, BlockDeviceLocator, VolumeMounter};
use crate::error::{Error, Result};
use crate::host::Host;
use crate::link::SerialLink;
use crate::mode::Mode;
use std::cell::{RefCell, RefMut};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

pub(crate) struct SimState {
    pub mode: Mode,
    /// Where the OS auto-mounts the volume; `None` leaves mounting to us.
    pub auto_mount: Option<PathBuf>,
    /// Whether the firmware prints its banner where the reader can see it.
    pub prints_banner: bool,
    /// Whether reboot requests actually reboot the board.
    pub trigger_works: bool,
    /// Empty locator polls before the volume appears after a reboot.
    pub enumeration_delay: u32,
    /// Mode the board boots into once an image lands on the volume.
    pub after_flash: Mode,
    pub port_present: bool,
    pub lsblk_broken: bool,
    pub serial_broken: bool,
    pub bridge_missing: bool,
    pub copy_fails: bool,
    pub locate_calls: u32,
    pub banner_reads: u32,
    pub native_triggers: u32,
    pub bridge_calls: Vec<Vec<String>>,
    pub mounts: Vec<(String, PathBuf)>,
}

impl SimState {
    fn volume_has_image(&self) -> bool {
        self.auto_mount
            .as_ref()
            .and_then(|dir| std::fs::read_dir(dir).ok())
            .is_some_and(|mut entries| {
                entries.any(|e| {
                    e.is_ok_and(|e| e.path().extension().is_some_and(|ext| ext == "uf2"))
                })
            })
    }
}

#[derive(Clone)]
pub(crate) struct SimBoard(Rc<RefCell<SimState>>);

impl SimBoard {
    pub fn new(mode: Mode, auto_mount: &Path) -> Self {
        Self(Rc::new(RefCell::new(SimState {
            mode,
            auto_mount: Some(auto_mount.to_path_buf()),
            prints_banner: true,
            trigger_works: true,
            enumeration_delay: 0,
            after_flash: Mode::ManagedRuntime,
            port_present: true,
            lsblk_broken: false,
            serial_broken: false,
            bridge_missing: false,
            copy_fails: false,
            locate_calls: 0,
            banner_reads: 0,
            native_triggers: 0,
            bridge_calls: Vec::new(),
            mounts: Vec::new(),
        })))
    }

    pub fn state(&self) -> RefMut<'_, SimState> {
        self.0.borrow_mut()
    }

    pub fn host(&self) -> Host {
        Host::new(self.clone(), self.clone(), self.clone(), self.clone())
    }

    /// Bridge calls whose arguments contain `needle`.
    pub fn calls_with(&self, needle: &str) -> usize {
        self.state()
            .bridge_calls
            .iter()
            .filter(|args| args.iter().any(|a| a.contains(needle)))
            .count()
    }
}

fn exited(code: i32, stderr: &str) -> ToolOutput {
    ToolOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

impl BlockDeviceLocator for SimBoard {
    fn locate(&self) -> Result<Option<BlockDevice>> {
        let mut state = self.state();
        state.locate_calls += 1;
        if state.lsblk_broken {
            return Err(Error::ToolFailure {
                program: "lsblk".to_string(),
                command: "lsblk -P -o NAME,LABEL,MOUNTPOINT".to_string(),
                message: "exit status 32".to_string(),
            });
        }
        if state.mode != Mode::Bootloader {
            return Ok(None);
        }
        if state.enumeration_delay > 0 {
            state.enumeration_delay -= 1;
            return Ok(None);
        }
        Ok(Some(BlockDevice {
            name: "sda1".to_string(),
            mountpoint: state
                .auto_mount
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }))
    }
}

impl VolumeMounter for SimBoard {
    fn mount(&self, device: &str, mountpoint: &Path) -> Result<()> {
        self.state()
            .mounts
            .push((device.to_string(), mountpoint.to_path_buf()));
        Ok(())
    }
}

impl SerialLink for SimBoard {
    fn read_banner(&self, _port: &str, _timeout: Duration) -> Result<Banner> {
        let mut state = self.state();
        state.banner_reads += 1;
        if state.serial_broken {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "Permission denied",
            )));
        }
        let line = match state.mode {
            Mode::ManagedRuntime if state.prints_banner => "FW:PY",
            Mode::NativeRuntime if state.prints_banner => "FW:CPP",
            Mode::ManagedRuntime => ">>>",
            _ => "",
        };
        Ok(Banner {
            mode: Mode::from_banner(line),
            last_line: line.to_string(),
        })
    }

    fn send_reboot_trigger(&self, _port: &str) -> Result<()> {
        let mut state = self.state();
        if state.serial_broken {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "No such file or directory",
            )));
        }
        state.native_triggers += 1;
        if state.mode == Mode::NativeRuntime && state.trigger_works {
            state.mode = Mode::Bootloader;
        }
        Ok(())
    }

    fn port_present(&self, _port: &str) -> bool {
        let mut state = self.state();
        if state.mode == Mode::Bootloader && state.volume_has_image() {
            state.mode = state.after_flash;
        }
        state.port_present && state.mode != Mode::Bootloader
    }
}

impl ToolBridge for SimBoard {
    fn program(&self) -> &str {
        "mpremote"
    }

    fn invoke(&self, args: &[String], _quiet: bool) -> Result<ToolOutput> {
        let mut state = self.state();
        state.bridge_calls.push(args.to_vec());
        if state.bridge_missing {
            return Err(Error::ToolFailure {
                program: "mpremote".to_string(),
                command: crate::bridge::command_line("mpremote", args),
                message: "No such file or directory (os error 2)".to_string(),
            });
        }

        let alive = state.mode == Mode::ManagedRuntime;
        let verb: Vec<&str> = args.iter().skip(2).map(String::as_str).collect();
        let output = match verb.as_slice() {
            ["exec", "import bootloader_trigger"] if alive && state.trigger_works => {
                state.mode = Mode::Bootloader;
                exited(1, "mpremote: device disconnected")
            },
            ["exec", "import bootloader_trigger"] if alive => {
                exited(1, "ImportError: no module named 'bootloader_trigger'")
            },
            ["exec", _] if alive => exited(0, ""),
            ["fs", "cp", ..] if alive && !state.copy_fails => exited(0, ""),
            ["fs", "cp", ..] if alive => exited(1, "mpremote: cp: No space left on device"),
            _ => exited(1, "mpremote: failed to access port"),
        };
        Ok(output)
    }
}
