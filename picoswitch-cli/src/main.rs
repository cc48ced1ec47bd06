//! picoswitch CLI - switch a Raspberry Pi Pico between MicroPython and C++ firmware.
//!
//! ## Features
//!
//! - Detect the current firmware mode (BOOTSEL, MicroPython, C++)
//! - Flash a UF2 image onto a board in BOOTSEL
//! - Switch firmware end to end, including the reboot into BOOTSEL
//! - Copy MicroPython helper scripts onto the board
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use picoswitch::{Firmware, Host, Mode, ModeSelector, NativeSerialLink};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

mod commands;
mod config;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if spinners and colors should be used.
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Exit code for Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;

/// Failures that map to a specific exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation detected after argument parsing.
    #[error("{0}")]
    Usage(String),
    /// `detect` could not tell which mode the board is in.
    #[error("{0}")]
    Undetermined(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Undetermined(_) => 1,
        }
    }
}

/// picoswitch - switch a Raspberry Pi Pico between MicroPython and C++ firmware.
///
/// Environment variables:
///   PICOSWITCH_PORT         - Serial port (default: /dev/ttyACM0)
///   PICOSWITCH_MOUNT_BASE   - Where to mount RPI-RP2 if the OS does not
///   NO_COLOR                - Disable colored output
///   RUST_LOG                - Override the log filter
#[derive(Parser)]
#[command(name = "picoswitch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port of the board.
    #[arg(short, long, global = true, env = "PICOSWITCH_PORT")]
    port: Option<String>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Detect the current firmware mode.
    Detect {
        /// Seconds to listen for the serial banner.
        #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
        timeout: Option<Duration>,

        /// Output the result as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Flash a UF2 image onto a board in BOOTSEL mode.
    Flash {
        /// Path to the UF2 file.
        image: PathBuf,

        /// Mount point to use when RPI-RP2 is not auto-mounted.
        #[arg(long, value_name = "DIR", env = "PICOSWITCH_MOUNT_BASE")]
        mount_base: Option<PathBuf>,

        /// Seconds to wait for RPI-RP2.
        #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
        bootsel_timeout: Option<Duration>,
    },

    /// Switch the board to another firmware.
    SwitchTo(SwitchArgs),

    /// Copy the MicroPython helper files onto the board.
    InstallHelpers {
        /// Files to copy instead of the configured helpers.
        files: Vec<PathBuf>,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments of `switch-to`.
#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct SwitchArgs {
    /// Firmware to switch to.
    #[arg(value_enum)]
    target: Target,

    /// Current firmware mode (default: auto detect).
    #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
    mode: ModeArg,

    /// Mount point to use when RPI-RP2 is not auto-mounted.
    #[arg(long, value_name = "DIR", env = "PICOSWITCH_MOUNT_BASE")]
    mount_base: Option<PathBuf>,

    /// UF2 image to flash instead of the configured one.
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// Seconds to wait for the serial banner during detection.
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    detect_timeout: Option<Duration>,

    /// Seconds to wait for RPI-RP2 after the reboot trigger.
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    bootsel_timeout: Option<Duration>,

    /// Seconds to wait for the serial port after flashing.
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    serial_wait: Option<Duration>,

    /// Flash even when the board already runs the target firmware.
    #[arg(long)]
    force_flash: bool,

    /// Install helper files after switching to MicroPython (default).
    #[arg(long, overrides_with = "no_install_helpers")]
    install_helpers: bool,

    /// Do not install helper files.
    #[arg(long, overrides_with = "install_helpers")]
    no_install_helpers: bool,
}

/// Firmware targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Target {
    /// MicroPython.
    #[value(alias = "micropython")]
    Py,
    /// C++ firmware.
    #[value(alias = "native")]
    Cpp,
}

impl From<Target> for Firmware {
    fn from(target: Target) -> Self {
        match target {
            Target::Py => Firmware::MicroPython,
            Target::Cpp => Firmware::Native,
        }
    }
}

/// Values accepted by `--mode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// Detect the mode.
    Auto,
    /// MicroPython is running.
    Py,
    /// C++ firmware is running.
    Cpp,
    /// The board is already in BOOTSEL.
    Bootsel,
}

impl From<ModeArg> for ModeSelector {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => ModeSelector::Auto,
            ModeArg::Py => ModeSelector::Explicit(Mode::ManagedRuntime),
            ModeArg::Cpp => ModeSelector::Explicit(Mode::NativeRuntime),
            ModeArg::Bootsel => ModeSelector::Explicit(Mode::Bootloader),
        }
    }
}

/// Parse a non-negative number of seconds (fractions allowed).
fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|e| format!("Invalid number of seconds: {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("Invalid number of seconds: {s}"))
}

/// Settings shared by every command after config resolution.
pub(crate) struct Session {
    /// Serial port of the board.
    pub port: String,
    /// Verbosity count.
    pub verbose: u8,
    /// Suppress progress output.
    pub quiet: bool,
    /// Merged configuration.
    pub config: Config,
    /// OS collaborators.
    pub host: Host,
}

impl Session {
    fn new(cli: &Cli, config: Config) -> Self {
        let port = cli.port.clone().unwrap_or_else(|| config.port());
        let host = Host::native().with_serial(NativeSerialLink::new(config.baud()));
        Self {
            port,
            verbose: cli.verbose,
            quiet: cli.quiet,
            config,
            host,
        }
    }
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var_os("NO_COLOR").is_some() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    // Ctrl-C ends the process; blocking waits are not interruptible.
    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!("\n{}", style("Interrupted").yellow());
        std::process::exit(EXIT_INTERRUPTED);
    }) {
        debug!("Could not install Ctrl-C handler: {e}");
    }

    debug!(
        "picoswitch v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    let code = match run(&cli) {
        Ok(()) => 0,
        Err(e) => {
            report(&e);
            exit_code(&e)
        },
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<()> {
    // Completions need neither config nor hardware.
    if let Commands::Completions { shell } = &cli.command {
        commands::completions::cmd_completions(*shell);
        return Ok(());
    }

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };
    let session = Session::new(cli, config);
    debug!("Using serial port {}", session.port);

    match &cli.command {
        Commands::Detect { timeout, json } => commands::detect::cmd_detect(
            &session,
            timeout.unwrap_or_else(|| session.config.detect_timeout()),
            *json,
        ),
        Commands::Flash {
            image,
            mount_base,
            bootsel_timeout,
        } => commands::flash::cmd_flash(
            &session,
            &config::expand_home(image),
            &mount_base
                .as_deref()
                .map_or_else(|| session.config.mount_base(), config::expand_home),
            bootsel_timeout.unwrap_or_else(|| session.config.bootsel_timeout()),
        ),
        Commands::SwitchTo(args) => commands::switch::cmd_switch(&session, args),
        Commands::InstallHelpers { files } => {
            commands::helpers::cmd_install_helpers(&session, files)
        },
        Commands::Completions { .. } => Ok(()),
    }
}

/// Print an error and its causes to stderr.
fn report(err: &anyhow::Error) {
    eprintln!("{} {err}", style("Error:").red().bold());
    for cause in err.chain().skip(1) {
        eprintln!("  {} {cause}", style("caused by:").dim());
    }
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CliError>().map_or(1, CliError::exit_code)
}
