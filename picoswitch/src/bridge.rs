//! Bridge to the `mpremote` device tool.
//!
//! All MicroPython interaction (remote exec, file copy) goes through one
//! narrow seam, [`ToolBridge`]. Implementations only have to launch the tool
//! ([`ToolBridge::invoke`]); turning a nonzero exit into
//! [`Error::ToolFailure`] is shared by every implementation through
//! [`ToolBridge::run`], so callers can choose per call whether a failure is a
//! boolean answer or a hard error.

use crate::error::{Error, Result};
use log::{debug, trace, warn};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default program name of the bridge tool.
pub const MPREMOTE: &str = "mpremote";

/// Longest a single bridge invocation may run before it is killed.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

const TOOL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured stdout (empty when output was streamed).
    pub stdout: String,
    /// Captured stderr (empty when output was streamed).
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the tool exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Trimmed stderr, falling back to trimmed stdout.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Launches the device tool.
pub trait ToolBridge {
    /// Program name, used in error messages.
    fn program(&self) -> &str;

    /// Run the tool once with `args`.
    ///
    /// With `quiet` set, output is captured; otherwise it is passed through to
    /// the terminal. Fails only if the tool could not be launched.
    fn invoke(&self, args: &[String], quiet: bool) -> Result<ToolOutput>;

    /// Run the tool and, unless `allow_error`, turn a nonzero exit into
    /// [`Error::ToolFailure`].
    fn run(&self, args: &[String], quiet: bool, allow_error: bool) -> Result<ToolOutput> {
        let output = self.invoke(args, quiet)?;
        if output.success() || allow_error {
            return Ok(output);
        }

        Err(Error::ToolFailure {
            program: self.program().to_string(),
            command: command_line(self.program(), args),
            message: if quiet {
                output.error_text()
            } else {
                String::new()
            },
        })
    }
}

/// Render a command line for logs and error messages.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Arguments for `mpremote connect <port> exec <code>`.
pub fn exec_args(port: &str, code: &str) -> Vec<String> {
    vec![
        "connect".to_string(),
        port.to_string(),
        "exec".to_string(),
        code.to_string(),
    ]
}

/// Arguments for `mpremote connect <port> fs cp <file> :`.
pub fn copy_args(port: &str, file: &str) -> Vec<String> {
    vec![
        "connect".to_string(),
        port.to_string(),
        "fs".to_string(),
        "cp".to_string(),
        file.to_string(),
        ":".to_string(),
    ]
}

/// [`ToolBridge`] that spawns `mpremote` as a subprocess.
#[derive(Debug, Clone)]
pub struct Mpremote {
    program: String,
    timeout: Duration,
}

impl Default for Mpremote {
    fn default() -> Self {
        Self {
            program: MPREMOTE.to_string(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl Mpremote {
    /// Use `mpremote` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Kill invocations that run longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Read a child pipe to the end on its own thread.
fn drain(mut pipe: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Wait for `child` until `deadline`; `None` means it is still running.
fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(TOOL_POLL_INTERVAL.min(deadline - now));
    }
}

impl ToolBridge for Mpremote {
    fn program(&self) -> &str {
        &self.program
    }

    fn invoke(&self, args: &[String], quiet: bool) -> Result<ToolOutput> {
        let rendered = command_line(&self.program, args);
        debug!("Running {rendered}");

        let spawn_failure = |e: std::io::Error| Error::ToolFailure {
            program: self.program.clone(),
            command: rendered.clone(),
            message: e.to_string(),
        };

        let output_mode = || {
            if quiet {
                Stdio::piped()
            } else {
                Stdio::inherit()
            }
        };
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(output_mode())
            .stderr(output_mode())
            .spawn()
            .map_err(spawn_failure)?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let Some(status) = wait_until(&mut child, Instant::now() + self.timeout)? else {
            warn!("{rendered} still running after {:?}, killing it", self.timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Timeout(format!(
                "{rendered} did not finish within {:?}",
                self.timeout
            )));
        };

        let output = ToolOutput {
            exit_code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        };

        trace!("{} exited with {:?}", self.program, output.exit_code);
        Ok(output)
    }
}
