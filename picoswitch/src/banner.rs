//! Serial banner detection.
//!
//! Both firmware images print an identity line shortly after boot
//! (`FW:PY` for MicroPython, `FW:CPP` for the C++ image). The reader listens
//! for a bounded window and reports the first marker it sees. Boot-time
//! serial noise is expected, so undecodable bytes are dropped instead of
//! failing the read.

use crate::error::{Error, Result};
use crate::mode::Mode;
use crate::port::Port;
use log::{debug, trace};
use std::io::ErrorKind;
use std::time::{Duration, Instant};

/// Per-read timeout used while scanning for a banner.
pub const BANNER_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Result of a banner scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Banner {
    /// Mode identified by a marker, if any was seen.
    pub mode: Option<Mode>,
    /// Line that carried the marker, or the last non-empty line seen.
    pub last_line: String,
}

/// Decode serial bytes as UTF-8, silently dropping invalid sequences.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// Scan `port` for a firmware banner for at most `timeout`.
///
/// Input buffered before the call is discarded first so a banner from an
/// earlier boot is never mistaken for the current one.
pub fn read_banner<P: Port + ?Sized>(port: &mut P, timeout: Duration) -> Result<Banner> {
    port.clear_input()?;

    let deadline = Instant::now() + timeout;
    let mut pending: Vec<u8> = Vec::new();
    let mut last_line = String::new();
    let mut buf = [0u8; 256];

    while Instant::now() < deadline {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                trace!("Banner read {n} bytes");
                pending.extend_from_slice(&buf[..n]);
            },
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {},
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }

        while let Some(newline) = pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = pending.drain(..=newline).collect();
            let line = decode_lossy(&raw).trim().to_string();
            if line.is_empty() {
                continue;
            }
            trace!("Banner line: {line:?}");
            if let Some(mode) = Mode::from_banner(&line) {
                debug!("Banner marker for {mode} in {line:?}");
                return Ok(Banner {
                    mode: Some(mode),
                    last_line: line,
                });
            }
            last_line = line;
        }

        // A marker may arrive without its line terminator before the window
        // closes.
        if !pending.is_empty() {
            let partial = decode_lossy(&pending).trim().to_string();
            if let Some(mode) = Mode::from_banner(&partial) {
                debug!("Banner marker for {mode} in partial line {partial:?}");
                return Ok(Banner {
                    mode: Some(mode),
                    last_line: partial,
                });
            }
        }
    }

    let partial = decode_lossy(&pending).trim().to_string();
    if !partial.is_empty() {
        last_line = partial;
    }

    Ok(Banner {
        mode: None,
        last_line,
    })
}
