//! `detect` command.

use anyhow::{Context, Result};
use console::style;
use picoswitch::{Detection, Evidence, Mode};
use std::time::Duration;

use crate::commands::spinner;
use crate::{CliError, Session};

/// Print the detected mode name on stdout; exit 1 if it stays unknown.
pub(crate) fn cmd_detect(session: &Session, timeout: Duration, json: bool) -> Result<()> {
    let pb = spinner(session, format!("Detecting mode on {}", session.port));
    let detection = picoswitch::detect(&session.host, &session.port, timeout)
        .with_context(|| format!("Could not detect mode on {}", session.port));
    pb.finish_and_clear();
    let detection = detection?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&to_json(session, &detection))?
        );
    } else {
        println!("{}", detection.mode);
        if !session.quiet {
            if let Some(reason) = describe(&detection.evidence) {
                eprintln!("{} {}", style("ℹ").blue(), style(reason).dim());
            }
        }
    }

    if detection.mode.is_known() {
        return Ok(());
    }
    let message = format!("Could not determine the mode of the board on {}", session.port);
    Err(CliError::Undetermined(match detection.diagnostic() {
        Some(diagnostic) => format!("{message} ({diagnostic})"),
        None => message,
    })
    .into())
}

fn describe(evidence: &Evidence) -> Option<String> {
    match evidence {
        Evidence::Volume { device } => {
            let dev = device.device_path();
            Some(match device.mounted_at() {
                Some(path) => format!("RPI-RP2 on {dev} mounted at {}", path.display()),
                None => format!("RPI-RP2 on {dev} (not mounted)"),
            })
        },
        Evidence::Banner { line } => Some(format!("banner: {line}")),
        Evidence::Probe => Some("MicroPython answered mpremote".to_string()),
        Evidence::Nothing { .. } | Evidence::Failed { .. } => None,
    }
}

fn to_json(session: &Session, detection: &Detection) -> serde_json::Value {
    serde_json::json!({
        "mode": detection.mode.name(),
        "known": detection.mode != Mode::Unknown,
        "port": session.port,
        "source": detection.evidence.source(),
        "detail": describe(&detection.evidence).or_else(|| detection.diagnostic()),
    })
}
