//! `install-helpers` command.

use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;

use crate::commands::spinner;
use crate::config::expand_home;
use crate::{CliError, Session};

/// Copy helper files onto a board running MicroPython.
///
/// `files` overrides the configured list when non-empty.
pub(crate) fn cmd_install_helpers(session: &Session, files: &[PathBuf]) -> Result<()> {
    let helpers: Vec<PathBuf> = if files.is_empty() {
        session.config.helpers()
    } else {
        files.iter().map(|f| expand_home(f)).collect()
    };
    if helpers.is_empty() {
        return Err(CliError::Usage(
            "No helper files configured; pass files or set firmware.helpers".to_string(),
        )
        .into());
    }

    let pb = spinner(session, format!("Copying helpers to {}", session.port));
    let installed = picoswitch::install_helpers(
        session.host.bridge.as_ref(),
        &session.port,
        &helpers,
        session.verbose == 0,
    )
    .context("Failed to install helper files");
    pb.finish_and_clear();
    installed?;

    if !session.quiet {
        for helper in &helpers {
            eprintln!(
                "{} {}",
                style("✓").green(),
                style(helper.display()).cyan()
            );
        }
        eprintln!(
            "{} Installed {} helper file(s)",
            style("✓").green().bold(),
            helpers.len()
        );
    }
    Ok(())
}
