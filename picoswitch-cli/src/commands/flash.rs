//! `flash` command.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::time::Duration;

use crate::Session;
use crate::commands::spinner;

/// Wait for RPI-RP2 and copy `image` onto it.
pub(crate) fn cmd_flash(
    session: &Session,
    image: &Path,
    mount_base: &Path,
    timeout: Duration,
) -> Result<()> {
    if !session.quiet {
        eprintln!(
            "{} Flashing {}",
            style("📦").cyan(),
            style(image.display()).yellow()
        );
    }

    let pb = spinner(session, "Waiting for RPI-RP2");
    let flashed = picoswitch::flash_image(&session.host, image, mount_base, timeout)
        .with_context(|| format!("Failed to flash {}", image.display()));
    pb.finish_and_clear();
    let dest = flashed?;

    if !session.quiet {
        eprintln!(
            "{} Copied to {}",
            style("✓").green().bold(),
            style(dest.display()).cyan()
        );
    }
    Ok(())
}
