//! `switch-to` command.

use anyhow::{Context, Result};
use console::style;
use picoswitch::{Firmware, Stage, SwitchRequest, Switcher, detect_mode_safe};
use std::time::Duration;

use crate::commands::spinner;
use crate::config::expand_home;
use crate::{Session, SwitchArgs};

/// Shortest banner window for the confirmation detect after a switch.
const CONFIRM_DETECT_MIN: Duration = Duration::from_secs(2);

/// Build the library request from flags and config.
pub(crate) fn build_request(session: &Session, args: &SwitchArgs) -> SwitchRequest {
    let config = &session.config;
    let target = Firmware::from(args.target);
    let image = args
        .image
        .as_deref()
        .map_or_else(|| config.image_for(target), expand_home);
    let mount_base = args
        .mount_base
        .as_deref()
        .map_or_else(|| config.mount_base(), expand_home);

    SwitchRequest::new(target, image)
        .with_mode(args.mode.into())
        .with_port(session.port.clone())
        .with_mount_base(mount_base)
        .with_detect_timeout(args.detect_timeout.unwrap_or_else(|| config.detect_timeout()))
        .with_bootsel_timeout(args.bootsel_timeout.unwrap_or_else(|| config.bootsel_timeout()))
        .with_serial_wait(args.serial_wait.unwrap_or_else(|| config.serial_wait()))
        .with_helpers(
            target.supports_helpers() && (args.install_helpers || !args.no_install_helpers),
            config.helpers(),
        )
        .with_force_flash(args.force_flash)
        .with_verbose(session.verbose > 0)
}

/// Switch the board to the requested firmware.
pub(crate) fn cmd_switch(session: &Session, args: &SwitchArgs) -> Result<()> {
    let request = build_request(session, args);
    let target = request.target;

    let pb = spinner(session, Stage::ResolveMode.to_string());
    let result = Switcher::new(&session.host, &request)
        .run(&mut |stage| {
            log::debug!("Stage: {stage:?}");
            pb.set_message(stage.to_string());
        })
        .with_context(|| format!("Switch to {target} failed"));
    pb.finish_and_clear();
    let flashed = result?;

    if flashed {
        println!("Switched to {target} UF2.");
    } else {
        println!("Already in {target} mode; skipped UF2 flash.");
    }

    if target == Firmware::MicroPython {
        let timeout = request.detect_timeout.max(CONFIRM_DETECT_MIN);
        let pb = spinner(session, "Confirming mode");
        let detection = detect_mode_safe(&session.host, &session.port, timeout);
        pb.finish_and_clear();
        println!("detect: {}", detection.mode);
        if !session.quiet {
            if let Some(diagnostic) = detection.diagnostic() {
                eprintln!("{} {}", style("⚠").yellow(), diagnostic);
            }
        }
    }
    Ok(())
}
