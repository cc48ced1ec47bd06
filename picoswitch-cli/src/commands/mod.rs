//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod detect;
pub(crate) mod flash;
pub(crate) mod helpers;
pub(crate) mod switch;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::{Session, use_fancy_output};

/// Spinner on stderr, hidden when quiet, verbose or not on a terminal.
///
/// Verbose runs stream `mpremote` output, which a spinner would garble.
pub(crate) fn spinner(session: &Session, message: impl Into<String>) -> ProgressBar {
    if session.quiet || session.verbose > 0 || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} {msg} {elapsed:.dim}")
    {
        pb.set_style(style);
    }
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
