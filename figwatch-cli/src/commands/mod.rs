pub mod create;
pub mod daemon;
pub mod edit;
pub mod watch;

use std::path::Path;
use std::process::{Command, Stdio};

use colored::Colorize;
use figwatch_daemon::export::RASTERIZER;

/// Open `figure` in Inkscape without waiting for it. A missing editor is a
/// warning, not a failure: the figure has already been written.
pub(crate) fn open_in_editor(figure: &Path) {
    let spawned = Command::new(RASTERIZER)
        .arg(figure)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    if let Err(err) = spawned {
        eprintln!(
            "{} could not launch {RASTERIZER} for '{}': {err}",
            "warning:".yellow().bold(),
            figure.display()
        );
    }
}
