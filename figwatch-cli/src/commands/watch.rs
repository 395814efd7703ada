//! `figwatch watch [dir]`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use figwatch_core::config;
use figwatch_core::git::find_git_root;
use figwatch_core::ReconcileOutcome;
use figwatch_daemon::paths::CONNECT_WINDOW;
use figwatch_daemon::{ensure_watch, start_blocking, Lifecycle, StartOutcome, WatchDelivery};

use crate::failure::Failure;

/// Export figures saved anywhere under a directory.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Directory to watch. Defaults to the git repository containing the
    /// current directory.
    pub dir: Option<PathBuf>,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let home = config::home()?;
        let dir = resolve_target(self.dir)?;
        ensure_watched(&home, &dir)
    }
}

fn resolve_target(dir: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match dir {
        Some(dir) => {
            if !dir.is_dir() {
                return Err(Failure::NotADirectory(dir).into());
            }
            dir
        }
        None => {
            let cwd = std::env::current_dir().context("cannot determine current directory")?;
            match find_git_root(&cwd) {
                Some(root) => root,
                None => return Err(Failure::NoGitRepository(cwd).into()),
            }
        }
    };
    dir.canonicalize()
        .with_context(|| format!("cannot resolve path '{}'", dir.display()))
}

/// Start the daemon if needed, then ask it to watch `dir` (absolute).
///
/// A request the daemon never picks up is reported but does not fail the
/// command.
pub(crate) fn ensure_watched(home: &Path, dir: &Path) -> Result<()> {
    let lifecycle = Lifecycle::at(home);
    match lifecycle
        .start(|| start_blocking(home))
        .context("failed to start daemon")?
    {
        StartOutcome::Launched => tracing::info!("daemon started"),
        StartOutcome::AlreadyRunning { pid } => tracing::debug!(pid, "daemon already running"),
        StartOutcome::Finished => {}
    }

    match ensure_watch(home, dir).context("failed to send watch request")? {
        WatchDelivery::Acknowledged(ReconcileOutcome::Added { path, superseded }) => {
            println!("Watching {}", path.display());
            for child in superseded {
                println!("  (replaces {})", child.display());
            }
        }
        WatchDelivery::Acknowledged(ReconcileOutcome::AlreadyCovered { path, by }) => {
            println!("{} is already watched via {}", path.display(), by.display());
        }
        WatchDelivery::Rejected(message) => {
            eprintln!(
                "{} daemon could not watch '{}': {message}",
                "warning:".yellow().bold(),
                dir.display()
            );
        }
        WatchDelivery::Dropped => {
            eprintln!(
                "{} daemon did not accept the watch request within {}s; '{}' is not watched",
                "warning:".yellow().bold(),
                CONNECT_WINDOW.as_secs(),
                dir.display()
            );
        }
        WatchDelivery::Unacknowledged => {
            eprintln!(
                "{} daemon did not answer the watch request for '{}'; check `figwatch daemon status`",
                "warning:".yellow().bold(),
                dir.display()
            );
        }
    }
    Ok(())
}
