//! figwatch: create, edit and auto-export Inkscape figures.
//!
//! # Usage
//!
//! ```text
//! figwatch create <alt text> [dir] [--no-open] [--no-watch]
//! figwatch edit [path]
//! figwatch watch [dir]
//! figwatch daemon start|stop|restart|status|logs|run
//! ```

mod commands;
mod failure;
mod picker;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{create::CreateArgs, daemon::DaemonCommand, edit::EditArgs, watch::WatchArgs};
use failure::Failure;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "figwatch",
    version,
    about = "Create Inkscape figures and re-export them whenever they are saved",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a figure from the template and open it in Inkscape.
    Create(CreateArgs),

    /// Open an existing figure, picking one if a directory holds several.
    Edit(EditArgs),

    /// Ask the background daemon to export figures saved under a directory.
    Watch(WatchArgs),

    /// Control the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

impl Commands {
    /// Commands that end up running the daemon log at `info`; the rest only
    /// surface warnings.
    fn log_directive(&self) -> &'static str {
        match self {
            Commands::Daemon {
                command: DaemonCommand::Start | DaemonCommand::Restart | DaemonCommand::Run,
            } => "info",
            _ => "warn",
        }
    }

    /// Commands that may fork the daemon. The daemon inherits this process's
    /// subscriber but writes to a log file, so these log without colour.
    fn may_detach(&self) -> bool {
        match self {
            Commands::Create(args) => !args.no_watch,
            Commands::Watch(_) => true,
            Commands::Daemon { command } => {
                matches!(command, DaemonCommand::Start | DaemonCommand::Restart)
            }
            Commands::Edit(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    figwatch_daemon::init_tracing(cli.command.log_directive(), !cli.command.may_detach());

    let result = match cli.command {
        Commands::Create(args) => args.run(),
        Commands::Edit(args) => args.run(),
        Commands::Watch(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            let code = err
                .downcast_ref::<Failure>()
                .map_or(failure::GENERIC_EXIT_CODE, Failure::exit_code);
            ExitCode::from(code)
        }
    }
}
