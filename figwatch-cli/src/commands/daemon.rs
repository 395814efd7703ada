//! `figwatch daemon`: background exporter lifecycle.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use figwatch_core::config;
use figwatch_daemon::paths::{stderr_log_path, stdout_log_path};
use figwatch_daemon::{
    request_status, start_blocking, DaemonError, Lifecycle, StartOutcome, StopOutcome,
};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Detach the daemon into the background.
    Start,
    /// Terminate the running daemon.
    Stop,
    /// Stop, then start the daemon.
    Restart,
    /// Query daemon status over the request socket.
    Status,
    /// Print recent daemon log lines.
    Logs(DaemonLogsArgs),
    /// Run the daemon in the foreground.
    Run,
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only stderr log file.
    #[arg(long)]
    pub stderr_only: bool,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = config::home()?;
    let lifecycle = Lifecycle::at(&home);

    match command {
        DaemonCommand::Start => {
            let outcome = lifecycle
                .start(|| start_blocking(&home))
                .context("failed to start daemon")?;
            report_start(outcome);
        }
        DaemonCommand::Stop => match lifecycle.stop().context("failed to stop daemon")? {
            StopOutcome::Stopped { pid } => println!("daemon stopped (pid {pid})"),
            StopOutcome::NotRunning => println!("daemon is not running"),
        },
        DaemonCommand::Restart => {
            let outcome = lifecycle
                .restart(|| start_blocking(&home))
                .context("failed to restart daemon")?;
            report_start(outcome);
        }
        DaemonCommand::Status => {
            let payload = match request_status(&home) {
                Ok(status) => serde_json::to_value(status)
                    .context("failed to render daemon status JSON")?,
                Err(DaemonError::DaemonNotRunning { socket }) => {
                    let state = lifecycle.state().context("failed to read pid record")?;
                    serde_json::json!({
                        "running": false,
                        "pid_record": state,
                        "socket": socket.display().to_string(),
                    })
                }
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render daemon status JSON")?
            );
        }
        DaemonCommand::Logs(args) => {
            if args.stderr_only {
                print_tail(&stderr_log_path(&home), args.lines)
                    .context("failed to read daemon stderr log")?;
            } else {
                print_tail(&stdout_log_path(&home), args.lines)
                    .context("failed to read daemon stdout log")?;
                print_tail(&stderr_log_path(&home), args.lines)
                    .context("failed to read daemon stderr log")?;
            }
        }
        DaemonCommand::Run => {
            let outcome = lifecycle
                .run_foreground(|| start_blocking(&home))
                .context("daemon exited with error")?;
            report_start(outcome);
        }
    }

    Ok(())
}

fn report_start(outcome: StartOutcome) {
    match outcome {
        StartOutcome::Launched => println!("daemon started"),
        StartOutcome::AlreadyRunning { pid } => println!("daemon already running (pid {pid})"),
        StartOutcome::Finished => println!("daemon exited"),
    }
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut tail = VecDeque::<String>::new();
    for line in reader.lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if lines == 0 {
            continue;
        }
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
