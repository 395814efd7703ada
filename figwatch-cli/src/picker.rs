//! Interactive selection through an external fuzzy matcher: `rofi` on Linux,
//! `choose` on macOS. Options go in on stdin, the chosen line comes back on
//! stdout.

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};

/// Result of one picker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pick {
    /// Exit status of the picker; `-1` if it was killed by a signal.
    pub status: i32,
    /// Index into the options of the selected entry, if it matched one.
    pub index: Option<usize>,
}

pub fn picker_command() -> Result<Command> {
    if cfg!(target_os = "linux") {
        let mut command = Command::new("rofi");
        command.args([
            "-sort",
            "-no-levenshtein-sort",
            "-matching",
            "fuzzy",
            "-dmenu",
            "-p",
            "Select Figure",
            "-format",
            "s",
            "-i",
            "-lines",
            "5",
        ]);
        Ok(command)
    } else if cfg!(target_os = "macos") {
        Ok(Command::new("choose"))
    } else {
        bail!("no supported picker for {}", std::env::consts::OS)
    }
}

pub fn pick(options: &[String]) -> Result<Pick> {
    pick_with(picker_command()?, options)
}

pub fn pick_with(mut command: Command, options: &[String]) -> Result<Pick> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to launch picker '{program}'"))?;

    let input = options
        .iter()
        .map(|option| option.replace('\n', " "))
        .collect::<Vec<_>>()
        .join("\n");
    if let Some(mut stdin) = child.stdin.take() {
        // A picker may exit without reading its input.
        if let Err(err) = stdin.write_all(input.as_bytes()) {
            if err.kind() != ErrorKind::BrokenPipe {
                return Err(err).context("failed to send options to picker");
            }
        }
    }

    let output = child
        .wait_with_output()
        .context("failed to wait for picker")?;
    let selected = String::from_utf8_lossy(&output.stdout);

    Ok(Pick {
        status: output.status.code().unwrap_or(-1),
        index: match_selection(options, &selected),
    })
}

/// Index of the option equal to `selected`, comparing trimmed text.
pub fn match_selection(options: &[String], selected: &str) -> Option<usize> {
    let selected = selected.trim();
    options.iter().position(|option| option.trim() == selected)
}
