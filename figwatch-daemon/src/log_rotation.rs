//! Size-capped daemon log files.
//!
//! The detached daemon's stdout and stderr stay open on `daemon.log` and
//! `daemon-err.log` for its whole life, and every exporter child inherits
//! them. Rotation therefore copies the live file to `<name>.1` and truncates
//! it in place instead of renaming it, so the open append handles keep
//! writing to the live path.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::{stderr_log_path, stdout_log_path, MAX_LOG_BYTES, MAX_ROTATED_LOGS};

/// Rotate `log_path` once it reaches `max_bytes`, keeping `max_files` copies
/// (`<name>.1` newest).
///
/// Returns `true` if the file was rotated. A missing file is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes || max_files == 0 {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }

    fs::copy(log_path, numbered_path(log_path, 1))?;
    OpenOptions::new().write(true).open(log_path)?.set_len(0)?;
    Ok(true)
}

/// Rotate both daemon logs under `home`. Failures are logged and skipped.
pub fn rotate_logs(home: &Path) {
    for log_path in [stdout_log_path(home), stderr_log_path(home)] {
        match rotate_if_needed(&log_path, MAX_LOG_BYTES, MAX_ROTATED_LOGS) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    base.with_file_name(name)
}
