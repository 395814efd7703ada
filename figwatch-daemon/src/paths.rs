use std::path::{Path, PathBuf};
use std::time::Duration;

use figwatch_core::config::figwatch_root;

pub const DAEMON_PID_FILE: &str = "figwatch.pid";
pub const DAEMON_LOCK_FILE: &str = "figwatch.lock";
pub const DAEMON_SOCKET: &str = "figwatch.sock";
pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";

/// How long a client keeps retrying the connection before dropping its
/// request.
pub const CONNECT_WINDOW: Duration = Duration::from_secs(4);
pub const CONNECT_RETRY_PAUSE: Duration = Duration::from_millis(20);

/// How long the server waits for a connected client to send its request.
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a connected client waits for the daemon's answer.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between termination signals in `stop`.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A log file is rotated once it grows past this size (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
/// Rotated copies kept per log file.
pub const MAX_ROTATED_LOGS: usize = 5;
pub const LOG_ROTATION_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub fn run_dir(home: &Path) -> PathBuf {
    figwatch_root(home).join("run")
}

pub fn pid_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_PID_FILE)
}

pub fn lock_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_LOCK_FILE)
}

pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    figwatch_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}
