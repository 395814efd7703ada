//! Background process lifecycle: start, stop, restart.
//!
//! A single daemon instance is tracked through a pid record at
//! `~/.figwatch/run/figwatch.pid` (decimal pid followed by a newline). The
//! record alone never proves the daemon is up: the recorded pid is always
//! checked against the live process table, and a record naming a dead process
//! is treated as stale.
//!
//! Two near-simultaneous `start` calls can both pass the liveness check and
//! both detach. Only the process holding an exclusive `flock` on
//! `figwatch.lock` goes on to write the pid record and serve; the other exits
//! without touching the record. The lock dies with its holder, so it never
//! goes stale.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread::sleep;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::{umask, Mode};
use nix::sys::wait::waitpid;
use nix::unistd::{chdir, dup2, fork, getpid, setsid, ForkResult, Pid};
use serde::Serialize;

use crate::error::{io_err, DaemonError};
use crate::log_rotation::rotate_logs;
use crate::paths::{
    lock_path, logs_dir, pid_path, stderr_log_path, stdout_log_path, STOP_POLL_INTERVAL,
};

/// What the pid record says about the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DaemonState {
    NotRunning,
    Running { pid: i32 },
    /// The record names a process that no longer exists.
    Stale { pid: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A live daemon already holds the pid record; nothing was started.
    AlreadyRunning { pid: i32 },
    /// The daemon was detached into the background.
    Launched,
    /// `run_foreground` ran the work to completion.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Stopped { pid: i32 },
}

/// Exclusive hold on the instance lock; released when dropped or when the
/// holding process dies.
pub struct InstanceLock {
    _flock: Flock<File>,
}

/// Start/stop control over the daemon process for one home directory.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    home: PathBuf,
    pid_file: PathBuf,
    lock_file: PathBuf,
    logs_dir: PathBuf,
    stdout_log: PathBuf,
    stderr_log: PathBuf,
}

impl Lifecycle {
    pub fn at(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            pid_file: pid_path(home),
            lock_file: lock_path(home),
            logs_dir: logs_dir(home),
            stdout_log: stdout_log_path(home),
            stderr_log: stderr_log_path(home),
        }
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    // -----------------------------------------------------------------------
    // Pid record
    // -----------------------------------------------------------------------

    /// The recorded pid, or `None` if there is no usable record.
    pub fn read_pid(&self) -> Result<Option<i32>, DaemonError> {
        let contents = match fs::read_to_string(&self.pid_file) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(&self.pid_file, err)),
        };
        match contents.trim().parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => {
                tracing::warn!(
                    path = %self.pid_file.display(),
                    contents = contents.trim(),
                    "ignoring malformed pid record",
                );
                Ok(None)
            }
        }
    }

    pub fn write_pid(&self, pid: i32) -> Result<(), DaemonError> {
        if let Some(parent) = self.pid_file.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        fs::write(&self.pid_file, format!("{pid}\n")).map_err(|e| io_err(&self.pid_file, e))
    }

    /// Remove the pid record. Failure is logged, never fatal.
    pub fn remove_pid_record(&self) {
        match fs::remove_file(&self.pid_file) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = %self.pid_file.display(),
                error = %err,
                "failed to remove pid record",
            ),
        }
    }

    /// Remove the pid record only if it still names `pid`.
    pub fn remove_own_pid_record(&self, pid: i32) {
        match self.read_pid() {
            Ok(Some(recorded)) if recorded == pid => self.remove_pid_record(),
            Ok(Some(recorded)) => tracing::debug!(
                pid,
                recorded,
                "pid record belongs to another process; leaving it",
            ),
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "failed to read pid record"),
        }
    }

    /// Take the instance lock, or `None` if another process holds it.
    pub fn try_lock_instance(&self) -> Result<Option<InstanceLock>, DaemonError> {
        if let Some(parent) = self.lock_file.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)
            .map_err(|e| io_err(&self.lock_file, e))?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => Ok(Some(InstanceLock { _flock: flock })),
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => Ok(None),
            Err((_, errno)) => Err(io_err(&self.lock_file, std::io::Error::from(errno))),
        }
    }

    pub fn state(&self) -> Result<DaemonState, DaemonError> {
        Ok(match self.read_pid()? {
            None => DaemonState::NotRunning,
            Some(pid) if is_alive(pid) => DaemonState::Running { pid },
            Some(pid) => DaemonState::Stale { pid },
        })
    }

    /// The pid of a live daemon, clearing any stale or malformed record on
    /// the way.
    pub(crate) fn live_pid(&self) -> Result<Option<i32>, DaemonError> {
        match self.state()? {
            DaemonState::Running { pid } => Ok(Some(pid)),
            DaemonState::Stale { pid } => {
                tracing::info!(pid, "removing stale pid record");
                self.remove_pid_record();
                Ok(None)
            }
            DaemonState::NotRunning => {
                if self.pid_file.exists() {
                    self.remove_pid_record();
                }
                Ok(None)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Detach into the background and run `work` there.
    ///
    /// Returns in the calling process as soon as the daemon is detached. The
    /// detached process never returns from this call: it exits when `work`
    /// does, removing its own pid record first.
    pub fn start<F>(&self, work: F) -> Result<StartOutcome, DaemonError>
    where
        F: FnOnce() -> Result<(), DaemonError>,
    {
        if let Some(pid) = self.live_pid()? {
            tracing::info!(pid, "daemon already running; not starting another");
            return Ok(StartOutcome::AlreadyRunning { pid });
        }

        fs::create_dir_all(&self.logs_dir).map_err(|e| io_err(&self.logs_dir, e))?;

        // SAFETY: the CLI is single-threaded at this point; no runtime or
        // watcher threads exist until `work` runs in the grandchild.
        match unsafe { fork() }.map_err(DaemonError::Fork)? {
            ForkResult::Parent { child } => {
                // The intermediate child exits right after the second fork.
                let _ = waitpid(child, None);
                return Ok(StartOutcome::Launched);
            }
            ForkResult::Child => {}
        }

        let _ = chdir("/");
        if let Err(err) = setsid() {
            eprintln!("setsid failed: {err}");
            std::process::exit(1);
        }
        umask(Mode::from_bits_truncate(0o022));

        // SAFETY: still single-threaded, see above.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { .. }) => std::process::exit(0),
            Ok(ForkResult::Child) => {}
            Err(err) => {
                eprintln!("second fork failed: {err}");
                std::process::exit(1);
            }
        }

        let code = match self.enter_detached(work) {
            Ok(()) => 0,
            Err(err) => {
                tracing::error!(error = %err, "daemon exited with error");
                1
            }
        };
        std::process::exit(code);
    }

    /// Run `work` in the current process while holding the pid record.
    ///
    /// Used by `figwatch daemon run`, where a supervisor or a terminal owns
    /// the process instead of the double fork.
    pub fn run_foreground<F>(&self, work: F) -> Result<StartOutcome, DaemonError>
    where
        F: FnOnce() -> Result<(), DaemonError>,
    {
        if let Some(pid) = self.live_pid()? {
            tracing::info!(pid, "daemon already running; not starting another");
            return Ok(StartOutcome::AlreadyRunning { pid });
        }

        let Some(_lock) = self.try_lock_instance()? else {
            return Err(DaemonError::InstanceLocked {
                path: self.lock_file.clone(),
            });
        };

        let pid = getpid().as_raw();
        self.write_pid(pid)?;
        let result = work();
        self.remove_own_pid_record(pid);
        result.map(|()| StartOutcome::Finished)
    }

    /// Terminate the recorded daemon and remove its pid record.
    ///
    /// Sends `SIGTERM` until the process is gone. Stopping a daemon that is
    /// not running is not an error; a stale record is cleared.
    pub fn stop(&self) -> Result<StopOutcome, DaemonError> {
        let Some(pid) = self.live_pid()? else {
            tracing::info!(
                path = %self.pid_file.display(),
                "no live daemon recorded; nothing to stop",
            );
            return Ok(StopOutcome::NotRunning);
        };

        let target = Pid::from_raw(pid);
        loop {
            match kill(target, Signal::SIGTERM) {
                Ok(()) => sleep(STOP_POLL_INTERVAL),
                Err(Errno::ESRCH) => break,
                Err(source) => return Err(DaemonError::Signal { pid, source }),
            }
        }

        self.remove_pid_record();
        tracing::info!(pid, "daemon stopped");
        Ok(StopOutcome::Stopped { pid })
    }

    pub fn restart<F>(&self, work: F) -> Result<StartOutcome, DaemonError>
    where
        F: FnOnce() -> Result<(), DaemonError>,
    {
        self.stop()?;
        self.start(work)
    }

    fn enter_detached<F>(&self, work: F) -> Result<(), DaemonError>
    where
        F: FnOnce() -> Result<(), DaemonError>,
    {
        let pid = getpid().as_raw();
        let Some(_lock) = self.try_lock_instance()? else {
            tracing::debug!(pid, "another daemon holds the instance lock; exiting");
            return Ok(());
        };

        rotate_logs(&self.home);
        self.redirect_stdio()?;
        self.write_pid(pid)?;
        tracing::info!(pid, "daemon launched");

        let result = work();
        self.remove_own_pid_record(pid);
        result
    }

    /// Point stdin at `/dev/null` and append stdout/stderr to the log files.
    fn redirect_stdio(&self) -> Result<(), DaemonError> {
        let null = File::open("/dev/null").map_err(|e| io_err("/dev/null", e))?;
        let stdout = append(&self.stdout_log)?;
        let stderr = append(&self.stderr_log)?;

        for (file, target) in [
            (&null, std::io::stdin().as_raw_fd()),
            (&stdout, std::io::stdout().as_raw_fd()),
            (&stderr, std::io::stderr().as_raw_fd()),
        ] {
            dup2(file.as_raw_fd(), target)
                .map_err(|errno| io_err("stdio redirect", std::io::Error::from(errno)))?;
        }
        Ok(())
    }
}

/// `true` if `pid` names a process in the live process table.
///
/// A process owned by another user still counts as alive.
pub fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None::<Signal>) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn append(path: &Path) -> Result<File, DaemonError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))
}
