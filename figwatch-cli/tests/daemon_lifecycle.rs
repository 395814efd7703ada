use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tempfile::TempDir;

fn figwatch_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_figwatch"));
    cmd.env("HOME", home).env_remove("RUST_LOG");
    cmd
}

fn pid_file(home: &Path) -> PathBuf {
    home.join(".figwatch/run/figwatch.pid")
}

fn recorded_pid(home: &Path) -> Option<u32> {
    fs::read_to_string(pid_file(home))
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

/// Run a figwatch command, killing it if it outlives `timeout`.
fn run_bounded(home: &Path, args: &[&str], timeout: Duration) -> Output {
    let mut child = figwatch_cmd(home)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn figwatch");

    let finished = wait_until(timeout, || matches!(child.try_wait(), Ok(Some(_))));
    if !finished {
        let _ = child.kill();
    }
    let output = child.wait_with_output().expect("collect output");
    assert!(finished, "figwatch {args:?} did not finish within {timeout:?}");
    output
}

fn status(home: &Path) -> serde_json::Value {
    let output = run_bounded(home, &["daemon", "status"], Duration::from_secs(10));
    assert!(output.status.success(), "status failed: {output:?}");
    serde_json::from_slice(&output.stdout).expect("status json")
}

/// Terminates whatever daemon the home still records, even if the test
/// panicked halfway.
struct Home(TempDir);

impl Drop for Home {
    fn drop(&mut self) {
        if let Some(pid) = recorded_pid(self.0.path()) {
            let _ = Command::new("kill").arg(pid.to_string()).status();
        }
    }
}

#[test]
fn watch_starts_daemon_and_stop_terminates_it() {
    let home = Home(TempDir::new().expect("home"));
    let home_path = home.0.path();
    let tree = TempDir::new().expect("tree");
    let root = fs::canonicalize(tree.path()).expect("canonical tree");
    let child = root.join("chapter-1");
    fs::create_dir_all(&child).expect("child dir");

    // First request starts the daemon on demand.
    let watched = run_bounded(
        home_path,
        &["watch", child.to_str().expect("utf8 path")],
        Duration::from_secs(15),
    );
    assert!(watched.status.success(), "watch failed: {watched:?}");
    assert!(String::from_utf8_lossy(&watched.stdout).contains("Watching"));

    let pid = recorded_pid(home_path).expect("pid record written");
    let value = status(home_path);
    assert_eq!(value["running"], serde_json::Value::Bool(true));
    assert_eq!(value["pid"], serde_json::json!(pid));

    // Parent supersedes the child.
    let parent = run_bounded(
        home_path,
        &["watch", root.to_str().expect("utf8 path")],
        Duration::from_secs(15),
    );
    let stdout = String::from_utf8_lossy(&parent.stdout);
    assert!(stdout.contains("replaces"), "unexpected output: {stdout}");
    assert_eq!(
        status(home_path)["watched"],
        serde_json::json!([root.display().to_string()])
    );

    // A second start is refused while the first daemon lives.
    let again = run_bounded(home_path, &["daemon", "start"], Duration::from_secs(10));
    assert!(String::from_utf8_lossy(&again.stdout).contains("already running"));
    assert_eq!(recorded_pid(home_path), Some(pid));

    let stopped = run_bounded(home_path, &["daemon", "stop"], Duration::from_secs(15));
    assert!(stopped.status.success(), "stop failed: {stopped:?}");
    assert!(!pid_file(home_path).exists());
    assert_eq!(status(home_path)["running"], serde_json::Value::Bool(false));
}

#[test]
fn concurrent_starts_leave_one_stoppable_daemon() {
    let home = Home(TempDir::new().expect("home"));
    let home_path = home.0.path();

    let starts: Vec<_> = (0..2)
        .map(|_| {
            figwatch_cmd(home_path)
                .args(["daemon", "start"])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .expect("spawn start")
        })
        .collect();
    for mut start in starts {
        assert!(start.wait().expect("wait start").success());
    }

    assert!(
        wait_until(Duration::from_secs(10), || {
            recorded_pid(home_path).is_some() && status(home_path)["running"] == true
        }),
        "daemon never came up"
    );
    // Give the losing process time to exit before checking the record.
    sleep(Duration::from_millis(500));

    let pid = recorded_pid(home_path).expect("pid record survives the race");
    assert_eq!(status(home_path)["pid"], serde_json::json!(pid));

    let stopped = run_bounded(home_path, &["daemon", "stop"], Duration::from_secs(15));
    let stdout = String::from_utf8_lossy(&stopped.stdout);
    assert!(stdout.contains(&format!("daemon stopped (pid {pid})")), "{stdout}");
    assert_eq!(status(home_path)["running"], serde_json::Value::Bool(false));

    let log = fs::read_to_string(home_path.join(".figwatch/logs/daemon-err.log"))
        .expect("daemon stderr log");
    assert_eq!(log.matches("daemon launched").count(), 1, "{log}");
    assert!(!log.contains('\u{1b}'), "colour escapes in log file: {log}");
}
