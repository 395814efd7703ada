//! Client helpers against a live request loop on a real Unix socket.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use figwatch_core::ReconcileOutcome;
use figwatch_daemon::{ensure_watch, request_status, start_blocking, WatchDelivery};
use tempfile::TempDir;

struct Fixture {
    home: TempDir,
    tree: TempDir,
}

impl Fixture {
    /// A fresh home with the request loop running on a background thread.
    fn running() -> Self {
        let home = TempDir::new().expect("home");
        let tree = TempDir::new().expect("tree");
        let daemon_home = home.path().to_path_buf();
        thread::spawn(move || {
            if let Err(err) = start_blocking(&daemon_home) {
                eprintln!("daemon loop exited: {err}");
            }
        });
        Self { home, tree }
    }

    fn home(&self) -> &Path {
        self.home.path()
    }

    fn dir(&self, relative: &str) -> PathBuf {
        let root = fs::canonicalize(self.tree.path()).expect("canonical tree");
        let dir = if relative.is_empty() {
            root
        } else {
            root.join(relative)
        };
        fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    fn watch(&self, dir: &Path) -> ReconcileOutcome {
        match ensure_watch(self.home(), dir).expect("deliver") {
            WatchDelivery::Acknowledged(outcome) => outcome,
            other => panic!("watch of {} not acknowledged: {other:?}", dir.display()),
        }
    }
}

#[test]
fn parent_watch_supersedes_child_over_the_socket() {
    let fixture = Fixture::running();
    let root = fixture.dir("");
    let child = fixture.dir("chapter-1/figures");

    assert_eq!(
        fixture.watch(&child),
        ReconcileOutcome::Added {
            path: child.clone(),
            superseded: vec![],
        }
    );
    assert_eq!(
        fixture.watch(&root),
        ReconcileOutcome::Added {
            path: root.clone(),
            superseded: vec![child.clone()],
        }
    );
    assert_eq!(
        fixture.watch(&child),
        ReconcileOutcome::AlreadyCovered {
            path: child,
            by: root.clone(),
        }
    );

    let status = request_status(fixture.home()).expect("status");
    assert!(status.running);
    assert_eq!(status.pid, std::process::id() as i32);
    assert_eq!(status.watched, vec![root]);
}

#[test]
fn missing_directory_is_rejected_and_daemon_keeps_serving() {
    let fixture = Fixture::running();
    let ghost = fixture.dir("").join("does-not-exist");

    let delivery = ensure_watch(fixture.home(), &ghost).expect("deliver");
    assert!(
        matches!(&delivery, WatchDelivery::Rejected(message) if message.contains("does-not-exist")),
        "unexpected delivery: {delivery:?}",
    );

    let real = fixture.dir("figures");
    fixture.watch(&real);
    assert_eq!(
        request_status(fixture.home()).expect("status").watched,
        vec![real]
    );
}

#[test]
fn request_without_daemon_is_dropped_after_connect_window() {
    let home = TempDir::new().expect("home");
    let tree = TempDir::new().expect("tree");

    let started = Instant::now();
    let delivery = ensure_watch(home.path(), tree.path()).expect("no hard error");

    assert_eq!(delivery, WatchDelivery::Dropped);
    assert!(started.elapsed() >= Duration::from_secs(4));
    assert!(request_status(home.path()).is_err());
}
