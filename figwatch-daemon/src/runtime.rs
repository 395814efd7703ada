use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use figwatch_core::{Subscriber, WatchSet};
use nix::unistd::getpid;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::time::timeout;

use crate::engine::SubscriptionEngine;
use crate::error::{io_err, DaemonError};
use crate::export::{ExportTrigger, InkscapeExporter};
use crate::log_rotation::rotate_logs;
use crate::paths::{logs_dir, run_dir, socket_path, LOG_ROTATION_INTERVAL, REQUEST_READ_TIMEOUT};
use crate::protocol::{DaemonRequest, DaemonResponse, DaemonStatus};

/// Start the daemon runtime and block the current thread until it exits.
///
/// Must be called after any forking: the runtime owns threads.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the request loop. Requests are handled strictly one at a time; the
/// watch set is owned by this loop and nothing else.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let handler = ExportTrigger::new(InkscapeExporter::default()).into_handler();
    let engine = SubscriptionEngine::new(handler);
    let mut server = WatchServer::new(WatchSet::new(engine), getpid().as_raw(), unix_seconds_now());

    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;
    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    tracing::info!(
        pid = server.pid,
        socket = %socket.display(),
        "request channel listening",
    );

    let mut rotation = tokio::time::interval(LOG_ROTATION_INTERVAL);
    rotation.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                if let Err(err) = server.serve(stream).await {
                    tracing::error!(error = %err, "socket client error");
                }
            }
            _ = rotation.tick() => rotate_logs(&home),
        }
    }
}

/// Applies requests to the watch set.
pub struct WatchServer<S: Subscriber> {
    watch_set: WatchSet<S>,
    pid: i32,
    started_at_unix: u64,
}

impl<S: Subscriber> WatchServer<S> {
    pub fn new(watch_set: WatchSet<S>, pid: i32, started_at_unix: u64) -> Self {
        Self {
            watch_set,
            pid,
            started_at_unix,
        }
    }

    pub fn watch_set(&self) -> &WatchSet<S> {
        &self.watch_set
    }

    /// Serve one connection: read a single request line, answer it, close.
    ///
    /// A client that sends nothing before [`REQUEST_READ_TIMEOUT`] is
    /// disconnected without a response.
    pub async fn serve<T>(&mut self, stream: T) -> Result<(), DaemonError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        let read = match timeout(REQUEST_READ_TIMEOUT, reader.read_line(&mut line)).await {
            Ok(read) => read.map_err(|e| io_err("daemon socket read", e))?,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = REQUEST_READ_TIMEOUT.as_millis() as u64,
                    "client sent no request before deadline",
                );
                return Ok(());
            }
        };
        if read == 0 || line.trim().is_empty() {
            return Ok(());
        }

        let response = self.handle_line(line.trim());
        write_response(&mut writer, &response).await
    }

    pub fn handle_line(&mut self, line: &str) -> DaemonResponse {
        let request: DaemonRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => return DaemonResponse::error(format!("invalid request JSON: {err}")),
        };

        if !request.is_authentic() {
            tracing::warn!(cmd = request.command(), "rejecting request with bad token");
            return DaemonResponse::error("authentication failed");
        }

        match request {
            DaemonRequest::Watch { path, .. } => self.handle_watch(&path),
            DaemonRequest::Status { .. } => DaemonResponse::ok(json!(self.status())),
        }
    }

    fn handle_watch(&mut self, path: &Path) -> DaemonResponse {
        if !path.is_absolute() {
            return DaemonResponse::error(format!(
                "watch path must be absolute: {}",
                path.display()
            ));
        }

        match self.watch_set.reconcile(path) {
            Ok(outcome) => DaemonResponse::ok(json!(outcome)),
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "failed to subscribe");
                DaemonResponse::error(format!("failed to watch {}: {err}", path.display()))
            }
        }
    }

    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            running: true,
            pid: self.pid,
            started_at_unix: self.started_at_unix,
            watched: self.watch_set.paths(),
        }
    }
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [run_dir(home), logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

async fn write_response<W>(writer: &mut W, response: &DaemonResponse) -> Result<(), DaemonError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the global `tracing` subscriber, writing to stderr.
///
/// `RUST_LOG` wins over `default_directive`. Colour is used only when `ansi`
/// is set and stderr is a terminal. Safe to call more than once.
pub fn init_tracing(default_directive: &str, ansi: bool) {
    use std::io::IsTerminal;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(ansi && std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;
    use std::os::unix::net::UnixListener as StdUnixListener;

    use figwatch_core::ReconcileOutcome;
    use serde_json::Value;
    use tempfile::TempDir;
    use tokio::io::{duplex, AsyncReadExt};

    /// Subscribes anything except paths listed in `refuse`.
    #[derive(Default)]
    struct FakeSubscriber {
        next: u64,
        live: HashMap<u64, PathBuf>,
        refuse: Vec<PathBuf>,
    }

    impl Subscriber for FakeSubscriber {
        type Handle = u64;
        type Error = io::Error;

        fn subscribe(&mut self, path: &Path) -> Result<u64, io::Error> {
            if self.refuse.iter().any(|p| p == path) {
                return Err(io::Error::from(ErrorKind::PermissionDenied));
            }
            self.next += 1;
            self.live.insert(self.next, path.to_path_buf());
            Ok(self.next)
        }

        fn unsubscribe(&mut self, handle: u64) -> Result<(), io::Error> {
            self.live.remove(&handle);
            Ok(())
        }
    }

    fn server(refuse: &[&str]) -> WatchServer<FakeSubscriber> {
        let subscriber = FakeSubscriber {
            refuse: refuse.iter().map(PathBuf::from).collect(),
            ..FakeSubscriber::default()
        };
        WatchServer::new(WatchSet::new(subscriber), 4242, 1_000_000)
    }

    async fn exchange(server: &mut WatchServer<FakeSubscriber>, line: &str) -> String {
        let (mut client, server_side) = duplex(4096);
        client.write_all(line.as_bytes()).await.expect("write");
        client.write_all(b"\n").await.expect("write newline");
        server.serve(server_side).await.expect("serve");

        let mut out = String::new();
        client.read_to_string(&mut out).await.expect("read");
        out
    }

    async fn send(server: &mut WatchServer<FakeSubscriber>, request: &DaemonRequest) -> DaemonResponse {
        let line = serde_json::to_string(request).expect("encode");
        let out = exchange(server, &line).await;
        serde_json::from_str(out.trim_end()).expect("decode response")
    }

    fn watch(path: &str) -> DaemonRequest {
        DaemonRequest::watch(Path::new(path)).expect("sign")
    }

    #[tokio::test]
    async fn watch_request_is_acknowledged_with_outcome() {
        let mut server = server(&[]);

        let response = send(&mut server, &watch("/proj/sub")).await;
        assert!(response.ok);

        let response = send(&mut server, &watch("/proj")).await;
        let outcome: ReconcileOutcome =
            serde_json::from_value(response.data.expect("data")).expect("outcome");
        assert_eq!(
            outcome,
            ReconcileOutcome::Added {
                path: PathBuf::from("/proj"),
                superseded: vec![PathBuf::from("/proj/sub")],
            }
        );
        assert_eq!(server.watch_set().paths(), vec![PathBuf::from("/proj")]);
    }

    #[tokio::test]
    async fn status_reports_pid_and_watched_paths() {
        let mut server = server(&[]);
        send(&mut server, &watch("/b")).await;
        send(&mut server, &watch("/a")).await;

        let response = send(&mut server, &DaemonRequest::status().expect("sign")).await;
        let status: DaemonStatus =
            serde_json::from_value(response.data.expect("data")).expect("status");

        assert_eq!(
            status,
            DaemonStatus {
                running: true,
                pid: 4242,
                started_at_unix: 1_000_000,
                watched: vec![PathBuf::from("/a"), PathBuf::from("/b")],
            }
        );
    }

    #[tokio::test]
    async fn forged_token_never_reaches_the_watch_set() {
        let mut server = server(&[]);
        let forged = DaemonRequest::Watch {
            path: PathBuf::from("/proj"),
            token: "00".repeat(32),
        };

        let response = send(&mut server, &forged).await;

        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("authentication failed"));
        assert!(server.watch_set().is_empty());
    }

    #[tokio::test]
    async fn malformed_and_relative_requests_are_rejected() {
        let mut server = server(&[]);

        let out = exchange(&mut server, "not json").await;
        let value: Value = serde_json::from_str(out.trim_end()).expect("decode");
        assert_eq!(value["ok"], Value::Bool(false));

        let response = send(&mut server, &watch("relative/dir")).await;
        assert!(!response.ok);
        assert!(server.watch_set().is_empty());
    }

    #[tokio::test]
    async fn subscribe_failure_is_reported_and_loop_continues() {
        let mut server = server(&["/locked"]);

        let refused = send(&mut server, &watch("/locked")).await;
        assert!(!refused.ok);
        assert!(refused.error.expect("error").contains("/locked"));

        let accepted = send(&mut server, &watch("/open")).await;
        assert!(accepted.ok);
        assert_eq!(server.watch_set().paths(), vec![PathBuf::from("/open")]);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn silent_client_is_dropped_after_read_deadline() {
        let mut server = server(&[]);
        let (mut client, server_side) = duplex(4096);

        server.serve(server_side).await.expect("serve");

        let mut out = String::new();
        client.read_to_string(&mut out).await.expect("read");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn client_closing_without_request_gets_nothing() {
        let mut server = server(&[]);
        let (client, server_side) = duplex(64);
        drop(client);

        server.serve(server_side).await.expect("serve");
        assert!(server.watch_set().is_empty());
    }

    #[test]
    fn stale_socket_is_removed_but_live_one_is_refused() {
        let dir = TempDir::new().expect("dir");
        let socket = dir.path().join("figwatch.sock");

        drop(StdUnixListener::bind(&socket).expect("bind stale"));
        assert!(socket.exists());
        prepare_socket_for_bind(&socket).expect("stale socket cleared");
        assert!(!socket.exists());

        let _live = StdUnixListener::bind(&socket).expect("bind live");
        let err = prepare_socket_for_bind(&socket).unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(_)));
        assert!(socket.exists());
    }

    #[test]
    fn runtime_dirs_are_created_under_home() {
        let home = TempDir::new().expect("home");

        ensure_runtime_dirs(home.path()).expect("dirs");
        ensure_runtime_dirs(home.path()).expect("idempotent");

        assert!(run_dir(home.path()).is_dir());
        assert!(logs_dir(home.path()).is_dir());
    }
}
