use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};

use figwatch_core::ReconcileOutcome;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, CONNECT_RETRY_PAUSE, CONNECT_WINDOW, RESPONSE_TIMEOUT};

/// Shared secret compiled into both ends of the request channel. It keeps
/// other local users from steering the daemon; it is not a security boundary.
const SHARED_SECRET: &[u8] = b"qRFax5Kz@FDCY&Z&";

type HmacSha256 = Hmac<Sha256>;

/// JSON newline-delimited request. One request per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonRequest {
    /// Make sure `path` (absolute) is under watch.
    Watch { path: PathBuf, token: String },
    /// Report the daemon's pid and watch set.
    Status { token: String },
}

impl DaemonRequest {
    pub fn watch(path: &Path) -> Result<Self, DaemonError> {
        Ok(Self::Watch {
            path: path.to_path_buf(),
            token: sign("watch", Some(path))?,
        })
    }

    pub fn status() -> Result<Self, DaemonError> {
        Ok(Self::Status {
            token: sign("status", None)?,
        })
    }

    pub fn command(&self) -> &'static str {
        match self {
            DaemonRequest::Watch { .. } => "watch",
            DaemonRequest::Status { .. } => "status",
        }
    }

    /// `true` if the token was produced with the shared secret for exactly
    /// this command and path.
    pub fn is_authentic(&self) -> bool {
        let (path, token) = match self {
            DaemonRequest::Watch { path, token } => (Some(path.as_path()), token),
            DaemonRequest::Status { token } => (None, token),
        };
        let Ok(expected) = hex::decode(token) else {
            return false;
        };
        match mac_for(self.command(), path) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Payload of a `status` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: i32,
    pub started_at_unix: u64,
    pub watched: Vec<PathBuf>,
}

/// How a watch request fared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchDelivery {
    /// The daemon applied the request.
    Acknowledged(ReconcileOutcome),
    /// The daemon received the request but could not apply it.
    Rejected(String),
    /// No connection could be made within the connect window.
    Dropped,
    /// The daemon accepted the connection but did not answer in time; the
    /// request may or may not have been applied.
    Unacknowledged,
}

fn mac_for(command: &str, path: Option<&Path>) -> Result<HmacSha256, DaemonError> {
    let mut mac = HmacSha256::new_from_slice(SHARED_SECRET)
        .map_err(|err| DaemonError::Protocol(format!("invalid shared secret: {err}")))?;
    mac.update(command.as_bytes());
    if let Some(path) = path {
        mac.update(b"\0");
        mac.update(path.as_os_str().as_encoded_bytes());
    }
    Ok(mac)
}

fn sign(command: &str, path: Option<&Path>) -> Result<String, DaemonError> {
    Ok(hex::encode(mac_for(command, path)?.finalize().into_bytes()))
}

/// Send one JSON request to the daemon socket and return one response.
///
/// Waits at most [`RESPONSE_TIMEOUT`] for the answer once connected.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    exchange(home, request, RESPONSE_TIMEOUT)
}

fn exchange(
    home: &Path,
    request: &DaemonRequest,
    response_timeout: Duration,
) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    stream
        .set_read_timeout(Some(response_timeout))
        .and_then(|()| stream.set_write_timeout(Some(response_timeout)))
        .map_err(|e| io_err(&socket, e))?;
    let unanswered = |err: std::io::Error| {
        if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) {
            DaemonError::NoResponse {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    };

    let payload = serde_json::to_string(request)?;
    stream.write_all(payload.as_bytes()).map_err(unanswered)?;
    stream.write_all(b"\n").map_err(unanswered)?;
    stream.flush().map_err(unanswered)?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(unanswered)?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

/// Like [`send_request`], but keeps retrying the connection for up to
/// `window`. Returns `Ok(None)` if the daemon never accepted.
pub fn send_with_retry(
    home: &Path,
    request: &DaemonRequest,
    window: Duration,
) -> Result<Option<DaemonResponse>, DaemonError> {
    retry_within(home, request, window, RESPONSE_TIMEOUT)
}

fn retry_within(
    home: &Path,
    request: &DaemonRequest,
    window: Duration,
    response_timeout: Duration,
) -> Result<Option<DaemonResponse>, DaemonError> {
    let deadline = Instant::now() + window;
    loop {
        match exchange(home, request, response_timeout) {
            Ok(response) => return Ok(Some(response)),
            Err(DaemonError::DaemonNotRunning { .. }) if Instant::now() < deadline => {
                sleep(CONNECT_RETRY_PAUSE);
            }
            Err(DaemonError::DaemonNotRunning { socket }) => {
                tracing::debug!(
                    socket = %socket.display(),
                    window_ms = window.as_millis() as u64,
                    "no daemon connection within window; dropping request",
                );
                return Ok(None);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Ask the daemon to watch `path`.
///
/// Best effort: if the daemon does not accept a connection within the
/// connect window the request is dropped and [`WatchDelivery::Dropped`] is
/// returned rather than an error. A daemon that accepts but stays silent
/// yields [`WatchDelivery::Unacknowledged`].
pub fn ensure_watch(home: &Path, path: &Path) -> Result<WatchDelivery, DaemonError> {
    watch_within(home, path, RESPONSE_TIMEOUT)
}

fn watch_within(
    home: &Path,
    path: &Path,
    response_timeout: Duration,
) -> Result<WatchDelivery, DaemonError> {
    let request = DaemonRequest::watch(path)?;
    let response = match retry_within(home, &request, CONNECT_WINDOW, response_timeout) {
        Ok(Some(response)) => response,
        Ok(None) => return Ok(WatchDelivery::Dropped),
        Err(DaemonError::NoResponse { socket }) => {
            tracing::debug!(socket = %socket.display(), "daemon did not answer watch request");
            return Ok(WatchDelivery::Unacknowledged);
        }
        Err(err) => return Err(err),
    };
    match response_into_data(response) {
        Ok(data) => Ok(WatchDelivery::Acknowledged(serde_json::from_value(data)?)),
        Err(DaemonError::Protocol(message)) => Ok(WatchDelivery::Rejected(message)),
        Err(err) => Err(err),
    }
}

pub fn request_status(home: &Path) -> Result<DaemonStatus, DaemonError> {
    let request = DaemonRequest::status()?;
    let response = send_with_retry(home, &request, Duration::from_millis(500))?.ok_or_else(|| {
        DaemonError::DaemonNotRunning {
            socket: socket_path(home),
        }
    })?;
    Ok(serde_json::from_value(response_into_data(response)?)?)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}
