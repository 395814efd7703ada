//! figwatch daemon: process lifecycle, request channel, directory
//! subscriptions and figure export.

pub mod engine;
mod error;
pub mod export;
pub mod lifecycle;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use lifecycle::{DaemonState, InstanceLock, Lifecycle, StartOutcome, StopOutcome};
pub use protocol::{
    ensure_watch, request_status, send_request, DaemonRequest, DaemonResponse, DaemonStatus,
    WatchDelivery,
};
pub use runtime::{init_tracing, run, start_blocking, WatchServer};
