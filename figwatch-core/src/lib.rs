//! figwatch core library: watch-set reconciliation, figure helpers, config dir.
//!
//! - [`registry`]: the [`WatchSet`] and the [`Subscriber`] seam it drives
//! - [`containment`]: path normalization and ancestor checks
//! - [`figure`]: figure file naming and discovery
//! - [`config`]: `~/.figwatch/` layout and bootstrapping
//! - [`git`]: project root discovery

pub mod config;
pub mod containment;
pub mod error;
pub mod figure;
pub mod git;
pub mod registry;
pub mod types;

pub use error::FigwatchError;
pub use registry::{Subscriber, WatchSet};
pub use types::{ReconcileOutcome, WatchedDirectory};
